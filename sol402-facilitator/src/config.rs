//! Facilitator server configuration.
//!
//! Loads configuration from a TOML file with support for environment
//! variable expansion in string values. Variables use `$VAR` or `${VAR}`
//! syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4021
//!
//! [networks."solana-devnet"]
//! rpc_url = "https://api.devnet.solana.com"
//! ws_url = "wss://api.devnet.solana.com"
//! signer_keypair = "$FACILITATOR_KEY_DEVNET"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to configuration file (default: `config.toml`)
//! - `HOST` / `PORT` — Override the bind address
//! - Signer keypairs referenced by `$VAR` in the config file

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level facilitator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4021`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Network configurations keyed by network name.
    #[serde(default)]
    pub networks: HashMap<String, NetworkConfig>,
}

/// Per-network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// HTTP RPC endpoint URL.
    pub rpc_url: String,

    /// Websocket RPC endpoint, enabling push-based confirmation.
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Base58-encoded facilitator keypair (64 bytes). Supports `$VAR` /
    /// `${VAR}` expansion.
    pub signer_keypair: String,

    /// Probe the RPC endpoint at startup before registering the network.
    #[serde(default = "default_health_check")]
    pub health_check: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    4021
}

const fn default_health_check() -> bool {
    true
}

impl FacilitatorConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `config.toml` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            // No config file: defaults only.
            String::new()
        };

        let expanded = expand_env_vars(&content);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Ok(host) = std::env::var("HOST")
            && let Ok(addr) = host.parse()
        {
            config.host = addr;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        Ok(config)
    }
}

/// Expands `$VAR` and `${VAR}` references from the process environment.
///
/// Unresolved references and stray `$` characters are copied through
/// byte-for-byte, so secrets managers that inject values later still see
/// the original placeholder.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let tail = &rest[dollar + 1..];

        // `(name, consumed)` covers the whole reference including the `$`
        // and any braces. A malformed reference consumes nothing.
        let (name, consumed) = match tail.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(close) => (&braced[..close], close + 3),
                None => ("", 0),
            },
            None => {
                let end = tail
                    .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                    .unwrap_or(tail.len());
                (&tail[..end], end + 1)
            }
        };

        if name.is_empty() {
            out.push('$');
            rest = &rest[dollar + 1..];
            continue;
        }

        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(&rest[dollar..dollar + consumed]),
        }
        rest = &rest[dollar + consumed..];
    }

    out.push_str(rest);
    out
}
