//! Network definitions and known token deployments.
//!
//! The x402 wire format names networks with short strings (`"solana"`,
//! `"solana-devnet"`). This module defines the closed set accepted by this
//! workspace and the statically known USDC deployments per network.
//!
//! EVM network names are carried so that 402 bodies produced by mixed
//! facilitators still deserialize; only the Solana variants have payment
//! semantics here.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported networks.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Solana mainnet (chain ID 101).
    #[serde(rename = "solana")]
    Solana,
    /// Solana devnet (chain ID 103).
    #[serde(rename = "solana-devnet")]
    SolanaDevnet,
    /// Base mainnet (chain ID 8453). Wire compatibility only.
    #[serde(rename = "base")]
    Base,
    /// Base Sepolia testnet (chain ID 84532). Wire compatibility only.
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
}

impl Network {
    /// Numeric chain ID for this network.
    #[must_use]
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::Solana => 101,
            Self::SolanaDevnet => 103,
            Self::Base => 8453,
            Self::BaseSepolia => 84_532,
        }
    }

    /// Whether this network is settled by the Solana engine.
    #[must_use]
    pub const fn is_solana(self) -> bool {
        matches!(self, Self::Solana | Self::SolanaDevnet)
    }

    /// All networks the Solana engine can verify and settle on.
    #[must_use]
    pub const fn known_solana() -> &'static [Self] {
        &[Self::Solana, Self::SolanaDevnet]
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Solana => "solana",
            Self::SolanaDevnet => "solana-devnet",
            Self::Base => "base",
            Self::BaseSepolia => "base-sepolia",
        };
        write!(f, "{name}")
    }
}

/// Error for unrecognized network names.
#[derive(Debug, thiserror::Error)]
#[error("unknown network: {0}")]
pub struct UnknownNetworkError(String);

impl FromStr for Network {
    type Err = UnknownNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solana" => Ok(Self::Solana),
            "solana-devnet" => Ok(Self::SolanaDevnet),
            "base" => Ok(Self::Base),
            "base-sepolia" => Ok(Self::BaseSepolia),
            other => Err(UnknownNetworkError(other.to_owned())),
        }
    }
}

/// A statically known token deployment on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDeployment {
    /// Chain ID the token is deployed on.
    pub chain_id: u64,
    /// Base58 mint address.
    pub mint: &'static str,
    /// Number of decimal places in the token's atomic unit.
    pub decimals: u8,
    /// Human-readable token name.
    pub name: &'static str,
}

/// Well-known USDC deployments on Solana networks.
///
/// This is the single source of truth for the default settlement asset.
static USDC_DEPLOYMENTS: &[TokenDeployment] = &[
    // Solana mainnet — native Circle USDC (SPL Token)
    // Verify: https://solscan.io/token/EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v
    TokenDeployment {
        chain_id: 101,
        mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
        decimals: 6,
        name: "USDC",
    },
    // Solana devnet — native Circle USDC testnet (SPL Token)
    // Verify: https://explorer.solana.com/address/4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU?cluster=devnet
    TokenDeployment {
        chain_id: 103,
        mint: "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
        decimals: 6,
        name: "USDC",
    },
];

/// Returns the USDC deployment for a chain ID, if known.
#[must_use]
pub fn usdc_deployment_by_chain_id(chain_id: u64) -> Option<&'static TokenDeployment> {
    USDC_DEPLOYMENTS.iter().find(|d| d.chain_id == chain_id)
}

/// Returns the USDC deployment for a network, if known.
#[must_use]
pub fn usdc_deployment(network: Network) -> Option<&'static TokenDeployment> {
    usdc_deployment_by_chain_id(network.chain_id())
}
