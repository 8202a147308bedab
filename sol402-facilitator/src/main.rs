//! x402 facilitator HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p sol402-facilitator --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p sol402-facilitator
//!
//! # Configure logging level
//! RUST_LOG=info cargo run -p sol402-facilitator
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use tower_http::cors;
use tracing_subscriber::EnvFilter;

use sol402::Network;
use sol402_svm::chain::confirm::PubsubSubscription;
use sol402_svm::chain::provider::SolanaChainProvider;
use sol402_svm::chain::rpc::{RpcClientLike, SolanaRpc};
use sol402_svm::exact::facilitator::SolanaExactFacilitator;

use sol402_facilitator::config::{FacilitatorConfig, NetworkConfig};
use sol402_facilitator::handlers::facilitator_router;
use sol402_facilitator::key::parse_keypair;
use sol402_facilitator::registry::FacilitatorRegistry;
use sol402_facilitator::util::SigDown;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("facilitator failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = FacilitatorConfig::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        networks = config.networks.len(),
        "loaded configuration"
    );

    let mut registry = FacilitatorRegistry::new();
    for (name, network_cfg) in &config.networks {
        let Ok(network) = name.parse::<Network>() else {
            tracing::warn!(network = %name, "skipping network: unknown name");
            continue;
        };
        if !network.is_solana() {
            tracing::warn!(network = %name, "skipping network: not settled by this facilitator");
            continue;
        }
        match build_engine(network, network_cfg).await {
            Ok(engine) => {
                tracing::info!(network = %name, "registered exact scheme");
                registry.register(network, engine);
            }
            Err(e) => {
                tracing::warn!(network = %name, "skipping network: {e}");
            }
        }
    }

    if registry.is_empty() {
        tracing::warn!("no networks registered, facilitator will report no supported kinds");
    }

    let app = facilitator_router(Arc::new(registry)).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let sig_down = SigDown::try_new()?;
    let token = sig_down.cancellation_token();

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("facilitator listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    tracing::info!("facilitator shut down gracefully");
    Ok(())
}

/// Builds the settlement engine for one network.
async fn build_engine(
    network: Network,
    config: &NetworkConfig,
) -> Result<Arc<SolanaExactFacilitator<SolanaRpc>>, Box<dyn std::error::Error>> {
    let keypair = parse_keypair(&config.signer_keypair)?;
    let rpc = SolanaRpc::new(config.rpc_url.clone());

    if config.health_check {
        let height = rpc.get_block_height().await?;
        tracing::info!(network = %network, url = %config.rpc_url, height, "rpc health check passed");
    }

    let mut provider = SolanaChainProvider::new(rpc, keypair, network);
    if let Some(ws_url) = &config.ws_url {
        provider = provider.with_subscription(Arc::new(PubsubSubscription::new(ws_url.clone())));
    }

    Ok(Arc::new(SolanaExactFacilitator::new(provider)))
}
