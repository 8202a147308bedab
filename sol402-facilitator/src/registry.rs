//! Per-network facilitator registry.
//!
//! One Solana engine is registered per network the service settles on.
//! Incoming requests are routed by the network named in the payment
//! payload; unknown networks are rejected with `invalid_network` rather
//! than an HTTP error, keeping the protocol contract that verify/settle
//! never throw.

use std::collections::HashMap;
use std::sync::Arc;

use sol402::facilitator::{BoxFuture, Facilitator, FacilitatorError};
use sol402::proto::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};
use sol402::{ErrorReason, Network};

/// Routes facilitator requests to the engine for their network.
#[derive(Default)]
pub struct FacilitatorRegistry {
    entries: HashMap<Network, Arc<dyn Facilitator>>,
}

impl std::fmt::Debug for FacilitatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorRegistry")
            .field("networks", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FacilitatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an engine for a network, replacing any previous one.
    pub fn register(&mut self, network: Network, facilitator: Arc<dyn Facilitator>) {
        self.entries.insert(network, facilitator);
    }

    /// Networks with a registered engine.
    #[must_use]
    pub fn networks(&self) -> Vec<Network> {
        self.entries.keys().copied().collect()
    }

    /// Whether any engine is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, network: Network) -> Option<&Arc<dyn Facilitator>> {
        self.entries.get(&network)
    }
}

impl Facilitator for FacilitatorRegistry {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        Box::pin(async move {
            match self.find(request.payment_payload.network) {
                Some(facilitator) => facilitator.verify(request).await,
                None => Ok(VerifyResponse::invalid(ErrorReason::InvalidNetwork, None)),
            }
        })
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        Box::pin(async move {
            let network = request.payment_payload.network;
            match self.find(network) {
                Some(facilitator) => facilitator.settle(request).await,
                None => Ok(SettleResponse::failure(
                    ErrorReason::InvalidNetwork,
                    network,
                    None,
                    "",
                )),
            }
        })
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        Box::pin(async move {
            let mut kinds = Vec::with_capacity(self.entries.len());
            for facilitator in self.entries.values() {
                match facilitator.supported().await {
                    Ok(supported) => kinds.extend(supported.kinds),
                    Err(err) => {
                        tracing::warn!(error = %err, "engine failed to report supported kinds");
                    }
                }
            }
            kinds.sort_by_key(|kind| kind.network.to_string());
            Ok(SupportedResponse { kinds })
        })
    }
}
