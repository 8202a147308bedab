//! Facilitator chain provider.
//!
//! [`SolanaChainProvider`] bundles everything the verify/settle engine
//! needs for one network: the RPC client, the facilitator's fee-payer
//! keypair, an optional push-subscription channel for confirmation, and
//! the verification caps.

use std::sync::Arc;

use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;

use sol402::Network;

use super::confirm::{ConfirmationParams, SignatureSubscription};
use super::rpc::RpcClientLike;
use super::types::Address;

/// Bounds the facilitator enforces on payment transactions.
#[derive(Debug, Clone, Copy)]
pub struct VerificationCaps {
    /// Maximum accepted `SetComputeUnitLimit` value.
    pub max_compute_unit_limit: u32,
    /// Maximum accepted `SetComputeUnitPrice` value in microlamports.
    pub max_compute_unit_price: u64,
}

impl Default for VerificationCaps {
    fn default() -> Self {
        Self {
            max_compute_unit_limit: 4_000_000,
            max_compute_unit_price: 5_000_000,
        }
    }
}

/// Chain-level state for one network's facilitator.
pub struct SolanaChainProvider<R> {
    rpc: R,
    keypair: Arc<Keypair>,
    network: Network,
    subscription: Option<Arc<dyn SignatureSubscription>>,
    caps: VerificationCaps,
    confirmation: ConfirmationParams,
}

impl<R> std::fmt::Debug for SolanaChainProvider<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaChainProvider")
            .field("network", &self.network)
            .field("fee_payer", &self.keypair.pubkey())
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

impl<R: RpcClientLike> SolanaChainProvider<R> {
    /// Creates a provider with default caps and confirmation timing.
    pub fn new(rpc: R, keypair: Keypair, network: Network) -> Self {
        Self {
            rpc,
            keypair: Arc::new(keypair),
            network,
            subscription: None,
            caps: VerificationCaps::default(),
            confirmation: ConfirmationParams::default(),
        }
    }

    /// Attaches a push-subscription channel for confirmation.
    #[must_use]
    pub fn with_subscription(mut self, subscription: Arc<dyn SignatureSubscription>) -> Self {
        self.subscription = Some(subscription);
        self
    }

    /// Overrides the verification caps.
    #[must_use]
    pub const fn with_caps(mut self, caps: VerificationCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Overrides confirmation timing. Production keeps the defaults; tests
    /// shrink them.
    #[must_use]
    pub const fn with_confirmation(mut self, params: ConfirmationParams) -> Self {
        self.confirmation = params;
        self
    }

    /// The RPC client.
    pub const fn rpc(&self) -> &R {
        &self.rpc
    }

    /// The network this provider settles on.
    #[must_use]
    pub const fn network(&self) -> Network {
        self.network
    }

    /// The fee payer's public key.
    #[must_use]
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// The fee payer's address.
    #[must_use]
    pub fn fee_payer(&self) -> Address {
        Address::new(self.keypair.pubkey())
    }

    /// The fee payer keypair, for completing transaction signatures.
    #[must_use]
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// The push-subscription channel, if configured.
    #[must_use]
    pub fn subscription(&self) -> Option<&dyn SignatureSubscription> {
        self.subscription.as_deref()
    }

    /// The verification caps.
    #[must_use]
    pub const fn caps(&self) -> &VerificationCaps {
        &self.caps
    }

    /// The confirmation timing bounds.
    #[must_use]
    pub const fn confirmation(&self) -> ConfirmationParams {
        self.confirmation
    }
}
