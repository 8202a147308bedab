//! Solana chain building blocks.
//!
//! Everything below the payment scheme: addresses, the RPC seam,
//! confirmation strategies, and the facilitator's chain provider.

pub mod confirm;
pub mod provider;
pub mod rpc;
pub mod types;

pub use confirm::{ConfirmationOutcome, ConfirmationParams, SignatureSubscription};
pub use provider::SolanaChainProvider;
pub use types::Address;
