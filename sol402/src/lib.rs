//! Core types for the x402 payment protocol over Solana.
//!
//! This crate defines the serialization-level data structures shared by all
//! three parties of an x402 payment flow — the paying client, the resource
//! server, and the facilitator — together with the building blocks they all
//! need:
//!
//! - [`network`] — the closed set of supported networks and their
//!   compiled-in USDC deployments
//! - [`proto`] — wire types: `PaymentRequirements`, `PaymentPayload`,
//!   `VerifyResponse`, `SettleResponse`, the 402 body, and the facilitator
//!   request envelopes
//! - [`reason`] — the closed set of machine-readable error reasons
//! - [`encoding`] — base64 header envelopes and wire-level schema checks
//! - [`price`] — human price (`"$0.01"`) to atomic token amount conversion
//! - [`facilitator`] — the dyn-compatible [`Facilitator`] trait implemented
//!   by both the local engine and the remote HTTP client
//!
//! It has minimal dependencies (serde and base64) and is the shared
//! "lingua franca" across the `sol402` workspace.

pub mod encoding;
pub mod facilitator;
pub mod network;
pub mod price;
pub mod proto;
pub mod reason;

pub use encoding::Base64Bytes;
pub use facilitator::{BoxFuture, Facilitator, FacilitatorError};
pub use network::Network;
pub use proto::{
    ExactSolanaPayload, PaymentPayload, PaymentRequired, PaymentRequirements, SettleRequest,
    SettleResponse, SupportedKind, SupportedResponse, VerifyRequest, VerifyResponse,
};
pub use reason::ErrorReason;

/// The x402 protocol version implemented by this workspace.
pub const X402_VERSION: u32 = 1;

/// The only payment scheme implemented by this workspace.
pub const SCHEME_EXACT: &str = "exact";
