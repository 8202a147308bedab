//! Solana chain support for the x402 payment protocol.
//!
//! This crate implements the Solana half of the `sol402` workspace: the
//! "exact" payment scheme based on SPL Token `TransferChecked` instructions
//! inside a partially signed versioned transaction.
//!
//! # Architecture
//!
//! - [`chain`] — chain-level building blocks: the [`chain::Address`] newtype,
//!   the [`chain::rpc::RpcClientLike`] seam over Solana RPC, confirmation
//!   strategies, and the facilitator's [`chain::SolanaChainProvider`]
//! - [`exact`] — the scheme itself: client-side transaction building,
//!   facilitator-side introspection, and the verify/settle engine
//!
//! # Transaction structure
//!
//! A payment transaction contains exactly these instructions, in order:
//!
//! 1. `SetComputeUnitLimit` (compute budget program)
//! 2. `SetComputeUnitPrice` (compute budget program, 1 microlamport)
//! 3. Optional: create associated token account for the recipient
//! 4. `TransferChecked` (SPL Token or Token-2022)
//!
//! The client signs as the transfer authority; the fee payer slot is left
//! for the facilitator, which completes the signature at settlement.

pub mod chain;
pub mod exact;

#[cfg(test)]
pub(crate) mod testutil;

pub use chain::{Address, SolanaChainProvider};
pub use exact::client::build_payment_header;
pub use exact::facilitator::SolanaExactFacilitator;
