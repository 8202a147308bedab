//! The Solana "exact" payment scheme.
//!
//! A payment is a partially signed versioned transaction carrying a
//! `TransferChecked` for exactly the required amount. The client builds and
//! signs it ([`client`]), the facilitator validates it instruction by
//! instruction ([`introspect`]) and then settles it on-chain
//! ([`facilitator`]).

pub mod client;
pub mod facilitator;
pub mod introspect;
pub mod types;

pub use facilitator::SolanaExactFacilitator;
pub use types::{ATA_PROGRAM_PUBKEY, TransactionInt};
