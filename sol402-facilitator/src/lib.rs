//! x402 facilitator HTTP service.
//!
//! Exposes the facilitator API consumed by resource servers:
//!
//! - `POST /verify` — validate a payment payload against requirements
//! - `POST /settle` — submit and confirm a verified payment on-chain
//! - `GET /supported` — list supported payment kinds and the fee payer
//! - `GET /health` — liveness probe
//!
//! One Solana engine is registered per configured network; requests are
//! routed by the network named in the payment payload.

pub mod config;
pub mod error;
pub mod handlers;
pub mod key;
pub mod registry;
pub mod util;
