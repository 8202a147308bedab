//! HTTP bindings for the x402 payment protocol on Solana.
//!
//! Three pieces, one per party:
//!
//! - [`server`] — a tower layer that turns any route into a paywall:
//!   402 challenge, payment verification, handler invocation, and
//!   settlement, in that order
//! - [`client`] — a `reqwest` middleware that transparently answers 402
//!   challenges by building, signing, and attaching a payment
//! - [`facilitator_client`] — the resource server's HTTP client for a
//!   remote facilitator's `/verify`, `/settle`, and `/supported`
//!
//! Wire envelopes and schema validation live in [`sol402::encoding`];
//! transaction building and verification live in [`sol402_svm`].

pub mod client;
pub mod constants;
pub mod facilitator_client;
pub mod server;

pub use client::X402Client;
pub use facilitator_client::FacilitatorClient;
pub use server::{PaymentGateLayer, RouteConfig, RoutesConfig};
