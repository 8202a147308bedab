//! Core trait and error type for x402 payment facilitators.
//!
//! The [`Facilitator`] trait is the seam between the resource-server
//! middleware and whatever performs verification and settlement — the local
//! Solana engine or a remote facilitator reached over HTTP. It is
//! dyn-compatible so middleware can hold `Arc<dyn Facilitator>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::proto::{SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse};

/// Boxed, `Send` future — the standard dyn-compatible async return type.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reaching or operating a facilitator.
///
/// Protocol-level failures (invalid payment, failed settlement) are *not*
/// errors: they come back inside [`VerifyResponse`] / [`SettleResponse`].
/// This type covers transport and serialization problems only.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FacilitatorError {
    /// The facilitator could not be reached.
    #[error("facilitator transport error: {0}")]
    Transport(String),
    /// The facilitator answered with a non-200 status.
    #[error("Failed to {verb} payment: {status} {body}")]
    UnexpectedStatus {
        /// The operation being performed (`verify`, `settle`, `supported`).
        verb: &'static str,
        /// The HTTP status code received.
        status: u16,
        /// The response body text.
        body: String,
    },
    /// A response body could not be deserialized.
    #[error("facilitator response decode error: {0}")]
    Decode(String),
    /// Any other failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// The asynchronous interface every x402 facilitator offers.
///
/// `verify` and `settle` never surface payment rejections as errors — they
/// return response objects with `is_valid=false` / `success=false` and a
/// machine-readable reason. Errors are reserved for transport-level
/// failures.
pub trait Facilitator: Send + Sync {
    /// Verifies a proposed payment payload against requirements.
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>>;

    /// Executes an on-chain settlement for a verified payment.
    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>>;

    /// Returns the payment kinds this facilitator supports.
    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>>;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        self.as_ref().settle(request)
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        self.as_ref().supported()
    }
}
