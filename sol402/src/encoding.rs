//! Base64 envelopes and wire-level schema checks.
//!
//! x402 headers carry base64-encoded JSON. This module owns the envelope
//! encoding for `X-PAYMENT` and `X-PAYMENT-RESPONSE` plus the character-level
//! validators the schema requires, so that malformed input is rejected with
//! the right [`ErrorReason`] before any deserialization is attempted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use std::borrow::Cow;
use std::fmt::Display;

use crate::network::Network;
use crate::proto::{PaymentPayload, SettleResponse};
use crate::reason::ErrorReason;
use crate::{SCHEME_EXACT, X402_VERSION};

/// A wrapper for base64-encoded byte data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Decodes the base64 string bytes to raw binary data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encodes raw binary data into base64 string bytes.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Self {
        let encoded = b64.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Error decoding an x402 envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The header is not base64, not JSON, or fails the payload schema.
    #[error("malformed payment envelope: {0}")]
    Malformed(String),
    /// The `x402Version` field is missing or not `1`.
    #[error("unsupported x402 version")]
    Version,
    /// The scheme is not `"exact"`.
    #[error("unsupported payment scheme: {0}")]
    Scheme(String),
    /// The network name is not in the supported set.
    #[error("unsupported network: {0}")]
    Network(String),
}

impl EnvelopeError {
    /// The wire reason corresponding to this error.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::Malformed(_) => ErrorReason::InvalidPayload,
            Self::Version => ErrorReason::InvalidX402Version,
            Self::Scheme(_) => ErrorReason::UnsupportedScheme,
            Self::Network(_) => ErrorReason::InvalidNetwork,
        }
    }
}

/// Checks a string against the wire base64 alphabet
/// (`^[A-Za-z0-9+/]*={0,2}$`).
#[must_use]
pub fn is_base64(s: &str) -> bool {
    let trimmed = s.trim_end_matches('=');
    if s.len() - trimmed.len() > 2 {
        return false;
    }
    trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

/// Checks a string for the shape of a base58 Solana address.
///
/// Base58 excludes `0`, `O`, `I`, and `l`; encoded 32-byte keys are 32 to 44
/// characters long.
#[must_use]
pub fn is_solana_address(s: &str) -> bool {
    (32..=44).contains(&s.len())
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() && !matches!(b, b'0' | b'O' | b'I' | b'l')
        })
}

/// Encodes a [`PaymentPayload`] for the `X-PAYMENT` header.
#[must_use]
pub fn encode_payment(payload: &PaymentPayload) -> String {
    let json = serde_json::to_vec(payload).unwrap_or_default();
    b64.encode(json)
}

/// Decodes and validates an `X-PAYMENT` header value.
///
/// Validation happens on the raw JSON first so that each failure maps to its
/// own [`ErrorReason`]: bad base64/JSON/schema → `invalid_payload`, wrong
/// version → `invalid_x402_version`, unknown scheme → `unsupported_scheme`,
/// unknown network → `invalid_network`.
///
/// # Errors
///
/// Returns [`EnvelopeError`] if any of the checks above fail.
pub fn decode_payment(header: &str) -> Result<PaymentPayload, EnvelopeError> {
    let trimmed = header.trim();
    if !is_base64(trimmed) {
        return Err(EnvelopeError::Malformed("not base64".to_owned()));
    }
    let bytes = b64
        .decode(trimmed)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    let version = value.get("x402Version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(X402_VERSION)) {
        return Err(EnvelopeError::Version);
    }

    let scheme = value
        .get("scheme")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| EnvelopeError::Malformed("missing scheme".to_owned()))?;
    if scheme != SCHEME_EXACT {
        return Err(EnvelopeError::Scheme(scheme.to_owned()));
    }

    let network = value
        .get("network")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| EnvelopeError::Malformed("missing network".to_owned()))?;
    if network.parse::<Network>().is_err() {
        return Err(EnvelopeError::Network(network.to_owned()));
    }

    let payload: PaymentPayload =
        serde_json::from_value(value).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    let transaction = payload
        .payload
        .get("transaction")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| EnvelopeError::Malformed("missing transaction".to_owned()))?;
    if !is_base64(transaction) {
        return Err(EnvelopeError::Malformed(
            "transaction is not base64".to_owned(),
        ));
    }

    Ok(payload)
}

/// Encodes a [`SettleResponse`] for the `X-PAYMENT-RESPONSE` header.
#[must_use]
pub fn encode_settle_response(response: &SettleResponse) -> String {
    let json = serde_json::to_vec(response).unwrap_or_default();
    b64.encode(json)
}

/// Decodes an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`EnvelopeError::Malformed`] on base64 or JSON decode failure.
pub fn decode_settle_response(header: &str) -> Result<SettleResponse, EnvelopeError> {
    let bytes = b64
        .decode(header.trim())
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))
}
