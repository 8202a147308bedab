//! Wire format types for x402 payment messages.
//!
//! All types serialize to JSON with camelCase field names. The protocol
//! version is carried in the `x402Version` field and is always `1` here.
//!
//! The scheme-specific half of a [`PaymentPayload`] stays a raw
//! [`serde_json::Value`] so that envelopes produced for other chains still
//! parse; [`PaymentPayload::exact_solana`] extracts the Solana form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{VecSkipError, serde_as};

use crate::network::Network;
use crate::reason::ErrorReason;
use crate::{SCHEME_EXACT, X402_VERSION};

/// Payment terms set by the resource server, returned in the 402 body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme identifier (always `"exact"`).
    pub scheme: String,

    /// Network the payment must settle on.
    pub network: Network,

    /// Required amount as a decimal integer string, in the token's atomic
    /// units.
    pub max_amount_required: String,

    /// Absolute URL of the protected endpoint.
    pub resource: String,

    /// Human-readable description of the resource.
    pub description: String,

    /// MIME type of the protected resource.
    pub mime_type: String,

    /// Optional metadata describing the endpoint's request/response shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Base58 address of the recipient's token owner (not the ATA).
    pub pay_to: String,

    /// Server-selected upper bound on settlement time, in seconds.
    pub max_timeout_seconds: u64,

    /// Base58 mint address of the payment token.
    pub asset: String,

    /// Scheme-specific extra data. On Solana this carries `feePayer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    /// The facilitator fee payer address from `extra.feePayer`, if present.
    #[must_use]
    pub fn fee_payer(&self) -> Option<&str> {
        self.extra.as_ref()?.get("feePayer")?.as_str()
    }

    /// Parses `maxAmountRequired` as a `u64`.
    ///
    /// Returns `None` for anything but a decimal integer string that fits.
    #[must_use]
    pub fn amount(&self) -> Option<u64> {
        let s = &self.max_amount_required;
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok()
    }
}

/// The Solana-specific half of a payment payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSolanaPayload {
    /// Base64-encoded serialized Solana transaction. The client's signature
    /// is present; the fee payer slot is empty.
    pub transaction: String,
}

/// A signed payment authorization from the client, carried in `X-PAYMENT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 1).
    pub x402_version: u32,

    /// Payment scheme identifier.
    pub scheme: String,

    /// Network the payment settles on.
    pub network: Network,

    /// Scheme-specific signed payload.
    pub payload: Value,
}

impl PaymentPayload {
    /// Wraps a Solana payload into a V1 envelope.
    #[must_use]
    pub fn exact(network: Network, payload: &ExactSolanaPayload) -> Self {
        Self {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_owned(),
            network,
            payload: serde_json::json!({ "transaction": payload.transaction }),
        }
    }

    /// Extracts the Solana-specific payload.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorReason::InvalidPayload`] if the inner value does not
    /// match the Solana schema.
    pub fn exact_solana(&self) -> Result<ExactSolanaPayload, ErrorReason> {
        serde_json::from_value(self.payload.clone()).map_err(|_| ErrorReason::InvalidPayload)
    }
}

/// HTTP 402 Payment Required response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 1).
    pub x402_version: u32,

    /// Error message or machine-readable reason for the challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Acceptable payment requirements.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,

    /// The payer address, present only after verification identified it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl PaymentRequired {
    /// Builds a 402 body from an error message and the offered requirements.
    #[must_use]
    pub fn new(error: impl Into<String>, accepts: Vec<PaymentRequirements>) -> Self {
        Self {
            x402_version: X402_VERSION,
            error: Some(error.into()),
            accepts,
            payer: None,
        }
    }

    /// Attaches the payer address identified during verification.
    #[must_use]
    pub fn with_payer(mut self, payer: Option<String>) -> Self {
        self.payer = payer;
        self
    }
}

/// Request body for `POST /verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// The payment payload to verify.
    pub payment_payload: PaymentPayload,

    /// The requirements to verify against.
    pub payment_requirements: PaymentRequirements,
}

/// Request body for `POST /settle`.
///
/// Structurally identical to [`VerifyRequest`] on the wire, but a distinct
/// type so a verify request cannot be passed where settlement is meant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// The payment payload to settle.
    pub payment_payload: PaymentPayload,

    /// The requirements the payment was verified against.
    pub payment_requirements: PaymentRequirements,
}

impl From<VerifyRequest> for SettleRequest {
    fn from(request: VerifyRequest) -> Self {
        Self {
            payment_payload: request.payment_payload,
            payment_requirements: request.payment_requirements,
        }
    }
}

/// Result of payment verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payment is valid.
    pub is_valid: bool,

    /// Reason for invalidity when `is_valid` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<ErrorReason>,

    /// The payer's address, whenever transaction decoding succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// A valid verification result.
    #[must_use]
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    /// An invalid verification result.
    #[must_use]
    pub fn invalid(reason: ErrorReason, payer: Option<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer,
        }
    }
}

/// Result of payment settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether settlement succeeded.
    pub success: bool,

    /// Reason for failure when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,

    /// The payer's address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,

    /// Base58 transaction signature. Set on success and on any post-submit
    /// failure; empty before submission.
    pub transaction: String,

    /// Network where settlement was attempted.
    pub network: Network,
}

impl SettleResponse {
    /// A successful settlement result.
    #[must_use]
    pub fn success(
        transaction: impl Into<String>,
        network: Network,
        payer: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            error_reason: None,
            payer: Some(payer.into()),
            transaction: transaction.into(),
            network,
        }
    }

    /// A failed settlement result. `transaction` carries the signature when
    /// the failure happened after submission, the empty string otherwise.
    #[must_use]
    pub fn failure(
        reason: ErrorReason,
        network: Network,
        payer: Option<String>,
        transaction: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer,
            transaction: transaction.into(),
            network,
        }
    }
}

/// One payment kind a facilitator can handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version (always 1).
    pub x402_version: u32,

    /// Payment scheme identifier.
    pub scheme: String,

    /// Network the facilitator settles on.
    pub network: Network,

    /// Scheme-specific extra data. On Solana this carries `feePayer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl SupportedKind {
    /// The facilitator fee payer address from `extra.feePayer`, if present.
    #[must_use]
    pub fn fee_payer(&self) -> Option<&str> {
        self.extra.as_ref()?.get("feePayer")?.as_str()
    }
}

/// Response body for `GET /supported`.
///
/// Kinds that fail to deserialize (e.g. an unknown network name from a
/// newer facilitator) are skipped rather than failing the whole response.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// Payment kinds the facilitator can verify and settle.
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedKind>,
}

impl SupportedResponse {
    /// Finds the first kind matching the given scheme and network.
    #[must_use]
    pub fn find_kind(&self, scheme: &str, network: Network) -> Option<&SupportedKind> {
        self.kinds
            .iter()
            .find(|k| k.scheme == scheme && k.network == network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: SCHEME_EXACT.to_owned(),
            network: Network::SolanaDevnet,
            max_amount_required: "1800".to_owned(),
            resource: "https://api.example.com/weather".to_owned(),
            description: "Weather data".to_owned(),
            mime_type: "application/json".to_owned(),
            output_schema: None,
            pay_to: "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".to_owned(),
            max_timeout_seconds: 60,
            asset: "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU".to_owned(),
            extra: Some(serde_json::json!({
                "feePayer": "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS"
            })),
        }
    }

    #[test]
    fn requirements_wire_shape() {
        let json = serde_json::to_value(requirements()).unwrap();
        assert_eq!(json["maxAmountRequired"], "1800");
        assert_eq!(json["network"], "solana-devnet");
        assert_eq!(json["payTo"], "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM");
        assert_eq!(json["mimeType"], "application/json");
        assert!(json.get("outputSchema").is_none());
        assert_eq!(
            json["extra"]["feePayer"],
            "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS"
        );
    }

    #[test]
    fn requirements_accessors() {
        let reqs = requirements();
        assert_eq!(reqs.amount(), Some(1800));
        assert_eq!(
            reqs.fee_payer(),
            Some("Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS")
        );

        let mut bad = requirements();
        bad.max_amount_required = "1e3".to_owned();
        assert_eq!(bad.amount(), None);
        bad.max_amount_required = "-1".to_owned();
        assert_eq!(bad.amount(), None);
    }

    #[test]
    fn payload_round_trip() {
        let inner = ExactSolanaPayload {
            transaction: "AQID".to_owned(),
        };
        let payload = PaymentPayload::exact(Network::Solana, &inner);
        let json = serde_json::to_string(&payload).unwrap();
        let back: PaymentPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
        assert_eq!(back.exact_solana().unwrap(), inner);
    }

    #[test]
    fn verify_response_wire_shape() {
        let valid = VerifyResponse::valid("payer111");
        let json = serde_json::to_value(&valid).unwrap();
        assert_eq!(json["isValid"], true);
        assert!(json.get("invalidReason").is_none());

        let invalid = VerifyResponse::invalid(ErrorReason::AmountMismatch, None);
        let json = serde_json::to_value(&invalid).unwrap();
        assert_eq!(
            json["invalidReason"],
            "invalid_exact_svm_payload_transaction_amount_mismatch"
        );
    }

    #[test]
    fn settle_response_wire_shape() {
        let failure = SettleResponse::failure(
            ErrorReason::ConfirmationTimedOut,
            Network::Solana,
            Some("payer111".to_owned()),
            "5sig",
        );
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(
            json["errorReason"],
            "settle_exact_svm_transaction_confirmation_timed_out"
        );
        assert_eq!(json["transaction"], "5sig");
        assert_eq!(json["network"], "solana");
    }

    #[test]
    fn supported_response_skips_unknown_kinds() {
        let json = serde_json::json!({
            "kinds": [
                { "x402Version": 1, "scheme": "exact", "network": "solana-devnet" },
                { "x402Version": 1, "scheme": "exact", "network": "tron" }
            ]
        });
        let supported: SupportedResponse = serde_json::from_value(json).unwrap();
        assert_eq!(supported.kinds.len(), 1);
        assert!(supported.find_kind("exact", Network::SolanaDevnet).is_some());
    }
}
