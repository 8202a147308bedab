//! Machine-readable error reasons for payment failures.
//!
//! The wire format carries failure reasons as snake_case strings. This
//! module encodes them as a closed sum with a stable string mapping at the
//! serialization boundary, so the rest of the workspace matches on variants
//! instead of comparing strings.
//!
//! Serde goes through [`ErrorReason::as_str`] rather than `rename_all`
//! because several wire names (`..._token_2022_...`, `..._x402_...`) do not
//! survive a mechanical case conversion.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Machine-readable reason a payment was rejected or a settlement failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorReason {
    /// The payment header or payload failed base64/JSON/schema validation.
    InvalidPayload,
    /// The payment requirements failed schema validation.
    InvalidPaymentRequirements,
    /// The scheme is not supported by this implementation.
    UnsupportedScheme,
    /// The `x402Version` field is missing or not `1`.
    InvalidX402Version,
    /// The scheme field is malformed.
    InvalidScheme,
    /// The network is unknown or not settled by this facilitator.
    InvalidNetwork,
    /// The payment does not match any offered requirement.
    InvalidPayment,
    /// The payment authorization has expired.
    PaymentExpired,
    /// The payer's on-chain balance cannot cover the transfer.
    InsufficientFunds,
    /// The transaction bytes could not be decoded.
    InvalidTransaction,
    /// The transfer amount differs from `maxAmountRequired`.
    AmountMismatch,
    /// The instruction sequence is malformed.
    InvalidInstructions,
    /// The transaction does not contain exactly 3 or 4 instructions.
    InstructionsLength,
    /// Instruction 0 is not a valid `SetComputeUnitLimit`.
    ComputeLimitInstruction,
    /// Instruction 1 is not a valid `SetComputeUnitPrice`.
    ComputePriceInstruction,
    /// The compute unit price exceeds the facilitator cap.
    ComputePriceTooHigh,
    /// The transfer instruction is an SPL Token instruction other than
    /// `TransferChecked`.
    NotSplTokenTransferChecked,
    /// The transfer instruction is a Token-2022 instruction other than
    /// `TransferChecked`.
    NotToken2022TransferChecked,
    /// The transfer slot holds an instruction of an unrelated program.
    NotATransferInstruction,
    /// The transfer destination is not the recipient's associated token
    /// account.
    TransferToIncorrectAta,
    /// The destination ATA does not exist and the transaction does not
    /// create it.
    ReceiverAtaNotFound,
    /// The source ATA does not exist.
    SenderAtaNotFound,
    /// Instruction 2 of a 4-instruction transaction is not a valid
    /// create-ATA instruction.
    CreateAtaInstruction,
    /// The create-ATA owner does not match `payTo`.
    CreateAtaIncorrectPayee,
    /// The create-ATA mint does not match `asset`.
    CreateAtaIncorrectAsset,
    /// Simulation of the fully signed transaction returned an error.
    SimulationFailed,
    /// The transaction's blockhash expired before confirmation.
    BlockHeightExceeded,
    /// Confirmation did not arrive within the settlement deadline.
    ConfirmationTimedOut,
    /// Settlement failed for a reason outside the known set.
    UnexpectedSettleError,
    /// Verification failed for a reason outside the known set.
    UnexpectedVerifyError,
    /// The transaction is in a state that permits neither verify nor settle.
    InvalidTransactionState,
}

impl ErrorReason {
    /// The stable wire string for this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidPaymentRequirements => "invalid_payment_requirements",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::InvalidX402Version => "invalid_x402_version",
            Self::InvalidScheme => "invalid_scheme",
            Self::InvalidNetwork => "invalid_network",
            Self::InvalidPayment => "invalid_payment",
            Self::PaymentExpired => "payment_expired",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidTransaction => "invalid_exact_svm_payload_transaction",
            Self::AmountMismatch => "invalid_exact_svm_payload_transaction_amount_mismatch",
            Self::InvalidInstructions => "invalid_exact_svm_payload_transaction_instructions",
            Self::InstructionsLength => {
                "invalid_exact_svm_payload_transaction_instructions_length"
            }
            Self::ComputeLimitInstruction => {
                "invalid_exact_svm_payload_transaction_instructions_compute_limit_instruction"
            }
            Self::ComputePriceInstruction => {
                "invalid_exact_svm_payload_transaction_instructions_compute_price_instruction"
            }
            Self::ComputePriceTooHigh => {
                "invalid_exact_svm_payload_transaction_instructions_compute_price_instruction_too_high"
            }
            Self::NotSplTokenTransferChecked => {
                "invalid_exact_svm_payload_transaction_instruction_not_spl_token_transfer_checked"
            }
            Self::NotToken2022TransferChecked => {
                "invalid_exact_svm_payload_transaction_instruction_not_token_2022_transfer_checked"
            }
            Self::NotATransferInstruction => {
                "invalid_exact_svm_payload_transaction_not_a_transfer_instruction"
            }
            Self::TransferToIncorrectAta => {
                "invalid_exact_svm_payload_transaction_transfer_to_incorrect_ata"
            }
            Self::ReceiverAtaNotFound => {
                "invalid_exact_svm_payload_transaction_receiver_ata_not_found"
            }
            Self::SenderAtaNotFound => {
                "invalid_exact_svm_payload_transaction_sender_ata_not_found"
            }
            Self::CreateAtaInstruction => {
                "invalid_exact_svm_payload_transaction_create_ata_instruction"
            }
            Self::CreateAtaIncorrectPayee => {
                "invalid_exact_svm_payload_transaction_create_ata_instruction_incorrect_payee"
            }
            Self::CreateAtaIncorrectAsset => {
                "invalid_exact_svm_payload_transaction_create_ata_instruction_incorrect_asset"
            }
            Self::SimulationFailed => {
                "invalid_exact_svm_payload_transaction_simulation_failed"
            }
            Self::BlockHeightExceeded => "settle_exact_svm_block_height_exceeded",
            Self::ConfirmationTimedOut => {
                "settle_exact_svm_transaction_confirmation_timed_out"
            }
            Self::UnexpectedSettleError => "unexpected_settle_error",
            Self::UnexpectedVerifyError => "unexpected_verify_error",
            Self::InvalidTransactionState => "invalid_transaction_state",
        }
    }

    /// All reasons, in taxonomy order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::InvalidPayload,
            Self::InvalidPaymentRequirements,
            Self::UnsupportedScheme,
            Self::InvalidX402Version,
            Self::InvalidScheme,
            Self::InvalidNetwork,
            Self::InvalidPayment,
            Self::PaymentExpired,
            Self::InsufficientFunds,
            Self::InvalidTransaction,
            Self::AmountMismatch,
            Self::InvalidInstructions,
            Self::InstructionsLength,
            Self::ComputeLimitInstruction,
            Self::ComputePriceInstruction,
            Self::ComputePriceTooHigh,
            Self::NotSplTokenTransferChecked,
            Self::NotToken2022TransferChecked,
            Self::NotATransferInstruction,
            Self::TransferToIncorrectAta,
            Self::ReceiverAtaNotFound,
            Self::SenderAtaNotFound,
            Self::CreateAtaInstruction,
            Self::CreateAtaIncorrectPayee,
            Self::CreateAtaIncorrectAsset,
            Self::SimulationFailed,
            Self::BlockHeightExceeded,
            Self::ConfirmationTimedOut,
            Self::UnexpectedSettleError,
            Self::UnexpectedVerifyError,
            Self::InvalidTransactionState,
        ]
    }
}

impl Display for ErrorReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for reason strings outside the known set.
#[derive(Debug, thiserror::Error)]
#[error("unknown error reason: {0}")]
pub struct UnknownReasonError(String);

impl FromStr for ErrorReason {
    type Err = UnknownReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| UnknownReasonError(s.to_owned()))
    }
}

impl Serialize for ErrorReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
