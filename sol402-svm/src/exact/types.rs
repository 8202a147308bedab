//! Shared transaction types and constants for the exact scheme.

use solana_message::compiled_instruction::CompiledInstruction;
use solana_pubkey::{Pubkey, pubkey};
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;

use sol402::Base64Bytes;

/// Associated Token Account program.
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// System program.
pub const SYSTEM_PROGRAM_PUBKEY: Pubkey = pubkey!("11111111111111111111111111111111");

/// First data byte of a `SetComputeUnitLimit` instruction.
pub const COMPUTE_UNIT_LIMIT_DISCRIMINATOR: u8 = 2;

/// First data byte of a `SetComputeUnitPrice` instruction.
pub const COMPUTE_UNIT_PRICE_DISCRIMINATOR: u8 = 3;

/// The compute unit price every client payment carries, in microlamports.
///
/// Fixed so the introspector can bound what a payload may cost the fee
/// payer.
pub const FIXED_COMPUTE_UNIT_PRICE: u64 = 1;

/// Derives the associated token account for `(owner, mint)` under a token
/// program.
#[must_use]
pub fn derive_ata(owner: &Pubkey, token_program: &Pubkey, mint: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    ata
}

/// Decodes base64 wire bytes into a versioned transaction.
///
/// # Errors
///
/// Returns [`TransactionDecodeError`] on base64 or bincode failure.
pub fn decode_transaction(b64: &str) -> Result<VersionedTransaction, TransactionDecodeError> {
    let bytes = Base64Bytes::from(b64.as_bytes())
        .decode()
        .map_err(|e| TransactionDecodeError(e.to_string()))?;
    bincode::deserialize(bytes.as_slice()).map_err(|e| TransactionDecodeError(e.to_string()))
}

/// Error decoding wire transaction bytes.
#[derive(Debug, thiserror::Error)]
#[error("can not decode transaction: {0}")]
pub struct TransactionDecodeError(pub String);

/// Error signing a transaction.
#[derive(Debug, thiserror::Error)]
#[error("can not sign transaction: {0}")]
pub struct TransactionSignError(pub String);

/// Error encoding a transaction to base64.
#[derive(Debug, thiserror::Error)]
#[error("can not encode transaction to base64: {0}")]
pub struct TransactionToB64Error(pub String);

/// Parsed instruction with its resolved account keys.
#[derive(Debug)]
pub struct InstructionInt {
    instruction: CompiledInstruction,
    account_keys: Vec<Pubkey>,
}

impl InstructionInt {
    /// The instruction data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.instruction.data.as_slice()
    }

    /// Whether the instruction carries data and accounts.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.instruction.data.is_empty() || self.instruction.accounts.is_empty()
    }

    /// Number of accounts the instruction references.
    #[must_use]
    pub const fn account_count(&self) -> usize {
        self.instruction.accounts.len()
    }

    /// The instruction's program ID.
    #[must_use]
    pub fn program_id(&self) -> Pubkey {
        *self.instruction.program_id(self.account_keys.as_slice())
    }

    /// Resolves the account at the given position in the instruction's
    /// account list.
    #[must_use]
    pub fn account(&self, position: u8) -> Option<Pubkey> {
        let account_index = self.instruction.accounts.get(position as usize).copied()?;
        self.account_keys.get(account_index as usize).copied()
    }
}

/// Wrapper around a versioned transaction with the accessors the scheme
/// needs.
#[derive(Debug, Clone)]
pub struct TransactionInt {
    inner: VersionedTransaction,
}

impl TransactionInt {
    /// Wraps a transaction.
    #[must_use]
    pub const fn new(transaction: VersionedTransaction) -> Self {
        Self { inner: transaction }
    }

    /// The wrapped transaction.
    #[must_use]
    pub const fn inner(&self) -> &VersionedTransaction {
        &self.inner
    }

    /// Unwraps the transaction.
    #[must_use]
    pub fn into_inner(self) -> VersionedTransaction {
        self.inner
    }

    /// Number of top-level instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.inner.message.instructions().len()
    }

    /// The instruction at the given index with resolved account keys.
    #[must_use]
    pub fn instruction(&self, index: usize) -> Option<InstructionInt> {
        let instruction = self.inner.message.instructions().get(index).cloned()?;
        let account_keys = self.inner.message.static_account_keys().to_vec();
        Some(InstructionInt {
            instruction,
            account_keys,
        })
    }

    /// The fee payer (first static account).
    #[must_use]
    pub fn fee_payer(&self) -> Option<Pubkey> {
        self.inner.message.static_account_keys().first().copied()
    }

    /// Whether every required signature slot holds a real signature.
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        let num_required = self.inner.message.header().num_required_signatures as usize;
        if self.inner.signatures.len() < num_required {
            return false;
        }
        let default = Signature::default();
        self.inner.signatures.iter().all(|sig| *sig != default)
    }

    /// Signs the transaction with any signer, placing the signature in the
    /// signer's required slot.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionSignError`] if the signer is not among the
    /// required signers or the signing operation fails.
    pub fn sign_with_keypair<S: Signer>(self, signer: &S) -> Result<Self, TransactionSignError> {
        let mut tx = self.inner;
        let msg_bytes = tx.message.serialize();
        let signature = signer
            .try_sign_message(msg_bytes.as_slice())
            .map_err(|e| TransactionSignError(format!("{e}")))?;

        let num_required = tx.message.header().num_required_signatures as usize;
        let static_keys = tx.message.static_account_keys();

        let pos = static_keys[..num_required.min(static_keys.len())]
            .iter()
            .position(|k| *k == signer.pubkey())
            .ok_or_else(|| {
                TransactionSignError("signer not found in required signers".to_owned())
            })?;

        if tx.signatures.len() < num_required {
            tx.signatures.resize(num_required, Signature::default());
        }
        tx.signatures[pos] = signature;
        Ok(Self { inner: tx })
    }

    /// Encodes the transaction to base64 wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionToB64Error`] if serialization fails.
    pub fn as_base64(&self) -> Result<String, TransactionToB64Error> {
        let bytes =
            bincode::serialize(&self.inner).map_err(|e| TransactionToB64Error(format!("{e}")))?;
        Ok(Base64Bytes::encode(bytes).to_string())
    }
}
