//! Deterministic transaction introspection for the exact scheme.
//!
//! Validates a decoded payment transaction against a strict template:
//! compute budget instructions first, then an optional create-ATA, then the
//! `TransferChecked`. Checks run in a fixed order and abort on the first
//! failure with the matching [`ErrorReason`], so a given `(transaction,
//! requirements)` pair always produces the same verdict.
//!
//! Everything here is pure computation; account existence, amount, and
//! simulation checks need RPC and live in
//! [`facilitator`](crate::exact::facilitator).

use solana_compute_budget_interface::ID as COMPUTE_BUDGET_PROGRAM;
use solana_pubkey::Pubkey;

use sol402::ErrorReason;

use crate::chain::provider::VerificationCaps;
use crate::chain::types::Address;
use crate::exact::types::{
    ATA_PROGRAM_PUBKEY, COMPUTE_UNIT_LIMIT_DISCRIMINATOR, COMPUTE_UNIT_PRICE_DISCRIMINATOR,
    InstructionInt, TransactionInt, derive_ata,
};

/// What the transfer must look like, taken from the payment requirements.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequirement {
    /// Expected mint address.
    pub asset: Pubkey,
    /// Expected recipient (token owner, not the ATA).
    pub pay_to: Pubkey,
}

/// Parsed `TransferChecked` fields.
#[derive(Debug, Clone, Copy)]
pub struct ParsedTransfer {
    /// Transfer amount in atomic units.
    pub amount: u64,
    /// Source token account.
    pub source: Pubkey,
    /// Token mint.
    pub mint: Pubkey,
    /// Destination token account.
    pub destination: Pubkey,
    /// Transfer authority (the payer).
    pub authority: Pubkey,
    /// SPL Token or Token-2022 program.
    pub token_program: Pubkey,
}

/// A transaction that passed template validation.
#[derive(Debug)]
pub struct ValidatedTemplate {
    /// The parsed transfer instruction.
    pub transfer: ParsedTransfer,
    /// Whether the transaction creates the destination ATA.
    pub has_create_ata: bool,
    /// The declared compute unit limit.
    pub compute_unit_limit: u32,
    /// The declared compute unit price, in microlamports.
    pub compute_unit_price: u64,
}

/// Best-effort payer extraction for logs and error responses.
///
/// The payer is the transfer authority — account slot 3 of the transfer
/// instruction's indices. Works on any decoded transaction, valid or not.
#[must_use]
pub fn payer_hint(transaction: &TransactionInt) -> Option<Address> {
    let transfer_index = match transaction.instruction_count() {
        4 => 3,
        _ => 2,
    };
    let instruction = transaction.instruction(transfer_index)?;
    instruction.account(3).map(Address::new)
}

/// Validates the transaction's instruction template.
///
/// Checks, in order: instruction count, compute unit limit, compute unit
/// price, the transfer instruction, the optional create-ATA instruction,
/// and the transfer destination. The first failure aborts with its reason.
///
/// # Errors
///
/// Returns the [`ErrorReason`] of the first violated check.
pub fn validate_template(
    transaction: &TransactionInt,
    requirement: &TransferRequirement,
    fee_payer: &Pubkey,
    caps: &VerificationCaps,
) -> Result<ValidatedTemplate, ErrorReason> {
    let count = transaction.instruction_count();
    if count != 3 && count != 4 {
        return Err(ErrorReason::InstructionsLength);
    }

    let compute_unit_limit = validate_compute_limit(transaction, caps)?;
    let compute_unit_price = validate_compute_price(transaction, caps)?;

    let has_create_ata = count == 4;
    let transfer_index = if has_create_ata { 3 } else { 2 };
    let transfer = parse_transfer(transaction, transfer_index)?;

    if has_create_ata {
        validate_create_ata(transaction, requirement)?;
    }

    let expected_destination = derive_ata(
        &requirement.pay_to,
        &transfer.token_program,
        &requirement.asset,
    );
    if transfer.destination != expected_destination {
        return Err(ErrorReason::TransferToIncorrectAta);
    }

    // The fee payer must never be the one whose funds move.
    if transfer.authority == *fee_payer {
        return Err(ErrorReason::InvalidTransaction);
    }

    Ok(ValidatedTemplate {
        transfer,
        has_create_ata,
        compute_unit_limit,
        compute_unit_price,
    })
}

/// Validates instruction 0 as `SetComputeUnitLimit` and returns the limit.
fn validate_compute_limit(
    transaction: &TransactionInt,
    caps: &VerificationCaps,
) -> Result<u32, ErrorReason> {
    let instruction = transaction
        .instruction(0)
        .ok_or(ErrorReason::ComputeLimitInstruction)?;
    let data = instruction.data();
    if instruction.program_id() != COMPUTE_BUDGET_PROGRAM
        || data.first().copied() != Some(COMPUTE_UNIT_LIMIT_DISCRIMINATOR)
        || data.len() != 5
    {
        return Err(ErrorReason::ComputeLimitInstruction);
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[1..5]);
    let units = u32::from_le_bytes(buf);
    if units > caps.max_compute_unit_limit {
        return Err(ErrorReason::ComputeLimitInstruction);
    }
    Ok(units)
}

/// Validates instruction 1 as `SetComputeUnitPrice` within the price cap.
fn validate_compute_price(
    transaction: &TransactionInt,
    caps: &VerificationCaps,
) -> Result<u64, ErrorReason> {
    let instruction = transaction
        .instruction(1)
        .ok_or(ErrorReason::ComputePriceInstruction)?;
    let data = instruction.data();
    if instruction.program_id() != COMPUTE_BUDGET_PROGRAM
        || data.first().copied() != Some(COMPUTE_UNIT_PRICE_DISCRIMINATOR)
        || data.len() != 9
    {
        return Err(ErrorReason::ComputePriceInstruction);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[1..9]);
    let microlamports = u64::from_le_bytes(buf);
    if microlamports > caps.max_compute_unit_price {
        return Err(ErrorReason::ComputePriceTooHigh);
    }
    Ok(microlamports)
}

/// Parses the transfer instruction, differentiating the two token programs.
fn parse_transfer(
    transaction: &TransactionInt,
    index: usize,
) -> Result<ParsedTransfer, ErrorReason> {
    let instruction = transaction
        .instruction(index)
        .ok_or(ErrorReason::InvalidInstructions)?;
    if instruction.is_empty() {
        return Err(ErrorReason::NotATransferInstruction);
    }

    let program_id = instruction.program_id();
    // Both token programs share the TransferChecked layout; the program ID
    // decides which rejection reason applies.
    let amount = if program_id == spl_token::id() {
        unpack_transfer_checked(&instruction).ok_or(ErrorReason::NotSplTokenTransferChecked)?
    } else if program_id == spl_token_2022::id() {
        unpack_transfer_checked(&instruction).ok_or(ErrorReason::NotToken2022TransferChecked)?
    } else {
        return Err(ErrorReason::NotATransferInstruction);
    };

    let source = instruction
        .account(0)
        .ok_or(ErrorReason::InvalidInstructions)?;
    let mint = instruction
        .account(1)
        .ok_or(ErrorReason::InvalidInstructions)?;
    let destination = instruction
        .account(2)
        .ok_or(ErrorReason::InvalidInstructions)?;
    let authority = instruction
        .account(3)
        .ok_or(ErrorReason::InvalidInstructions)?;

    Ok(ParsedTransfer {
        amount,
        source,
        mint,
        destination,
        authority,
        token_program: program_id,
    })
}

/// Unpacks instruction data as `TransferChecked`, returning the amount.
fn unpack_transfer_checked(instruction: &InstructionInt) -> Option<u64> {
    let parsed = spl_token::instruction::TokenInstruction::unpack(instruction.data()).ok()?;
    match parsed {
        spl_token::instruction::TokenInstruction::TransferChecked { amount, .. } => Some(amount),
        _ => None,
    }
}

/// Validates instruction 2 as a create-ATA for the expected recipient and
/// mint.
fn validate_create_ata(
    transaction: &TransactionInt,
    requirement: &TransferRequirement,
) -> Result<(), ErrorReason> {
    let instruction = transaction
        .instruction(2)
        .ok_or(ErrorReason::CreateAtaInstruction)?;
    if instruction.program_id() != ATA_PROGRAM_PUBKEY || instruction.account_count() < 6 {
        return Err(ErrorReason::CreateAtaInstruction);
    }
    // Create ([]/[0]) or CreateIdempotent ([1]); anything else is not a
    // create-ATA.
    match instruction.data() {
        [] | [0] | [1] => {}
        _ => return Err(ErrorReason::CreateAtaInstruction),
    }

    let owner = instruction
        .account(2)
        .ok_or(ErrorReason::CreateAtaInstruction)?;
    let mint = instruction
        .account(3)
        .ok_or(ErrorReason::CreateAtaInstruction)?;

    if owner != requirement.pay_to {
        return Err(ErrorReason::CreateAtaIncorrectPayee);
    }
    if mint != requirement.asset {
        return Err(ErrorReason::CreateAtaIncorrectAsset);
    }
    Ok(())
}
