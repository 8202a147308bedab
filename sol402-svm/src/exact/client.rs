//! Client-side payment signing for the exact scheme.
//!
//! Builds the transfer transaction a 402 challenge asks for: resolves the
//! mint's owning token program, derives the source and destination ATAs,
//! prepends a create-ATA instruction when the destination does not exist
//! yet, estimates the compute unit limit by simulation, and partially signs
//! with the client key. The fee payer slot is left for the facilitator.

use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_instruction::{AccountMeta, Instruction};
use solana_hash::Hash;
use solana_message::v0::Message as MessageV0;
use solana_message::VersionedMessage;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_pack::Pack;

use sol402::proto::{ExactSolanaPayload, PaymentPayload, PaymentRequirements};
use sol402::{SCHEME_EXACT, encoding};

use crate::chain::rpc::{RpcClientLike, SimulateConfig};
use crate::exact::types::{
    ATA_PROGRAM_PUBKEY, FIXED_COMPUTE_UNIT_PRICE, SYSTEM_PROGRAM_PUBKEY, TransactionInt,
    derive_ata,
};

/// Errors building a payment transaction.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The requirements carry no `extra.feePayer`.
    #[error("feePayer is required")]
    MissingFeePayer,
    /// A requirements field failed to parse.
    #[error("invalid payment requirements: {0}")]
    InvalidRequirements(String),
    /// The mint is owned by neither token program.
    #[error("unsupported mint {0}: unknown owner")]
    UnsupportedMint(Pubkey),
    /// An RPC call failed.
    #[error("rpc failure: {0}")]
    Rpc(String),
    /// Message compilation or signing failed.
    #[error("signing failure: {0}")]
    Signing(String),
}

/// Mint information resolved from the chain.
#[derive(Debug, Clone, Copy)]
pub struct Mint {
    /// Number of decimal places.
    pub decimals: u8,
    /// The owning token program (SPL Token or Token-2022).
    pub token_program: Pubkey,
}

/// Fetches mint information and resolves its owning token program.
///
/// # Errors
///
/// Returns [`BuildError`] if the account is missing, unparsable, or owned
/// by neither token program.
pub async fn fetch_mint<R: RpcClientLike>(rpc: &R, mint: &Pubkey) -> Result<Mint, BuildError> {
    let account = rpc
        .get_account(mint)
        .await
        .map_err(|e| BuildError::Rpc(e.to_string()))?
        .ok_or_else(|| BuildError::InvalidRequirements(format!("mint {mint} not found")))?;

    if account.owner == spl_token::id() {
        let state = spl_token::state::Mint::unpack(&account.data)
            .map_err(|e| BuildError::InvalidRequirements(format!("mint {mint}: {e}")))?;
        Ok(Mint {
            decimals: state.decimals,
            token_program: spl_token::id(),
        })
    } else if account.owner == spl_token_2022::id() {
        let state = spl_token_2022::state::Mint::unpack(&account.data)
            .map_err(|e| BuildError::InvalidRequirements(format!("mint {mint}: {e}")))?;
        Ok(Mint {
            decimals: state.decimals,
            token_program: spl_token_2022::id(),
        })
    } else {
        Err(BuildError::UnsupportedMint(*mint))
    }
}

/// Builds a create-associated-token-account instruction with the
/// facilitator as rent payer.
fn create_ata_instruction(
    fee_payer: &Pubkey,
    ata: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: ATA_PROGRAM_PUBKEY,
        accounts: vec![
            AccountMeta::new(*fee_payer, true),
            AccountMeta::new(*ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_PUBKEY, false),
            AccountMeta::new_readonly(*token_program, false),
        ],
        data: vec![0],
    }
}

/// Estimates the compute unit limit by simulating the instruction set with
/// a provisional limit appended.
async fn estimate_compute_units<R: RpcClientLike>(
    rpc: &R,
    fee_payer: &Pubkey,
    instructions: &[Instruction],
    recent_blockhash: Hash,
) -> Result<u32, BuildError> {
    let mut with_limit = instructions.to_vec();
    with_limit.push(ComputeBudgetInstruction::set_compute_unit_limit(100_000));

    let message = MessageV0::try_compile(fee_payer, &with_limit, &[], recent_blockhash)
        .map_err(|e| BuildError::Signing(format!("{e:?}")))?;
    let message = VersionedMessage::V0(message);
    let num_required = message.header().num_required_signatures as usize;
    let transaction = VersionedTransaction {
        signatures: vec![solana_signature::Signature::default(); num_required],
        message,
    };

    let summary = rpc
        .simulate_transaction(
            &transaction,
            SimulateConfig {
                sig_verify: false,
                replace_recent_blockhash: true,
            },
        )
        .await
        .map_err(|e| BuildError::Rpc(e.to_string()))?;

    let units = summary
        .units_consumed
        .ok_or_else(|| BuildError::Rpc("simulation returned no units_consumed".to_owned()))?;
    u32::try_from(units).map_err(|_| BuildError::Rpc("unit estimate overflows u32".to_owned()))
}

/// Builds and partially signs the transfer transaction for a requirement.
///
/// Returns the base64 wire form. Instruction order is
/// `[SetComputeUnitLimit, SetComputeUnitPrice, (CreateATA?), TransferChecked]`
/// with the facilitator's address as fee payer.
///
/// # Errors
///
/// Returns [`BuildError`] on missing fee payer, bad requirements, RPC
/// failure, or signing failure.
pub async fn build_signed_transfer_transaction<S: Signer + Sync, R: RpcClientLike>(
    signer: &S,
    rpc: &R,
    requirements: &PaymentRequirements,
) -> Result<String, BuildError> {
    let fee_payer: Pubkey = requirements
        .fee_payer()
        .ok_or(BuildError::MissingFeePayer)?
        .parse()
        .map_err(|_| BuildError::InvalidRequirements("feePayer is not base58".to_owned()))?;
    let pay_to: Pubkey = requirements
        .pay_to
        .parse()
        .map_err(|_| BuildError::InvalidRequirements("payTo is not base58".to_owned()))?;
    let asset: Pubkey = requirements
        .asset
        .parse()
        .map_err(|_| BuildError::InvalidRequirements("asset is not base58".to_owned()))?;
    let amount = requirements.amount().ok_or_else(|| {
        BuildError::InvalidRequirements(format!(
            "maxAmountRequired is not a u64: {}",
            requirements.max_amount_required
        ))
    })?;

    let mint = fetch_mint(rpc, &asset).await?;
    let client_pubkey = signer.pubkey();
    let source_ata = derive_ata(&client_pubkey, &mint.token_program, &asset);
    let destination_ata = derive_ata(&pay_to, &mint.token_program, &asset);

    let destination_exists = rpc
        .get_account(&destination_ata)
        .await
        .map_err(|e| BuildError::Rpc(e.to_string()))?
        .is_some();

    let transfer = if mint.token_program == spl_token::id() {
        spl_token::instruction::transfer_checked(
            &mint.token_program,
            &source_ata,
            &asset,
            &destination_ata,
            &client_pubkey,
            &[],
            amount,
            mint.decimals,
        )
        .map_err(|e| BuildError::Signing(format!("{e}")))?
    } else {
        spl_token_2022::instruction::transfer_checked(
            &mint.token_program,
            &source_ata,
            &asset,
            &destination_ata,
            &client_pubkey,
            &[],
            amount,
            mint.decimals,
        )
        .map_err(|e| BuildError::Signing(format!("{e}")))?
    };

    let mut instructions = Vec::with_capacity(3);
    instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
        FIXED_COMPUTE_UNIT_PRICE,
    ));
    if !destination_exists {
        instructions.push(create_ata_instruction(
            &fee_payer,
            &destination_ata,
            &pay_to,
            &asset,
            &mint.token_program,
        ));
    }
    instructions.push(transfer);

    let lifetime = rpc
        .get_latest_blockhash()
        .await
        .map_err(|e| BuildError::Rpc(e.to_string()))?;

    let estimated_units =
        estimate_compute_units(rpc, &fee_payer, &instructions, lifetime.blockhash).await?;

    let mut final_instructions = Vec::with_capacity(instructions.len() + 1);
    final_instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
        estimated_units,
    ));
    final_instructions.extend(instructions);

    let message =
        MessageV0::try_compile(&fee_payer, &final_instructions, &[], lifetime.blockhash)
            .map_err(|e| BuildError::Signing(format!("{e:?}")))?;
    let transaction = VersionedTransaction {
        signatures: vec![],
        message: VersionedMessage::V0(message),
    };

    let signed = TransactionInt::new(transaction)
        .sign_with_keypair(signer)
        .map_err(|e| BuildError::Signing(e.to_string()))?;
    signed
        .as_base64()
        .map_err(|e| BuildError::Signing(e.to_string()))
}

/// Builds the complete `X-PAYMENT` header value for a requirement.
///
/// # Errors
///
/// Returns [`BuildError`] if the requirements are not an exact-scheme
/// Solana offer or transaction building fails.
pub async fn build_payment_header<S: Signer + Sync, R: RpcClientLike>(
    signer: &S,
    rpc: &R,
    requirements: &PaymentRequirements,
) -> Result<String, BuildError> {
    if requirements.scheme != SCHEME_EXACT {
        return Err(BuildError::InvalidRequirements(format!(
            "unsupported scheme: {}",
            requirements.scheme
        )));
    }
    if !requirements.network.is_solana() {
        return Err(BuildError::InvalidRequirements(format!(
            "not a Solana network: {}",
            requirements.network
        )));
    }

    let transaction = build_signed_transfer_transaction(signer, rpc, requirements).await?;
    let payload = PaymentPayload::exact(
        requirements.network,
        &ExactSolanaPayload { transaction },
    );
    Ok(encoding::encode_payment(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::types::{
        COMPUTE_UNIT_LIMIT_DISCRIMINATOR, COMPUTE_UNIT_PRICE_DISCRIMINATOR, decode_transaction,
    };
    use crate::testutil::FakeRpc;
    use sol402::Network;
    use solana_account::Account;
    use solana_keypair::Keypair;
    use solana_signature::Signature;

    fn requirements(fee_payer: &Pubkey, pay_to: &Pubkey, mint: &Pubkey) -> PaymentRequirements {
        PaymentRequirements {
            scheme: SCHEME_EXACT.to_owned(),
            network: Network::SolanaDevnet,
            max_amount_required: "1800".to_owned(),
            resource: "https://api.example.com/weather".to_owned(),
            description: String::new(),
            mime_type: "application/json".to_owned(),
            output_schema: None,
            pay_to: pay_to.to_string(),
            max_timeout_seconds: 60,
            asset: mint.to_string(),
            extra: Some(serde_json::json!({ "feePayer": fee_payer.to_string() })),
        }
    }

    #[tokio::test]
    async fn builds_three_instruction_transaction_when_destination_exists() {
        let client = Keypair::new();
        let facilitator = Keypair::new();
        let pay_to = Keypair::new().pubkey();
        let mint = Keypair::new().pubkey();

        let rpc = FakeRpc::new();
        rpc.put_spl_mint(mint, 6);
        let destination = derive_ata(&pay_to, &spl_token::id(), &mint);
        rpc.put_token_account(destination);

        let reqs = requirements(&facilitator.pubkey(), &pay_to, &mint);
        let b64 = build_signed_transfer_transaction(&client, &rpc, &reqs)
            .await
            .unwrap();
        let tx = TransactionInt::new(decode_transaction(&b64).unwrap());

        assert_eq!(tx.instruction_count(), 3);
        assert_eq!(tx.fee_payer(), Some(facilitator.pubkey()));

        let limit = tx.instruction(0).unwrap();
        assert_eq!(limit.program_id(), solana_compute_budget_interface::ID);
        assert_eq!(limit.data()[0], COMPUTE_UNIT_LIMIT_DISCRIMINATOR);
        assert_eq!(
            u32::from_le_bytes(limit.data()[1..5].try_into().unwrap()),
            4_806
        );

        let price = tx.instruction(1).unwrap();
        assert_eq!(price.program_id(), solana_compute_budget_interface::ID);
        assert_eq!(price.data()[0], COMPUTE_UNIT_PRICE_DISCRIMINATOR);
        assert_eq!(
            u64::from_le_bytes(price.data()[1..9].try_into().unwrap()),
            FIXED_COMPUTE_UNIT_PRICE
        );

        let transfer = tx.instruction(2).unwrap();
        assert_eq!(transfer.program_id(), spl_token::id());
        assert_eq!(transfer.account(2), Some(destination));
        assert_eq!(transfer.account(3), Some(client.pubkey()));

        // Client slot signed, fee payer slot left empty.
        assert!(!tx.is_fully_signed());
        assert_eq!(tx.inner().signatures[0], Signature::default());
    }

    #[tokio::test]
    async fn prepends_create_ata_when_destination_is_missing() {
        let client = Keypair::new();
        let facilitator = Keypair::new();
        let pay_to = Keypair::new().pubkey();
        let mint = Keypair::new().pubkey();

        let rpc = FakeRpc::new();
        rpc.put_spl_mint(mint, 6);

        let reqs = requirements(&facilitator.pubkey(), &pay_to, &mint);
        let b64 = build_signed_transfer_transaction(&client, &rpc, &reqs)
            .await
            .unwrap();
        let tx = TransactionInt::new(decode_transaction(&b64).unwrap());

        assert_eq!(tx.instruction_count(), 4);
        let create = tx.instruction(2).unwrap();
        assert_eq!(create.program_id(), ATA_PROGRAM_PUBKEY);
        // payer, ata, owner, mint, system, token program
        assert_eq!(create.account(0), Some(facilitator.pubkey()));
        assert_eq!(create.account(2), Some(pay_to));
        assert_eq!(create.account(3), Some(mint));

        let transfer = tx.instruction(3).unwrap();
        assert_eq!(transfer.program_id(), spl_token::id());
    }

    #[tokio::test]
    async fn missing_fee_payer_is_an_error() {
        let client = Keypair::new();
        let pay_to = Keypair::new().pubkey();
        let mint = Keypair::new().pubkey();
        let rpc = FakeRpc::new();
        rpc.put_spl_mint(mint, 6);

        let mut reqs = requirements(&Keypair::new().pubkey(), &pay_to, &mint);
        reqs.extra = None;
        let err = build_signed_transfer_transaction(&client, &rpc, &reqs)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingFeePayer));
        assert_eq!(err.to_string(), "feePayer is required");
    }

    #[tokio::test]
    async fn unknown_mint_owner_is_rejected() {
        let client = Keypair::new();
        let facilitator = Keypair::new();
        let pay_to = Keypair::new().pubkey();
        let mint = Keypair::new().pubkey();

        let rpc = FakeRpc::new();
        rpc.put_account(
            mint,
            Account {
                lamports: 1,
                data: vec![],
                owner: Keypair::new().pubkey(),
                executable: false,
                rent_epoch: 0,
            },
        );

        let reqs = requirements(&facilitator.pubkey(), &pay_to, &mint);
        let err = build_signed_transfer_transaction(&client, &rpc, &reqs)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedMint(_)));
    }

    #[tokio::test]
    async fn header_wraps_payload_envelope() {
        let client = Keypair::new();
        let facilitator = Keypair::new();
        let pay_to = Keypair::new().pubkey();
        let mint = Keypair::new().pubkey();

        let rpc = FakeRpc::new();
        rpc.put_spl_mint(mint, 6);
        rpc.put_token_account(derive_ata(&pay_to, &spl_token::id(), &mint));

        let reqs = requirements(&facilitator.pubkey(), &pay_to, &mint);
        let header = build_payment_header(&client, &rpc, &reqs).await.unwrap();

        let payload = sol402::encoding::decode_payment(&header).unwrap();
        assert_eq!(payload.network, Network::SolanaDevnet);
        assert_eq!(payload.scheme, SCHEME_EXACT);
        let inner = payload.exact_solana().unwrap();
        assert!(decode_transaction(&inner.transaction).is_ok());
    }
}
