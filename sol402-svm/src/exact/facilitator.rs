//! Facilitator-side verification and settlement for the exact scheme.
//!
//! The engine never throws payment rejections: every failure is folded into
//! a [`VerifyResponse`] / [`SettleResponse`] with a machine-readable reason,
//! and anything outside the known set becomes `unexpected_verify_error` /
//! `unexpected_settle_error`. The payer is reported whenever transaction
//! decoding succeeded, valid or not, so callers can identify the offender.

use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;

use sol402::facilitator::{BoxFuture, Facilitator, FacilitatorError};
use sol402::proto::{
    SettleRequest, SettleResponse, SupportedKind, SupportedResponse, VerifyRequest, VerifyResponse,
};
use sol402::{ErrorReason, Network, SCHEME_EXACT, X402_VERSION};

use crate::chain::confirm::{ConfirmationOutcome, confirm_transaction};
use crate::chain::provider::SolanaChainProvider;
use crate::chain::rpc::{RpcClientLike, SimulateConfig};
use crate::chain::types::Address;
use crate::exact::introspect::{TransferRequirement, ValidatedTemplate, payer_hint, validate_template};
use crate::exact::types::{TransactionInt, decode_transaction};

/// A verification failure with the payer attached when known.
#[derive(Debug)]
pub struct VerifyFailure {
    /// The machine-readable reason.
    pub reason: ErrorReason,
    /// The payer, when transaction decoding succeeded.
    pub payer: Option<Address>,
}

impl VerifyFailure {
    const fn bare(reason: ErrorReason) -> Self {
        Self {
            reason,
            payer: None,
        }
    }

    const fn with_payer(reason: ErrorReason, payer: Option<Address>) -> Self {
        Self { reason, payer }
    }
}

/// Result of a successful verification.
#[derive(Debug)]
pub struct VerifyTransferResult {
    /// The payer (transfer authority).
    pub payer: Address,
    /// The verified transaction, client-signed only.
    pub transaction: VersionedTransaction,
}

/// Verifies a payment against requirements and on-chain state.
///
/// Runs the full check sequence: scheme and network agreement, payload and
/// transaction decoding, the instruction template, source/destination ATA
/// existence, the exact amount, and a fully signed simulation.
///
/// # Errors
///
/// Returns [`VerifyFailure`] with the reason of the first failed check.
pub async fn verify_transfer<R: RpcClientLike>(
    provider: &SolanaChainProvider<R>,
    request: &VerifyRequest,
) -> Result<VerifyTransferResult, VerifyFailure> {
    let payload = &request.payment_payload;
    let requirements = &request.payment_requirements;

    if payload.scheme != SCHEME_EXACT || requirements.scheme != SCHEME_EXACT {
        return Err(VerifyFailure::bare(ErrorReason::UnsupportedScheme));
    }
    if payload.network != requirements.network
        || !payload.network.is_solana()
        || payload.network != provider.network()
    {
        return Err(VerifyFailure::bare(ErrorReason::InvalidNetwork));
    }

    let pay_to: Pubkey = requirements
        .pay_to
        .parse()
        .map_err(|_| VerifyFailure::bare(ErrorReason::InvalidPaymentRequirements))?;
    let asset: Pubkey = requirements
        .asset
        .parse()
        .map_err(|_| VerifyFailure::bare(ErrorReason::InvalidPaymentRequirements))?;
    let required_amount = requirements
        .amount()
        .ok_or(VerifyFailure::bare(ErrorReason::InvalidPaymentRequirements))?;

    let inner = payload
        .exact_solana()
        .map_err(|_| VerifyFailure::bare(ErrorReason::InvalidPayload))?;
    let transaction = decode_transaction(&inner.transaction)
        .map_err(|_| VerifyFailure::bare(ErrorReason::InvalidTransaction))?;
    let transaction = TransactionInt::new(transaction);

    // From here on the offender is identifiable; attach the payer to every
    // failure.
    let payer = payer_hint(&transaction);

    let requirement = TransferRequirement { asset, pay_to };
    let template: ValidatedTemplate = validate_template(
        &transaction,
        &requirement,
        &provider.pubkey(),
        provider.caps(),
    )
    .map_err(|reason| VerifyFailure::with_payer(reason, payer))?;

    let accounts = provider
        .rpc()
        .get_multiple_accounts(&[template.transfer.source, template.transfer.destination])
        .await
        .map_err(|_| VerifyFailure::with_payer(ErrorReason::UnexpectedVerifyError, payer))?;
    if accounts.first().is_none_or(Option::is_none) {
        return Err(VerifyFailure::with_payer(
            ErrorReason::SenderAtaNotFound,
            payer,
        ));
    }
    if accounts.get(1).is_none_or(Option::is_none) && !template.has_create_ata {
        return Err(VerifyFailure::with_payer(
            ErrorReason::ReceiverAtaNotFound,
            payer,
        ));
    }

    if template.transfer.amount != required_amount {
        return Err(VerifyFailure::with_payer(
            ErrorReason::AmountMismatch,
            payer,
        ));
    }

    let signed = transaction
        .clone()
        .sign_with_keypair(provider.keypair())
        .map_err(|_| VerifyFailure::with_payer(ErrorReason::UnexpectedVerifyError, payer))?;
    let simulation = provider
        .rpc()
        .simulate_transaction(
            signed.inner(),
            SimulateConfig {
                sig_verify: true,
                replace_recent_blockhash: false,
            },
        )
        .await
        .map_err(|_| VerifyFailure::with_payer(ErrorReason::UnexpectedVerifyError, payer))?;
    if let Some(err) = simulation.err {
        tracing::debug!(error = %err, "payment simulation failed");
        return Err(VerifyFailure::with_payer(
            ErrorReason::SimulationFailed,
            payer,
        ));
    }

    let payer = Address::new(template.transfer.authority);
    Ok(VerifyTransferResult {
        payer,
        transaction: transaction.into_inner(),
    })
}

/// Settles a verified payment: completes the fee-payer signature, submits
/// with preflight skipped, and waits for confirmation.
///
/// Verification runs again in full immediately before submission; state may
/// still change between simulation and execution on-chain, and such
/// divergence is reported, never retried.
pub async fn settle_transfer<R: RpcClientLike>(
    provider: &SolanaChainProvider<R>,
    request: &SettleRequest,
) -> SettleResponse {
    let network = request.payment_requirements.network;
    let verify_request = VerifyRequest {
        payment_payload: request.payment_payload.clone(),
        payment_requirements: request.payment_requirements.clone(),
    };

    let verification = match verify_transfer(provider, &verify_request).await {
        Ok(result) => result,
        Err(failure) => {
            return SettleResponse::failure(
                failure.reason,
                network,
                failure.payer.map(|p| p.to_string()),
                "",
            );
        }
    };
    let payer = verification.payer.to_string();

    let signed = match TransactionInt::new(verification.transaction)
        .sign_with_keypair(provider.keypair())
    {
        Ok(signed) => signed,
        Err(err) => {
            tracing::warn!(error = %err, "fee payer signing failed");
            return SettleResponse::failure(
                ErrorReason::UnexpectedSettleError,
                network,
                Some(payer),
                "",
            );
        }
    };
    if !signed.is_fully_signed() {
        tracing::warn!("undersigned transaction after fee payer signature");
        return SettleResponse::failure(
            ErrorReason::InvalidTransactionState,
            network,
            Some(payer),
            "",
        );
    }

    // Expiry bound for confirmation, read at submit time.
    let lifetime = match provider.rpc().get_latest_blockhash().await {
        Ok(lifetime) => lifetime,
        Err(err) => {
            tracing::warn!(error = %err, "blockhash read failed before submission");
            return SettleResponse::failure(
                ErrorReason::UnexpectedSettleError,
                network,
                Some(payer),
                "",
            );
        }
    };

    let signature: Signature = match provider.rpc().send_transaction(signed.inner()).await {
        Ok(signature) => signature,
        Err(err) => {
            tracing::warn!(error = %err, "transaction submission failed");
            return SettleResponse::failure(
                ErrorReason::UnexpectedSettleError,
                network,
                Some(payer),
                "",
            );
        }
    };

    let outcome = confirm_transaction(
        provider.rpc(),
        provider.subscription(),
        signature,
        lifetime.last_valid_block_height,
        provider.confirmation(),
    )
    .await;

    match outcome {
        Ok(ConfirmationOutcome::Confirmed(signature)) => {
            tracing::info!(%signature, %payer, "payment settled");
            SettleResponse::success(signature.to_string(), network, payer)
        }
        Ok(ConfirmationOutcome::Failed(signature, err)) => {
            tracing::warn!(%signature, error = %err, "settled transaction failed on-chain");
            SettleResponse::failure(
                ErrorReason::UnexpectedSettleError,
                network,
                Some(payer),
                signature.to_string(),
            )
        }
        Ok(ConfirmationOutcome::BlockhashExpired(signature)) => SettleResponse::failure(
            ErrorReason::BlockHeightExceeded,
            network,
            Some(payer),
            signature.to_string(),
        ),
        Ok(ConfirmationOutcome::TimedOut(signature)) => SettleResponse::failure(
            ErrorReason::ConfirmationTimedOut,
            network,
            Some(payer),
            signature.to_string(),
        ),
        Err(err) => {
            tracing::warn!(%signature, error = %err, "confirmation polling failed");
            SettleResponse::failure(
                ErrorReason::UnexpectedSettleError,
                network,
                Some(payer),
                signature.to_string(),
            )
        }
    }
}

/// Facilitator for exact-scheme payments on one Solana network.
pub struct SolanaExactFacilitator<R> {
    provider: SolanaChainProvider<R>,
}

impl<R> std::fmt::Debug for SolanaExactFacilitator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaExactFacilitator")
            .field("provider", &"..")
            .finish_non_exhaustive()
    }
}

impl<R: RpcClientLike> SolanaExactFacilitator<R> {
    /// Creates a facilitator over a chain provider.
    pub const fn new(provider: SolanaChainProvider<R>) -> Self {
        Self { provider }
    }

    /// The chain provider.
    pub const fn provider(&self) -> &SolanaChainProvider<R> {
        &self.provider
    }

    fn network(&self) -> Network {
        self.provider.network()
    }
}

impl<R: RpcClientLike + 'static> Facilitator for SolanaExactFacilitator<R> {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        Box::pin(async move {
            match verify_transfer(&self.provider, &request).await {
                Ok(result) => Ok(VerifyResponse::valid(result.payer.to_string())),
                Err(failure) => Ok(VerifyResponse::invalid(
                    failure.reason,
                    failure.payer.map(|p| p.to_string()),
                )),
            }
        })
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        Box::pin(async move { Ok(settle_transfer(&self.provider, &request).await) })
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        Box::pin(async move {
            Ok(SupportedResponse {
                kinds: vec![SupportedKind {
                    x402_version: X402_VERSION,
                    scheme: SCHEME_EXACT.to_owned(),
                    network: self.network(),
                    extra: Some(serde_json::json!({
                        "feePayer": self.provider.fee_payer().to_string(),
                    })),
                }],
            })
        })
    }
}
