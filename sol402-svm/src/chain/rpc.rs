//! RPC client abstraction for Solana.
//!
//! The payment flow needs a narrow slice of the Solana RPC surface:
//! account fetches, blockhash and block height reads, signature status,
//! submission, and simulation. [`RpcClientLike`] captures exactly that
//! slice so the builder, introspector, and settle engine stay testable
//! against in-memory fakes, while [`SolanaRpc`] adapts the real
//! `solana-client` nonblocking client.

use std::future::Future;

use solana_account::Account;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_commitment_config::CommitmentConfig;
use solana_hash::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction_status::{TransactionConfirmationStatus, UiTransactionEncoding};

/// An RPC-level failure.
#[derive(Debug, thiserror::Error)]
#[error("rpc error: {0}")]
pub struct RpcError(pub String);

/// Simulation options forwarded to `simulateTransaction`.
#[derive(Debug, Clone, Copy)]
pub struct SimulateConfig {
    /// Verify the transaction's signatures during simulation.
    pub sig_verify: bool,
    /// Replace the transaction's blockhash with a recent one.
    pub replace_recent_blockhash: bool,
}

/// The parts of a simulation result the payment flow inspects.
#[derive(Debug, Clone, Default)]
pub struct SimulationSummary {
    /// The execution error, if the simulated transaction failed.
    pub err: Option<String>,
    /// Compute units consumed by the simulated execution.
    pub units_consumed: Option<u64>,
}

/// The parts of a signature status the confirmation loop inspects.
#[derive(Debug, Clone, Default)]
pub struct SignatureStatusSummary {
    /// The execution error, if the transaction landed but failed.
    pub err: Option<String>,
    /// Whether the transaction reached `confirmed` or `finalized`.
    pub confirmed: bool,
}

/// A recent blockhash together with its expiry bound.
#[derive(Debug, Clone, Copy)]
pub struct BlockhashLifetime {
    /// The blockhash to bind the transaction to.
    pub blockhash: Hash,
    /// The last block height at which the blockhash is still valid.
    pub last_valid_block_height: u64,
}

/// The slice of Solana RPC the payment flow depends on.
///
/// All reads use `confirmed` commitment. Implementations must be cheap to
/// share by reference; one client per `(network, url)` may be cached.
pub trait RpcClientLike: Send + Sync {
    /// Fetches a single account, `None` if it does not exist.
    fn get_account(
        &self,
        pubkey: &Pubkey,
    ) -> impl Future<Output = Result<Option<Account>, RpcError>> + Send;

    /// Fetches several accounts in one call, `None` per missing account.
    fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> impl Future<Output = Result<Vec<Option<Account>>, RpcError>> + Send;

    /// Fetches the latest blockhash and its expiry block height.
    fn get_latest_blockhash(
        &self,
    ) -> impl Future<Output = Result<BlockhashLifetime, RpcError>> + Send;

    /// Fetches the current block height.
    fn get_block_height(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Fetches the status of a submitted signature, `None` if unknown.
    fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<Option<SignatureStatusSummary>, RpcError>> + Send;

    /// Submits a signed transaction with preflight skipped.
    fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, RpcError>> + Send;

    /// Simulates a transaction.
    fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: SimulateConfig,
    ) -> impl Future<Output = Result<SimulationSummary, RpcError>> + Send;
}

/// [`RpcClientLike`] over the `solana-client` nonblocking [`RpcClient`].
pub struct SolanaRpc {
    client: RpcClient,
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("url", &self.client.url())
            .finish_non_exhaustive()
    }
}

impl SolanaRpc {
    /// Connects to an HTTP RPC endpoint with `confirmed` commitment.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: RpcClient::new_with_commitment(url.into(), CommitmentConfig::confirmed()),
        }
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: RpcClient) -> Self {
        Self { client }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &RpcClient {
        &self.client
    }
}

impl RpcClientLike for SolanaRpc {
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, RpcError> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, CommitmentConfig::confirmed())
            .await
            .map_err(|e| RpcError(e.to_string()))?;
        Ok(response.value)
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, RpcError> {
        let response = self
            .client
            .get_multiple_accounts_with_commitment(pubkeys, CommitmentConfig::confirmed())
            .await
            .map_err(|e| RpcError(e.to_string()))?;
        Ok(response.value)
    }

    async fn get_latest_blockhash(&self) -> Result<BlockhashLifetime, RpcError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await
            .map_err(|e| RpcError(e.to_string()))?;
        Ok(BlockhashLifetime {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, RpcError> {
        self.client
            .get_block_height_with_commitment(CommitmentConfig::confirmed())
            .await
            .map_err(|e| RpcError(e.to_string()))
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatusSummary>, RpcError> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| RpcError(e.to_string()))?;
        let status = response.value.into_iter().next().flatten();
        Ok(status.map(|s| SignatureStatusSummary {
            err: s.err.as_ref().map(|e| format!("{e:?}")),
            confirmed: matches!(
                s.confirmation_status,
                Some(
                    TransactionConfirmationStatus::Confirmed
                        | TransactionConfirmationStatus::Finalized
                )
            ),
        }))
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, RpcError> {
        self.client
            .send_transaction_with_config(
                transaction,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    encoding: Some(UiTransactionEncoding::Base64),
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await
            .map_err(|e| RpcError(e.to_string()))
    }

    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
        config: SimulateConfig,
    ) -> Result<SimulationSummary, RpcError> {
        let response = self
            .client
            .simulate_transaction_with_config(
                transaction,
                RpcSimulateTransactionConfig {
                    sig_verify: config.sig_verify,
                    replace_recent_blockhash: config.replace_recent_blockhash,
                    commitment: Some(CommitmentConfig::confirmed()),
                    ..RpcSimulateTransactionConfig::default()
                },
            )
            .await
            .map_err(|e| RpcError(e.to_string()))?;
        Ok(SimulationSummary {
            err: response.value.err.as_ref().map(|e| format!("{e:?}")),
            units_consumed: response.value.units_consumed,
        })
    }
}
