//! Transaction confirmation strategies.
//!
//! Settlement submits with preflight skipped and then waits for the
//! signature to reach `confirmed` commitment. Two strategies implement the
//! wait:
//!
//! - a **subscription** race: a push notification from the RPC websocket,
//!   raced against a blockhash-expiry watcher and the settlement deadline;
//! - a **polling** loop: signature status and block height every poll
//!   interval until confirmation, expiry, or the deadline.
//!
//! [`confirm_transaction`] prefers the subscription when a push channel is
//! configured and falls back to polling when the channel fails for any
//! reason other than a settlement outcome.
//!
//! Both strategies return the same [`ConfirmationOutcome`]; blockhash
//! expiry and deadline timeout are distinct outcomes so callers can decide
//! whether a retry with a fresh payload makes sense.

use std::time::Duration;

use futures_util::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::RpcSignatureSubscribeConfig;
use solana_client::rpc_response::RpcSignatureResult;
use solana_commitment_config::CommitmentConfig;
use solana_signature::Signature;

use sol402::BoxFuture;

use super::rpc::{RpcClientLike, RpcError};

/// How a confirmation wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// The transaction reached `confirmed` commitment.
    Confirmed(Signature),
    /// The transaction landed but failed execution.
    Failed(Signature, String),
    /// The chain advanced past the transaction's `lastValidBlockHeight`.
    BlockhashExpired(Signature),
    /// The settlement deadline elapsed without a decision.
    TimedOut(Signature),
}

/// Timing bounds for a confirmation wait.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationParams {
    /// Hard deadline for the whole wait.
    pub deadline: Duration,
    /// Interval between status/block-height polls.
    pub poll_interval: Duration,
}

impl Default for ConfirmationParams {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// Error raised by a push-subscription channel itself (not by the
/// transaction). Triggers the polling fallback.
#[derive(Debug, thiserror::Error)]
#[error("signature subscription error: {0}")]
pub struct SubscriptionError(pub String);

/// A push channel that resolves once a signature is processed at
/// `confirmed` commitment.
///
/// `Ok(None)` means the transaction succeeded; `Ok(Some(err))` means it
/// landed but failed execution.
pub trait SignatureSubscription: Send + Sync {
    /// Waits for the signature notification.
    fn wait_for_signature<'a>(
        &'a self,
        signature: &'a Signature,
    ) -> BoxFuture<'a, Result<Option<String>, SubscriptionError>>;
}

/// [`SignatureSubscription`] over the RPC websocket endpoint.
///
/// A fresh pubsub connection is opened per wait; settlement waits are rare
/// and long-lived enough that connection reuse buys nothing.
#[derive(Debug, Clone)]
pub struct PubsubSubscription {
    ws_url: String,
}

impl PubsubSubscription {
    /// Creates a subscription source for a `ws://` / `wss://` endpoint.
    #[must_use]
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }
}

impl SignatureSubscription for PubsubSubscription {
    fn wait_for_signature<'a>(
        &'a self,
        signature: &'a Signature,
    ) -> BoxFuture<'a, Result<Option<String>, SubscriptionError>> {
        Box::pin(async move {
            let client = PubsubClient::new(&self.ws_url)
                .await
                .map_err(|e| SubscriptionError(e.to_string()))?;
            let config = RpcSignatureSubscribeConfig {
                commitment: Some(CommitmentConfig::confirmed()),
                enable_received_notification: Some(false),
            };
            let (mut stream, _unsubscribe) = client
                .signature_subscribe(signature, Some(config))
                .await
                .map_err(|e| SubscriptionError(e.to_string()))?;
            match stream.next().await {
                Some(response) => match response.value {
                    RpcSignatureResult::ProcessedSignature(processed) => {
                        Ok(processed.err.map(|e| format!("{e:?}")))
                    }
                    RpcSignatureResult::ReceivedSignature(_) => Err(SubscriptionError(
                        "unexpected received-signature notification".to_owned(),
                    )),
                },
                None => Err(SubscriptionError("subscription stream closed".to_owned())),
            }
        })
    }
}

/// Polls signature status and block height until an outcome or the
/// deadline.
///
/// # Errors
///
/// Returns [`RpcError`] if a poll itself fails; the caller maps this to an
/// unexpected-settle outcome.
pub async fn confirm_via_polling<R: RpcClientLike>(
    rpc: &R,
    signature: Signature,
    last_valid_block_height: u64,
    params: ConfirmationParams,
) -> Result<ConfirmationOutcome, RpcError> {
    let started = tokio::time::Instant::now();
    loop {
        if started.elapsed() >= params.deadline {
            return Ok(ConfirmationOutcome::TimedOut(signature));
        }

        let block_height = rpc.get_block_height().await?;
        if block_height > last_valid_block_height {
            return Ok(ConfirmationOutcome::BlockhashExpired(signature));
        }

        if let Some(status) = rpc.get_signature_status(&signature).await? {
            if let Some(err) = status.err {
                return Ok(ConfirmationOutcome::Failed(signature, err));
            }
            if status.confirmed {
                return Ok(ConfirmationOutcome::Confirmed(signature));
            }
        }

        tokio::time::sleep(params.poll_interval).await;
    }
}

/// Races the push notification against blockhash expiry and the deadline.
///
/// # Errors
///
/// Returns [`SubscriptionError`] if the channel itself fails; the caller
/// falls back to polling.
pub async fn confirm_via_subscription<R: RpcClientLike>(
    rpc: &R,
    subscription: &dyn SignatureSubscription,
    signature: Signature,
    last_valid_block_height: u64,
    params: ConfirmationParams,
) -> Result<ConfirmationOutcome, SubscriptionError> {
    let expiry_watch = async {
        loop {
            match rpc.get_block_height().await {
                Ok(height) if height > last_valid_block_height => return,
                // Watcher errors are not decisive; the race continues on
                // the other branches.
                Ok(_) | Err(_) => tokio::time::sleep(params.poll_interval).await,
            }
        }
    };

    tokio::select! {
        result = subscription.wait_for_signature(&signature) => match result? {
            None => Ok(ConfirmationOutcome::Confirmed(signature)),
            Some(err) => Ok(ConfirmationOutcome::Failed(signature, err)),
        },
        () = expiry_watch => Ok(ConfirmationOutcome::BlockhashExpired(signature)),
        () = tokio::time::sleep(params.deadline) => Ok(ConfirmationOutcome::TimedOut(signature)),
    }
}

/// Waits for confirmation, preferring the push channel when available.
///
/// A subscription-channel failure (no websocket, dropped stream) falls back
/// to the polling loop with the same deadline; settlement outcomes from the
/// subscription are final.
///
/// # Errors
///
/// Returns [`RpcError`] only if polling itself fails.
pub async fn confirm_transaction<R: RpcClientLike>(
    rpc: &R,
    subscription: Option<&dyn SignatureSubscription>,
    signature: Signature,
    last_valid_block_height: u64,
    params: ConfirmationParams,
) -> Result<ConfirmationOutcome, RpcError> {
    if let Some(subscription) = subscription {
        match confirm_via_subscription(rpc, subscription, signature, last_valid_block_height, params)
            .await
        {
            Ok(outcome) => return Ok(outcome),
            Err(err) => {
                tracing::warn!(%signature, error = %err, "signature subscription failed, falling back to polling");
            }
        }
    }
    confirm_via_polling(rpc, signature, last_valid_block_height, params).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::rpc::{
        BlockhashLifetime, SignatureStatusSummary, SimulateConfig, SimulationSummary,
    };
    use solana_account::Account;
    use solana_pubkey::Pubkey;
    use solana_transaction::versioned::VersionedTransaction;
    use std::sync::Mutex;

    /// Replays scripted block heights and signature statuses.
    struct ScriptedRpc {
        heights: Mutex<Vec<u64>>,
        statuses: Mutex<Vec<Option<SignatureStatusSummary>>>,
    }

    impl ScriptedRpc {
        fn new(heights: Vec<u64>, statuses: Vec<Option<SignatureStatusSummary>>) -> Self {
            Self {
                heights: Mutex::new(heights),
                statuses: Mutex::new(statuses),
            }
        }

        fn pop<T: Clone>(values: &Mutex<Vec<T>>) -> T {
            let mut guard = values.lock().unwrap();
            if guard.len() > 1 {
                guard.remove(0)
            } else {
                guard[0].clone()
            }
        }
    }

    impl RpcClientLike for ScriptedRpc {
        async fn get_account(&self, _: &Pubkey) -> Result<Option<Account>, RpcError> {
            unreachable!("not used by confirmation")
        }

        async fn get_multiple_accounts(
            &self,
            _: &[Pubkey],
        ) -> Result<Vec<Option<Account>>, RpcError> {
            unreachable!("not used by confirmation")
        }

        async fn get_latest_blockhash(&self) -> Result<BlockhashLifetime, RpcError> {
            unreachable!("not used by confirmation")
        }

        async fn get_block_height(&self) -> Result<u64, RpcError> {
            Ok(Self::pop(&self.heights))
        }

        async fn get_signature_status(
            &self,
            _: &Signature,
        ) -> Result<Option<SignatureStatusSummary>, RpcError> {
            Ok(Self::pop(&self.statuses))
        }

        async fn send_transaction(
            &self,
            _: &VersionedTransaction,
        ) -> Result<Signature, RpcError> {
            unreachable!("not used by confirmation")
        }

        async fn simulate_transaction(
            &self,
            _: &VersionedTransaction,
            _: SimulateConfig,
        ) -> Result<SimulationSummary, RpcError> {
            unreachable!("not used by confirmation")
        }
    }

    fn fast_params() -> ConfirmationParams {
        ConfirmationParams {
            deadline: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn polling_confirms() {
        let rpc = ScriptedRpc::new(
            vec![10],
            vec![
                None,
                Some(SignatureStatusSummary {
                    err: None,
                    confirmed: true,
                }),
            ],
        );
        let sig = Signature::default();
        let outcome = confirm_via_polling(&rpc, sig, 100, fast_params()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Confirmed(sig));
    }

    #[tokio::test]
    async fn polling_reports_execution_failure() {
        let rpc = ScriptedRpc::new(
            vec![10],
            vec![Some(SignatureStatusSummary {
                err: Some("custom program error".to_owned()),
                confirmed: false,
            })],
        );
        let sig = Signature::default();
        let outcome = confirm_via_polling(&rpc, sig, 100, fast_params()).await.unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Failed(_, _)));
    }

    #[tokio::test]
    async fn polling_detects_blockhash_expiry() {
        let rpc = ScriptedRpc::new(vec![99, 100, 101], vec![None]);
        let sig = Signature::default();
        let outcome = confirm_via_polling(&rpc, sig, 100, fast_params()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::BlockhashExpired(sig));
    }

    #[tokio::test]
    async fn polling_times_out() {
        let rpc = ScriptedRpc::new(vec![10], vec![None]);
        let sig = Signature::default();
        let outcome = confirm_via_polling(&rpc, sig, 100, fast_params()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::TimedOut(sig));
    }

    struct ImmediateSubscription {
        err: Option<String>,
    }

    impl SignatureSubscription for ImmediateSubscription {
        fn wait_for_signature<'a>(
            &'a self,
            _: &'a Signature,
        ) -> BoxFuture<'a, Result<Option<String>, SubscriptionError>> {
            let err = self.err.clone();
            Box::pin(async move { Ok(err) })
        }
    }

    struct BrokenSubscription;

    impl SignatureSubscription for BrokenSubscription {
        fn wait_for_signature<'a>(
            &'a self,
            _: &'a Signature,
        ) -> BoxFuture<'a, Result<Option<String>, SubscriptionError>> {
            Box::pin(async move { Err(SubscriptionError("no websocket".to_owned())) })
        }
    }

    #[tokio::test]
    async fn subscription_confirms() {
        let rpc = ScriptedRpc::new(vec![10], vec![None]);
        let sub = ImmediateSubscription { err: None };
        let sig = Signature::default();
        let outcome = confirm_transaction(&rpc, Some(&sub), sig, 100, fast_params())
            .await
            .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Confirmed(sig));
    }

    #[tokio::test]
    async fn broken_subscription_falls_back_to_polling() {
        let rpc = ScriptedRpc::new(
            vec![10],
            vec![Some(SignatureStatusSummary {
                err: None,
                confirmed: true,
            })],
        );
        let sig = Signature::default();
        let outcome = confirm_transaction(&rpc, Some(&BrokenSubscription), sig, 100, fast_params())
            .await
            .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Confirmed(sig));
    }
}
