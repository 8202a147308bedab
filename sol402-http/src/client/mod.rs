//! Client-side x402 payment handling for `reqwest`.
//!
//! [`X402Client`] is a `reqwest_middleware::Middleware` that intercepts
//! 402 responses, picks one of the offered payment requirements, builds
//! and signs the Solana payment, and retries the request with the
//! `X-PAYMENT` header attached.

mod selector;

pub use selector::select_requirement;

use std::sync::Arc;

use http::Extensions;
use reqwest::{Request, Response, StatusCode};
use reqwest_middleware as rqm;
use solana_signer::Signer;

use sol402::proto::{PaymentRequired, PaymentRequirements};
use sol402_svm::chain::rpc::RpcClientLike;
use sol402_svm::exact::client::build_payment_header;

use crate::constants::{
    ACCESS_CONTROL_EXPOSE_HEADERS, DEFAULT_MAX_ATOMIC, X_PAYMENT_HEADER,
    X_PAYMENT_RESPONSE_HEADER,
};

/// A pluggable strategy for choosing among offered requirements.
pub type RequirementsSelector =
    dyn Fn(&[PaymentRequirements]) -> Option<usize> + Send + Sync + 'static;

/// Errors raised by the payment middleware.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The 402 body could not be parsed as a payment challenge.
    #[error("invalid 402 response: {0}")]
    InvalidChallenge(String),
    /// No offered requirement is payable by this client.
    #[error("no matching payment requirements")]
    NoMatchingRequirements,
    /// The selected requirement demands more than the configured ceiling.
    #[error("Payment amount exceeds maximum allowed")]
    AmountExceedsMaximum,
    /// Transaction building or signing failed.
    #[error("payment signing failed: {0}")]
    Signing(String),
    /// The original request body cannot be replayed.
    #[error("request is not cloneable")]
    RequestNotCloneable,
}

/// `reqwest` middleware that pays x402 challenges transparently.
pub struct X402Client<S, R> {
    signer: S,
    rpc: Arc<R>,
    max_atomic: u64,
    selector: Option<Arc<RequirementsSelector>>,
}

impl<S, R> std::fmt::Debug for X402Client<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Client")
            .field("max_atomic", &self.max_atomic)
            .finish_non_exhaustive()
    }
}

impl<S, R> X402Client<S, R> {
    /// Creates a paying client with the default 0.1 USDC ceiling.
    pub fn new(signer: S, rpc: R) -> Self {
        Self {
            signer,
            rpc: Arc::new(rpc),
            max_atomic: DEFAULT_MAX_ATOMIC,
            selector: None,
        }
    }

    /// Sets the spending ceiling in atomic units.
    #[must_use]
    pub const fn with_max_atomic(mut self, max_atomic: u64) -> Self {
        self.max_atomic = max_atomic;
        self
    }

    /// Replaces the default requirement selector.
    #[must_use]
    pub fn with_selector(
        mut self,
        selector: impl Fn(&[PaymentRequirements]) -> Option<usize> + Send + Sync + 'static,
    ) -> Self {
        self.selector = Some(Arc::new(selector));
        self
    }
}

impl<S, R> X402Client<S, R>
where
    S: Signer + Sync,
    R: RpcClientLike,
{
    /// Builds the `X-PAYMENT` header for a parsed 402 challenge.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if no requirement is selectable, the amount
    /// exceeds the ceiling, or signing fails.
    pub async fn make_payment_header(
        &self,
        challenge: &PaymentRequired,
    ) -> Result<String, ClientError> {
        let index = match &self.selector {
            Some(selector) => selector(&challenge.accepts),
            None => select_requirement(&challenge.accepts),
        }
        .ok_or(ClientError::NoMatchingRequirements)?;
        let requirement = challenge
            .accepts
            .get(index)
            .ok_or(ClientError::NoMatchingRequirements)?;

        let amount = requirement
            .amount()
            .ok_or_else(|| ClientError::InvalidChallenge("bad maxAmountRequired".to_owned()))?;
        if amount > self.max_atomic {
            return Err(ClientError::AmountExceedsMaximum);
        }

        build_payment_header(&self.signer, self.rpc.as_ref(), requirement)
            .await
            .map_err(|e| ClientError::Signing(e.to_string()))
    }
}

#[async_trait::async_trait]
impl<S, R> rqm::Middleware for X402Client<S, R>
where
    S: Signer + Send + Sync + 'static,
    R: RpcClientLike + 'static,
{
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let response = next.clone().run(req, extensions).await?;

        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        tracing::debug!(url = %response.url(), "received 402, preparing payment");

        let challenge: PaymentRequired = response
            .json()
            .await
            .map_err(|e| middleware_error(ClientError::InvalidChallenge(e.to_string())))?;

        let header = self
            .make_payment_header(&challenge)
            .await
            .map_err(middleware_error)?;

        let mut retry = retry_req.ok_or_else(|| middleware_error(ClientError::RequestNotCloneable))?;
        retry.headers_mut().insert(
            X_PAYMENT_HEADER,
            header
                .parse()
                .map_err(|_| middleware_error(ClientError::Signing("bad header".to_owned())))?,
        );
        retry.headers_mut().insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            http::HeaderValue::from_static(X_PAYMENT_RESPONSE_HEADER),
        );

        next.run(retry, extensions).await
    }
}

fn middleware_error(err: ClientError) -> rqm::Error {
    rqm::Error::Middleware(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sol402::{Network, SCHEME_EXACT};
    use solana_account::Account;
    use solana_keypair::Keypair;
    use solana_hash::Hash;
    use solana_pubkey::Pubkey;
    use solana_signature::Signature;
    use solana_transaction::versioned::VersionedTransaction;
    use sol402_svm::chain::rpc::{
        BlockhashLifetime, RpcError, SignatureStatusSummary, SimulateConfig, SimulationSummary,
    };
    use sol402_svm::exact::types::derive_ata;
    use solana_signer::Signer as _;
    use spl_token::solana_program::program_option::COption;
    use spl_token::solana_program::program_pack::Pack;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Just enough chain state for the transaction builder.
    struct BuilderRpc {
        accounts: Mutex<HashMap<Pubkey, Account>>,
    }

    impl BuilderRpc {
        fn with_mint_and_destination(mint: Pubkey, pay_to: &Pubkey) -> Self {
            let rpc = Self {
                accounts: Mutex::new(HashMap::new()),
            };
            let state = spl_token::state::Mint {
                mint_authority: COption::None,
                supply: 1_000_000_000,
                decimals: 6,
                is_initialized: true,
                freeze_authority: COption::None,
            };
            let mut data = vec![0u8; spl_token::state::Mint::LEN];
            spl_token::state::Mint::pack(state, &mut data).unwrap();
            rpc.accounts.lock().unwrap().insert(
                mint,
                Account {
                    lamports: 1,
                    data,
                    owner: spl_token::id(),
                    executable: false,
                    rent_epoch: 0,
                },
            );
            let destination = derive_ata(pay_to, &spl_token::id(), &mint);
            rpc.accounts.lock().unwrap().insert(
                destination,
                Account {
                    lamports: 1,
                    data: vec![0u8; 165],
                    owner: spl_token::id(),
                    executable: false,
                    rent_epoch: 0,
                },
            );
            rpc
        }
    }

    impl RpcClientLike for BuilderRpc {
        async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, RpcError> {
            Ok(self.accounts.lock().unwrap().get(pubkey).cloned())
        }

        async fn get_multiple_accounts(
            &self,
            pubkeys: &[Pubkey],
        ) -> Result<Vec<Option<Account>>, RpcError> {
            let accounts = self.accounts.lock().unwrap();
            Ok(pubkeys.iter().map(|k| accounts.get(k).cloned()).collect())
        }

        async fn get_latest_blockhash(&self) -> Result<BlockhashLifetime, RpcError> {
            Ok(BlockhashLifetime {
                blockhash: Hash::default(),
                last_valid_block_height: 1_000,
            })
        }

        async fn get_block_height(&self) -> Result<u64, RpcError> {
            Ok(10)
        }

        async fn get_signature_status(
            &self,
            _: &Signature,
        ) -> Result<Option<SignatureStatusSummary>, RpcError> {
            Ok(None)
        }

        async fn send_transaction(
            &self,
            _: &VersionedTransaction,
        ) -> Result<Signature, RpcError> {
            Ok(Signature::default())
        }

        async fn simulate_transaction(
            &self,
            _: &VersionedTransaction,
            _: SimulateConfig,
        ) -> Result<SimulationSummary, RpcError> {
            Ok(SimulationSummary {
                err: None,
                units_consumed: Some(4_806),
            })
        }
    }

    fn requirement(
        fee_payer: &Pubkey,
        pay_to: &Pubkey,
        mint: &Pubkey,
        amount: &str,
    ) -> PaymentRequirements {
        PaymentRequirements {
            scheme: SCHEME_EXACT.to_owned(),
            network: Network::SolanaDevnet,
            max_amount_required: amount.to_owned(),
            resource: "http://localhost/weather".to_owned(),
            description: String::new(),
            mime_type: "application/json".to_owned(),
            output_schema: None,
            pay_to: pay_to.to_string(),
            max_timeout_seconds: 60,
            asset: mint.to_string(),
            extra: Some(serde_json::json!({ "feePayer": fee_payer.to_string() })),
        }
    }

    fn paying_client(
        signer: Keypair,
        rpc: BuilderRpc,
    ) -> rqm::ClientWithMiddleware {
        rqm::ClientBuilder::new(reqwest::Client::new())
            .with(X402Client::new(signer, rpc))
            .build()
    }

    #[tokio::test]
    async fn retries_a_402_with_payment_attached() {
        let signer = Keypair::new();
        let facilitator = Keypair::new();
        let pay_to = Keypair::new().pubkey();
        let mint = Keypair::new().pubkey();
        let rpc = BuilderRpc::with_mint_and_destination(mint, &pay_to);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(header_exists("X-PAYMENT"))
            .respond_with(ResponseTemplate::new(200).set_body_string("sunny"))
            .mount(&server)
            .await;
        let challenge = PaymentRequired::new(
            "X-PAYMENT header is required",
            vec![requirement(&facilitator.pubkey(), &pay_to, &mint, "1800")],
        );
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(402).set_body_json(&challenge))
            .mount(&server)
            .await;

        let client = paying_client(signer, rpc);
        let response = client
            .get(format!("{}/weather", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "sunny");
    }

    #[tokio::test]
    async fn non_402_responses_pass_through() {
        let signer = Keypair::new();
        let pay_to = Keypair::new().pubkey();
        let rpc = BuilderRpc::with_mint_and_destination(pay_to, &pay_to);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/open"))
            .respond_with(ResponseTemplate::new(200).set_body_string("free"))
            .mount(&server)
            .await;

        let client = paying_client(signer, rpc);
        let response = client
            .get(format!("{}/open", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn refuses_amounts_above_the_ceiling() {
        let signer = Keypair::new();
        let facilitator = Keypair::new();
        let pay_to = Keypair::new().pubkey();
        let mint = Keypair::new().pubkey();
        let rpc = BuilderRpc::with_mint_and_destination(mint, &pay_to);

        let challenge = PaymentRequired::new(
            "X-PAYMENT header is required",
            // 200_000 atomic units is above the default 100_000 ceiling.
            vec![requirement(&facilitator.pubkey(), &pay_to, &mint, "200000")],
        );

        let x402 = X402Client::new(signer, rpc);
        let err = x402.make_payment_header(&challenge).await.unwrap_err();
        assert!(matches!(err, ClientError::AmountExceedsMaximum));
        assert_eq!(err.to_string(), "Payment amount exceeds maximum allowed");
    }

    #[tokio::test]
    async fn empty_accepts_is_an_error() {
        let signer = Keypair::new();
        let pay_to = Keypair::new().pubkey();
        let rpc = BuilderRpc::with_mint_and_destination(pay_to, &pay_to);
        let x402 = X402Client::new(signer, rpc);
        let challenge = PaymentRequired::new("X-PAYMENT header is required", vec![]);
        let err = x402.make_payment_header(&challenge).await.unwrap_err();
        assert!(matches!(err, ClientError::NoMatchingRequirements));
    }
}
