//! The payment gate tower layer.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::body::Body;
use http::{HeaderValue, Request, Response, StatusCode};
use tower::{Layer, Service};
use url::Url;

use sol402::facilitator::Facilitator;
use sol402::price::price_to_atomic;
use sol402::proto::{
    PaymentPayload, PaymentRequired, PaymentRequirements, SettleRequest, VerifyRequest,
};
use sol402::{ErrorReason, SCHEME_EXACT, X402_VERSION, encoding};

use crate::constants::{
    ACCESS_CONTROL_EXPOSE_HEADERS, PAYMENT_HEADER_REQUIRED, X_PAYMENT_HEADER,
    X_PAYMENT_RESPONSE_HEADER,
};

use super::paywall::{is_browser_request, render_paywall};
use super::routes::{CompiledRoutes, RouteConfig, RoutesConfig};

/// Tower [`Layer`] that enforces x402 payments on configured routes.
///
/// The gate calls the facilitator's `/supported` (cached by
/// [`crate::FacilitatorClient`]) to learn the fee payer, challenges
/// unpaid requests with 402, verifies payments before the handler runs,
/// and settles after the handler succeeded. The handler's response stays
/// buffered until settlement decides its fate, so the first write the
/// client sees is already final.
pub struct PaymentGateLayer<F> {
    facilitator: F,
    routes: CompiledRoutes,
    pay_to: String,
    base_url: Option<Url>,
}

impl<F: Clone> Clone for PaymentGateLayer<F> {
    fn clone(&self) -> Self {
        Self {
            facilitator: self.facilitator.clone(),
            routes: self.routes.clone(),
            pay_to: self.pay_to.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

struct GateShared<F> {
    facilitator: F,
    routes: CompiledRoutes,
    pay_to: String,
    base_url: Option<Url>,
}

impl<F> std::fmt::Debug for PaymentGateLayer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateLayer")
            .field("routes", &self.routes.len())
            .field("pay_to", &self.pay_to)
            .finish_non_exhaustive()
    }
}

impl<F> PaymentGateLayer<F> {
    /// Creates a gate for a recipient address and route map.
    #[must_use]
    pub fn new(facilitator: F, pay_to: impl Into<String>, routes: RoutesConfig) -> Self {
        Self {
            facilitator,
            routes: CompiledRoutes::compile(routes),
            pay_to: pay_to.into(),
            base_url: None,
        }
    }

    /// Sets the base URL used to build absolute resource URLs in
    /// challenges. Without it the request's `Host` header is used.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

impl<S, F: Clone> Layer<S> for PaymentGateLayer<F> {
    type Service = PaymentGateService<S, F>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            inner,
            shared: Arc::new(GateShared {
                facilitator: self.facilitator.clone(),
                routes: self.routes.clone(),
                pay_to: self.pay_to.clone(),
                base_url: self.base_url.clone(),
            }),
        }
    }
}

/// Tower [`Service`] produced by [`PaymentGateLayer`].
pub struct PaymentGateService<S, F> {
    inner: S,
    shared: Arc<GateShared<F>>,
}

impl<S: Clone, F> Clone for PaymentGateService<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, F> Service<Request<Body>> for PaymentGateService<S, F>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    F: Facilitator + 'static,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let shared = Arc::clone(&self.shared);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let method = req.method().as_str().to_owned();
            let path = req.uri().path().to_owned();

            let Some(config) = shared.routes.find(&method, &path) else {
                return inner.call(req).await;
            };
            let config = config.clone();

            let host_header = req
                .headers()
                .get(http::header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(ToOwned::to_owned);
            let requirements =
                match build_requirements(&shared, &config, host_header.as_deref(), &path).await {
                Ok(requirements) => requirements,
                Err(message) => {
                    tracing::error!(%path, error = %message, "failed to build payment requirements");
                    return Ok(error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to build payment requirements",
                    ));
                }
            };
            let accepts = vec![requirements.clone()];

            // No payment attached: challenge.
            let Some(header) = req.headers().get(X_PAYMENT_HEADER) else {
                let challenge = PaymentRequired::new(PAYMENT_HEADER_REQUIRED, accepts);
                if is_browser_request(req.headers()) {
                    let html = config
                        .custom_paywall_html
                        .clone()
                        .unwrap_or_else(|| render_paywall(&challenge));
                    return Ok(html_response(&html));
                }
                return Ok(challenge_response(&challenge));
            };

            let payload = match header
                .to_str()
                .map_err(|_| ErrorReason::InvalidPayload)
                .and_then(|value| {
                    encoding::decode_payment(value).map_err(|e| e.reason())
                }) {
                Ok(payload) => payload,
                Err(reason) => {
                    let challenge = PaymentRequired::new(reason.as_str(), accepts);
                    return Ok(challenge_response(&challenge));
                }
            };

            let Some(selected) = select_requirements(&accepts, &payload) else {
                let challenge = PaymentRequired::new(
                    "Unable to find matching payment requirements",
                    accepts,
                );
                return Ok(challenge_response(&challenge));
            };
            let selected = selected.clone();

            let verify_request = VerifyRequest {
                payment_payload: payload,
                payment_requirements: selected.clone(),
            };
            let verification = match shared.facilitator.verify(verify_request.clone()).await {
                Ok(verification) => verification,
                Err(err) => {
                    tracing::error!(error = %err, "payment verification transport failure");
                    let challenge = PaymentRequired::new(
                        ErrorReason::UnexpectedVerifyError.as_str(),
                        accepts,
                    );
                    return Ok(challenge_response(&challenge));
                }
            };
            if !verification.is_valid {
                let reason = verification
                    .invalid_reason
                    .unwrap_or(ErrorReason::InvalidPayment);
                tracing::info!(reason = %reason, payer = ?verification.payer, "payment rejected");
                let challenge = PaymentRequired::new(reason.as_str(), accepts)
                    .with_payer(verification.payer);
                return Ok(challenge_response(&challenge));
            }

            // Payment verified: run the protected handler with the
            // response buffered.
            let mut response = inner.call(req).await?;

            // A failed handler must not charge the ledger.
            if response.status().as_u16() >= 400 {
                return Ok(response);
            }

            let settle_request = SettleRequest::from(verify_request);
            let settlement = match shared.facilitator.settle(settle_request).await {
                Ok(settlement) => settlement,
                Err(err) => {
                    tracing::error!(error = %err, "payment settlement transport failure");
                    let challenge = PaymentRequired::new(
                        ErrorReason::UnexpectedSettleError.as_str(),
                        accepts,
                    );
                    return Ok(challenge_response(&challenge));
                }
            };
            if !settlement.success {
                let reason = settlement
                    .error_reason
                    .unwrap_or(ErrorReason::UnexpectedSettleError);
                tracing::warn!(reason = %reason, "settlement failed after successful handler");
                let challenge =
                    PaymentRequired::new(reason.as_str(), accepts).with_payer(settlement.payer);
                return Ok(challenge_response(&challenge));
            }

            let encoded = encoding::encode_settle_response(&settlement);
            if let Ok(value) = HeaderValue::from_str(&encoded) {
                response
                    .headers_mut()
                    .insert(X_PAYMENT_RESPONSE_HEADER, value);
                response.headers_mut().insert(
                    ACCESS_CONTROL_EXPOSE_HEADERS,
                    HeaderValue::from_static("X-PAYMENT-RESPONSE"),
                );
            }
            Ok(response)
        })
    }
}

/// Builds the requirements advertised for a route.
async fn build_requirements<F: Facilitator>(
    shared: &GateShared<F>,
    config: &RouteConfig,
    host_header: Option<&str>,
    path: &str,
) -> Result<PaymentRequirements, String> {
    if !encoding::is_solana_address(&shared.pay_to) {
        return Err(format!("payTo is not a Solana address: {}", shared.pay_to));
    }

    let (atomic, asset) = price_to_atomic(
        &config.price,
        config.network,
        config.default_token.as_ref(),
    )
    .map_err(|e| e.to_string())?;

    let supported = shared
        .facilitator
        .supported()
        .await
        .map_err(|e| e.to_string())?;
    let fee_payer = supported
        .find_kind(SCHEME_EXACT, config.network)
        .and_then(|kind| kind.fee_payer().map(ToOwned::to_owned))
        .ok_or_else(|| {
            format!(
                "facilitator reports no exact-scheme fee payer for {}",
                config.network
            )
        })?;

    let resource = config.resource.clone().unwrap_or_else(|| {
        let origin = shared.base_url.as_ref().map_or_else(
            || {
                let host = host_header.unwrap_or("localhost");
                format!("http://{host}")
            },
            |url| url.to_string().trim_end_matches('/').to_owned(),
        );
        format!("{origin}{path}")
    });

    Ok(PaymentRequirements {
        scheme: SCHEME_EXACT.to_owned(),
        network: config.network,
        max_amount_required: atomic.to_string(),
        resource,
        description: config.description.clone(),
        mime_type: config.mime_type.clone(),
        output_schema: config.output_schema.clone(),
        pay_to: shared.pay_to.clone(),
        max_timeout_seconds: config.max_timeout_seconds,
        asset: asset.address,
        extra: Some(serde_json::json!({ "feePayer": fee_payer })),
    })
}

/// Picks the requirement matching the payload's scheme and network.
fn select_requirements<'a>(
    accepts: &'a [PaymentRequirements],
    payload: &PaymentPayload,
) -> Option<&'a PaymentRequirements> {
    accepts
        .iter()
        .find(|r| r.scheme == payload.scheme && r.network == payload.network)
}

/// A 402 response with the JSON challenge body.
fn challenge_response(challenge: &PaymentRequired) -> Response<Body> {
    let body = serde_json::to_string(challenge).unwrap_or_else(|_| {
        format!("{{\"x402Version\":{X402_VERSION},\"error\":\"internal\",\"accepts\":[]}}")
    });
    Response::builder()
        .status(StatusCode::PAYMENT_REQUIRED)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("valid 402 response")
}

/// A 402 response with an HTML paywall body.
fn html_response(html: &str) -> Response<Body> {
    Response::builder()
        .status(StatusCode::PAYMENT_REQUIRED)
        .header(http::header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(html.to_owned()))
        .expect("valid paywall response")
}

/// A plain JSON error response.
fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": message });
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid error response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::routes::RouteConfig;
    use axum::Router;
    use axum::routing::get;
    use http_body_util::BodyExt;
    use sol402::Network;
    use sol402::facilitator::{BoxFuture, FacilitatorError};
    use sol402::proto::{
        ExactSolanaPayload, SettleResponse, SupportedKind, SupportedResponse, VerifyResponse,
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    const FEE_PAYER: &str = "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS";
    const PAY_TO: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    #[derive(Clone)]
    struct MockFacilitator {
        verify_result: VerifyResponse,
        settle_result: SettleResponse,
        settle_called: Arc<AtomicBool>,
    }

    impl MockFacilitator {
        fn accepting() -> Self {
            Self {
                verify_result: VerifyResponse::valid("payer111"),
                settle_result: SettleResponse::success(
                    "5GoodSignature",
                    Network::SolanaDevnet,
                    "payer111",
                ),
                settle_called: Arc::new(AtomicBool::new(false)),
            }
        }

        fn rejecting(reason: ErrorReason) -> Self {
            Self {
                verify_result: VerifyResponse::invalid(reason, Some("payer111".to_owned())),
                ..Self::accepting()
            }
        }

        fn failing_settle(reason: ErrorReason) -> Self {
            Self {
                settle_result: SettleResponse::failure(
                    reason,
                    Network::SolanaDevnet,
                    Some("payer111".to_owned()),
                    "",
                ),
                ..Self::accepting()
            }
        }
    }

    impl Facilitator for MockFacilitator {
        fn verify(
            &self,
            _: VerifyRequest,
        ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
            let result = self.verify_result.clone();
            Box::pin(async move { Ok(result) })
        }

        fn settle(
            &self,
            _: SettleRequest,
        ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
            self.settle_called.store(true, Ordering::SeqCst);
            let result = self.settle_result.clone();
            Box::pin(async move { Ok(result) })
        }

        fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
            Box::pin(async move {
                Ok(SupportedResponse {
                    kinds: vec![SupportedKind {
                        x402_version: 1,
                        scheme: SCHEME_EXACT.to_owned(),
                        network: Network::SolanaDevnet,
                        extra: Some(serde_json::json!({ "feePayer": FEE_PAYER })),
                    }],
                })
            })
        }
    }

    fn weather_routes() -> RoutesConfig {
        let mut routes = RoutesConfig::new();
        routes.insert(
            "GET /weather".to_owned(),
            RouteConfig::new("$0.0018", Network::SolanaDevnet),
        );
        routes
    }

    fn app(facilitator: MockFacilitator) -> Router {
        let layer = PaymentGateLayer::new(facilitator, PAY_TO, weather_routes());
        Router::new()
            .route("/weather", get(|| async { "sunny" }))
            .route(
                "/flaky",
                get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
            )
            .route(
                "/free",
                get(|| async { "gratis" }),
            )
            .layer(layer)
    }

    fn flaky_routes_app(facilitator: MockFacilitator) -> Router {
        let mut routes = weather_routes();
        routes.insert(
            "GET /flaky".to_owned(),
            RouteConfig::new("$0.0018", Network::SolanaDevnet),
        );
        let layer = PaymentGateLayer::new(facilitator, PAY_TO, routes);
        Router::new()
            .route(
                "/flaky",
                get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
            )
            .layer(layer)
    }

    fn payment_header() -> String {
        let payload = PaymentPayload::exact(
            Network::SolanaDevnet,
            &ExactSolanaPayload {
                transaction: "AQIDBA==".to_owned(),
            },
        );
        encoding::encode_payment(&payload)
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unpaid_request_gets_a_402_challenge() {
        let app = app(MockFacilitator::accepting());
        let response = app
            .oneshot(Request::get("/weather").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let json = body_json(response).await;
        assert_eq!(json["x402Version"], 1);
        assert_eq!(json["error"], PAYMENT_HEADER_REQUIRED);
        let accepts = json["accepts"].as_array().unwrap();
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts[0]["maxAmountRequired"], "1800");
        assert_eq!(
            accepts[0]["asset"],
            "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"
        );
        assert_eq!(accepts[0]["extra"]["feePayer"], FEE_PAYER);
        assert_eq!(accepts[0]["payTo"], PAY_TO);
    }

    #[tokio::test]
    async fn valid_payment_reaches_the_handler_and_settles() {
        let facilitator = MockFacilitator::accepting();
        let settle_called = Arc::clone(&facilitator.settle_called);
        let app = app(facilitator);

        let response = app
            .oneshot(
                Request::get("/weather")
                    .header(X_PAYMENT_HEADER, payment_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(settle_called.load(Ordering::SeqCst));

        let header = response
            .headers()
            .get(X_PAYMENT_RESPONSE_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        let settlement = encoding::decode_settle_response(&header).unwrap();
        assert!(settlement.success);
        assert_eq!(settlement.transaction, "5GoodSignature");
        assert_eq!(settlement.network, Network::SolanaDevnet);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"sunny");
    }

    #[tokio::test]
    async fn failed_handler_skips_settlement() {
        let facilitator = MockFacilitator::accepting();
        let settle_called = Arc::clone(&facilitator.settle_called);
        let app = flaky_routes_app(facilitator);

        let response = app
            .oneshot(
                Request::get("/flaky")
                    .header(X_PAYMENT_HEADER, payment_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(X_PAYMENT_RESPONSE_HEADER).is_none());
        assert!(!settle_called.load(Ordering::SeqCst));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"down");
    }

    #[tokio::test]
    async fn invalid_payment_is_rejected_with_its_reason() {
        let facilitator = MockFacilitator::rejecting(ErrorReason::AmountMismatch);
        let settle_called = Arc::clone(&facilitator.settle_called);
        let app = app(facilitator);

        let response = app
            .oneshot(
                Request::get("/weather")
                    .header(X_PAYMENT_HEADER, payment_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(!settle_called.load(Ordering::SeqCst));

        let json = body_json(response).await;
        assert_eq!(
            json["error"],
            "invalid_exact_svm_payload_transaction_amount_mismatch"
        );
        assert_eq!(json["payer"], "payer111");
    }

    #[tokio::test]
    async fn settle_failure_replaces_the_buffered_response() {
        let facilitator = MockFacilitator::failing_settle(ErrorReason::BlockHeightExceeded);
        let app = app(facilitator);

        let response = app
            .oneshot(
                Request::get("/weather")
                    .header(X_PAYMENT_HEADER, payment_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "settle_exact_svm_block_height_exceeded");
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        let app = app(MockFacilitator::accepting());
        let response = app
            .oneshot(
                Request::get("/weather")
                    .header(X_PAYMENT_HEADER, "!!not-base64!!")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid_payload");
    }

    #[tokio::test]
    async fn mismatched_network_fails_selection() {
        let app = app(MockFacilitator::accepting());
        let payload = PaymentPayload::exact(
            Network::Solana,
            &ExactSolanaPayload {
                transaction: "AQIDBA==".to_owned(),
            },
        );
        let response = app
            .oneshot(
                Request::get("/weather")
                    .header(X_PAYMENT_HEADER, encoding::encode_payment(&payload))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Unable to find matching payment requirements");
    }

    #[tokio::test]
    async fn browsers_get_the_html_paywall() {
        let app = app(MockFacilitator::accepting());
        let response = app
            .oneshot(
                Request::get("/weather")
                    .header(http::header::ACCEPT, "text/html")
                    .header(http::header::USER_AGENT, "Mozilla/5.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(
            response.headers()[http::header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
    }

    #[tokio::test]
    async fn unconfigured_routes_pass_through() {
        let app = app(MockFacilitator::accepting());
        let response = app
            .oneshot(Request::get("/free").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
