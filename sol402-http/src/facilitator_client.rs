//! HTTP client for a remote x402 facilitator.
//!
//! Implements [`Facilitator`] against the facilitator's `/verify`,
//! `/settle`, and `/supported` endpoints. The `/supported` response is
//! cached with a configurable TTL: the fee payer it carries is baked into
//! every 402 challenge, so a deployment that rotates its fee-payer key
//! should keep the TTL below the rotation interval.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::sync::RwLock;
use url::Url;

use sol402::facilitator::{BoxFuture, Facilitator, FacilitatorError};
use sol402::proto::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};

/// TTL cache entry for [`SupportedResponse`].
#[derive(Clone, Debug)]
struct SupportedCacheState {
    response: SupportedResponse,
    expires_at: std::time::Instant,
}

/// An encapsulated TTL cache for the `/supported` endpoint response.
#[derive(Debug)]
pub struct SupportedCache {
    ttl: Duration,
    state: RwLock<Option<SupportedCacheState>>,
}

impl SupportedCache {
    /// Creates a new cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Returns the cached response if still valid.
    pub async fn get(&self) -> Option<SupportedResponse> {
        let guard = self.state.read().await;
        let cache = guard.as_ref()?;
        if std::time::Instant::now() < cache.expires_at {
            Some(cache.response.clone())
        } else {
            None
        }
    }

    /// Stores a response with the configured TTL.
    pub async fn set(&self, response: SupportedResponse) {
        let mut guard = self.state.write().await;
        *guard = Some(SupportedCacheState {
            response,
            expires_at: std::time::Instant::now() + self.ttl,
        });
    }
}

impl Clone for SupportedCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// A client for a remote x402 facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    client: Client,
    timeout: Option<Duration>,
    supported_cache: SupportedCache,
}

impl FacilitatorClient {
    /// Default TTL for caching the `/supported` response (10 minutes).
    pub const DEFAULT_SUPPORTED_CACHE_TTL: Duration = Duration::from_secs(600);

    /// Constructs a client from a base URL.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError`] if endpoint URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorError> {
        let join = |segment: &str| {
            base_url
                .join(segment)
                .map_err(|e| FacilitatorError::Transport(format!("invalid facilitator URL: {e}")))
        };
        Ok(Self {
            verify_url: join("./verify")?,
            settle_url: join("./settle")?,
            supported_url: join("./supported")?,
            client: Client::new(),
            base_url,
            timeout: None,
            supported_cache: SupportedCache::new(Self::DEFAULT_SUPPORTED_CACHE_TTL),
        })
    }

    /// The configured base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the TTL for caching the `/supported` response.
    #[must_use]
    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_cache = SupportedCache::new(ttl);
        self
    }

    /// Disables `/supported` caching.
    #[must_use]
    pub fn without_supported_cache(self) -> Self {
        self.with_supported_cache_ttl(Duration::ZERO)
    }

    /// Sends `POST /verify`.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError`] on transport failure or non-200 status.
    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError> {
        self.post_json(&self.verify_url, "verify", request).await
    }

    /// Sends `POST /settle`.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError`] on transport failure or non-200 status.
    pub async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorError> {
        self.post_json(&self.settle_url, "settle", request).await
    }

    /// Sends `GET /supported`, bypassing the cache.
    async fn supported_inner(&self) -> Result<SupportedResponse, FacilitatorError> {
        let mut req = self.client.get(self.supported_url.clone());
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| FacilitatorError::Transport(e.to_string()))?;
        Self::read_json(response, "supported").await
    }

    /// Sends `GET /supported` through the TTL cache.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError`] on transport failure or non-200 status.
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorError> {
        if let Some(response) = self.supported_cache.get().await {
            return Ok(response);
        }
        let response = self.supported_inner().await?;
        self.supported_cache.set(response.clone()).await;
        Ok(response)
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        verb: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorError>
    where
        T: serde::Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| FacilitatorError::Transport(e.to_string()))?;
        Self::read_json(response, verb).await
    }

    async fn read_json<R: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        verb: &'static str,
    ) -> Result<R, FacilitatorError> {
        if response.status() == StatusCode::OK {
            response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorError::Decode(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(FacilitatorError::UnexpectedStatus { verb, status, body })
        }
    }
}

impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize to a single trailing slash so relative joins work.
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized)
            .map_err(|e| FacilitatorError::Transport(format!("invalid facilitator URL: {e}")))?;
        Self::try_new(url)
    }
}

impl Facilitator for FacilitatorClient {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        Box::pin(async move { FacilitatorClient::verify(self, &request).await })
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        Box::pin(async move { FacilitatorClient::settle(self, &request).await })
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        Box::pin(async move { FacilitatorClient::supported(self).await })
    }
}
