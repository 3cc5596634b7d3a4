use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::auth::{AuthManager, CredentialStore, Token, TokenEndpoint};
use crate::classifier::{extract_error_message, Classification, ErrorClassifier};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result, TransportError};
use crate::models::{ApiRequest, ApiResponse};
use crate::transport::{ReqwestTransport, Transport};

/// Backoff settings for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Base delay for exponential backoff
    pub base_delay: Duration,

    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff: base_delay * 2^attempt, capped, plus up to 10% jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(31));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter = delay.mul_f64(0.1 * rand::random::<f64>());
        delay + jitter
    }

    /// Delay before retry `attempt`, honoring a server-provided Retry-After
    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.backoff_delay(attempt);
        match retry_after {
            Some(hint) if hint > delay => hint.min(self.max_delay),
            _ => delay,
        }
    }
}

/// Credentialed HTTP client with token refresh and retry
///
/// Cheap to clone; clones share the token and connection pool.
pub struct ApiClient<T: Transport = ReqwestTransport> {
    inner: Arc<ClientInner<T>>,
}

struct ClientInner<T: Transport> {
    config: ClientConfig,
    transport: Arc<T>,
    auth: AuthManager<T>,
    classifier: ErrorClassifier,
    retry: RetryPolicy,
}

impl<T: Transport> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ApiClient<ReqwestTransport> {
    /// Create a client using the pooled reqwest transport
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(
            config.max_connections,
            config.connect_timeout,
            config.request_timeout,
        )?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> ApiClient<T> {
    /// Create a client over any transport
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        config.validate()?;

        let transport = Arc::new(transport);
        let endpoint = TokenEndpoint {
            url: config.token_url.clone(),
            scope: config.scope.clone(),
            resource: config.resource.clone(),
            expiry_skew: config.token_expiry_skew,
            timeout: config.request_timeout,
        };
        let auth = AuthManager::new(
            CredentialStore::new(config.credentials.clone()),
            endpoint,
            Arc::clone(&transport),
        );
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            base_delay: config.backoff_base,
            max_delay: config.backoff_max,
        };

        tracing::debug!(
            base_url = %config.base_url,
            token_url = %config.token_url,
            max_retries = config.max_retries,
            "API client initialized"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                classifier: ErrorClassifier::new(config.refresh_on_forbidden),
                config,
                transport,
                auth,
                retry,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Transport shared by the pipeline and the token manager
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Token lifecycle manager backing this client
    pub fn auth(&self) -> &AuthManager<T> {
        &self.inner.auth
    }

    /// The active token, if one has been acquired
    pub async fn current_token(&self) -> Option<Arc<Token>> {
        self.inner.auth.current().await
    }

    /// Build a request for a path relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest> {
        let url = self
            .inner
            .config
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Config(format!("Invalid request path '{}': {}", path, e)))?;
        Ok(ApiRequest::new(method, url))
    }

    pub fn get(&self, path: &str) -> Result<ApiRequest> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> Result<ApiRequest> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> Result<ApiRequest> {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> Result<ApiRequest> {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> Result<ApiRequest> {
        self.request(Method::DELETE, path)
    }

    /// GET `path` and decode the JSON body
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let response = self.send(self.get(path)?).await?;
        response.json()
    }

    /// Execute a request with token handling and retry logic
    /// Automatically handles:
    /// - 401 (and 403 when configured): refreshes token once and retries
    /// - 408, 429, 5xx, network errors, deadline expiry: exponential backoff
    /// - other errors: surfaced as `RequestFailed`
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.send_internal(request, self.inner.retry.max_retries)
            .await
    }

    /// Execute a request without transient retries (fails fast)
    /// The one-time auth refresh still applies
    pub async fn send_once(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.send_internal(request, 0).await
    }

    async fn send_internal(&self, request: ApiRequest, max_retries: u32) -> Result<ApiResponse> {
        let span = tracing::debug_span!(
            "api_request",
            request_id = %request.short_id(),
            method = %request.method(),
            url = %request.url(),
        );
        self.run_pipeline(request, max_retries).instrument(span).await
    }

    async fn run_pipeline(&self, request: ApiRequest, max_retries: u32) -> Result<ApiResponse> {
        let inner = &self.inner;
        let mut retries: u32 = 0;
        let mut refreshed = false;

        tracing::debug!("Sending HTTP request");

        let mut token = if request.requires_auth() {
            Some(inner.auth.token().await?)
        } else {
            None
        };

        loop {
            let attempt = retries + 1;

            // Backoff sleeps can outlive the token
            if let Some(held) = token.as_ref().filter(|t| t.is_expired()) {
                tracing::debug!(
                    token = %held.redacted(),
                    attempt,
                    "Token expired before attempt, renewing"
                );
                token = Some(inner.auth.token().await?);
            }

            let deadline = request
                .timeout_override()
                .unwrap_or(inner.config.request_timeout);

            let mut req = request.clone();
            if let Some(ref t) = token {
                let value = HeaderValue::from_str(&t.bearer()).map_err(|e| {
                    ClientError::AuthenticationFailed(format!(
                        "Access token is not a valid header value: {}",
                        e
                    ))
                })?;
                req.headers_mut().insert(AUTHORIZATION, value);
            }

            tracing::debug!(attempt, max_retries, "Executing request attempt");

            let result = match tokio::time::timeout(deadline, inner.transport.send(req)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::timeout(format!(
                    "Request deadline of {:?} elapsed",
                    deadline
                ))),
            };

            match result {
                Ok(response) => {
                    let status = response.status();
                    tracing::debug!(status = %status, "Received HTTP response");

                    match inner.classifier.classify(&response) {
                        Classification::Ok => return Ok(response),

                        Classification::AuthFailure => {
                            let Some(rejected) = token.take() else {
                                let body = response.text();
                                tracing::error!(
                                    status = status.as_u16(),
                                    "Unauthenticated request was rejected"
                                );
                                return Err(ClientError::RequestFailed {
                                    status: status.as_u16(),
                                    message: extract_error_message(&body),
                                    body,
                                });
                            };

                            if refreshed {
                                let body = response.text();
                                tracing::error!(
                                    status = status.as_u16(),
                                    token = %rejected.redacted(),
                                    "Refreshed token was rejected"
                                );
                                return Err(ClientError::AuthenticationFailed(format!(
                                    "Token rejected after refresh: {} - {}",
                                    status.as_u16(),
                                    extract_error_message(&body)
                                )));
                            }

                            tracing::warn!(
                                status = status.as_u16(),
                                token = %rejected.redacted(),
                                "Received {}, refreshing token and retrying...",
                                status
                            );
                            refreshed = true;
                            token = Some(inner.auth.refresh(&rejected).await?);
                            continue;
                        }

                        Classification::Transient => {
                            if retries < max_retries {
                                let delay =
                                    inner.retry.delay_for(retries, response.retry_after());
                                tracing::warn!(
                                    "Received {}, retrying after {}ms (attempt {}/{})",
                                    status,
                                    delay.as_millis(),
                                    attempt,
                                    max_retries
                                );
                                tokio::time::sleep(delay).await;
                                retries += 1;
                                continue;
                            }

                            let body = response.text();
                            tracing::error!(
                                status = status.as_u16(),
                                response_body = %body,
                                total_attempts = attempt,
                                "HTTP request failed after all retries"
                            );
                            return Err(ClientError::TransportFailed {
                                attempts: attempt,
                                status: Some(status.as_u16()),
                                message: format!(
                                    "{} - {}",
                                    status.as_u16(),
                                    extract_error_message(&body)
                                ),
                            });
                        }

                        Classification::Fatal => {
                            let body = response.text();
                            let message = if status.is_success() {
                                "Malformed JSON response body".to_string()
                            } else {
                                extract_error_message(&body)
                            };
                            tracing::error!(
                                status = status.as_u16(),
                                response_body = %body,
                                attempt,
                                "HTTP request failed with error response"
                            );
                            return Err(ClientError::RequestFailed {
                                status: status.as_u16(),
                                message,
                                body,
                            });
                        }
                    }
                }

                Err(e) => {
                    tracing::warn!(
                        error_kind = e.kind.as_str(),
                        error = %e,
                        attempt,
                        "HTTP request error"
                    );

                    if inner.classifier.classify_error(&e) == Classification::Transient
                        && retries < max_retries
                    {
                        let delay = inner.retry.delay_for(retries, None);
                        tracing::warn!(
                            "Request failed: {}, retrying after {}ms (attempt {}/{})",
                            e,
                            delay.as_millis(),
                            attempt,
                            max_retries
                        );
                        tokio::time::sleep(delay).await;
                        retries += 1;
                        continue;
                    }

                    tracing::error!(
                        error_kind = e.kind.as_str(),
                        error = %e,
                        total_attempts = attempt,
                        "HTTP request failed"
                    );
                    return Err(ClientError::TransportFailed {
                        attempts: attempt,
                        status: None,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
