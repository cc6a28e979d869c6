//! Remote references over HTTP(S).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::{decode_content, ContentKind};
use crate::config::{CompilerConfig, MAX_HTTP_RETRIES, RETRY_BASE_DELAY_MS, USER_AGENT};
use crate::context::ProcessingContext;
use crate::error::ReferenceError;
use crate::node::Resolved;
use crate::protocol::ProtocolHandler;
use crate::uri::ReferenceUri;

/// Resolves `http:` and `https:` references.
///
/// The response is negotiated by its content type: JSON and YAML become
/// structured data, XML becomes a parsed document and anything else is
/// kept as text. Server errors (5xx) and connection failures are retried
/// with exponential backoff; client errors are not.
#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: Client,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
    max_response_size: u64,
}

/// Delay before retry `attempt` (1-based): base, 2x base, 4x base, ...
/// Saturates instead of overflowing for large attempt counts.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

impl HttpHandler {
    /// Create a handler with a configured HTTP client.
    ///
    /// # Errors
    /// Fails if the client cannot be built (e.g. TLS backend unavailable).
    pub fn new(config: &CompilerConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()?;
        Ok(Self {
            client,
            timeout: config.http_timeout,
            max_retries: MAX_HTTP_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_response_size: config.max_response_size,
        })
    }

    /// Maximum number of attempts (at least one).
    pub fn with_max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Download `url`, returning the content type and body text.
    /// Errors are tagged with the reference key.
    async fn fetch(
        &self,
        url: &str,
        key: &str,
    ) -> Result<(Option<String>, String), ReferenceError> {
        let mut last_error = ReferenceError::Transport {
            uri: key.to_string(),
            message: "no attempt made".to_string(),
        };

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.retry_base_delay, attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after delay"
                );
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    // Retry on server errors (5xx)
                    if status.is_server_error() {
                        tracing::warn!(
                            uri = %key,
                            status = %status,
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "Server error, will retry"
                        );
                        last_error = ReferenceError::Http {
                            uri: key.to_string(),
                            status: status.as_u16(),
                        };
                        continue;
                    }

                    // Client errors (4xx) won't succeed on retry
                    if !status.is_success() {
                        return Err(ReferenceError::Http {
                            uri: key.to_string(),
                            status: status.as_u16(),
                        });
                    }

                    if let Some(length) = response.content_length() {
                        self.check_size(key, length)?;
                    }
                    let content_type = response
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| self.transport(key, &e))?;
                    self.check_size(key, bytes.len() as u64)?;

                    let text = String::from_utf8(bytes.to_vec()).map_err(|e| {
                        ReferenceError::Decode {
                            uri: key.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    return Ok((content_type, text));
                }
                Err(e) => {
                    // Retry on connection/timeout errors
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!(
                            uri = %key,
                            error = %e,
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "Connection error, will retry"
                        );
                        last_error = self.transport(key, &e);
                        continue;
                    }
                    // Other errors (like an invalid URL) - don't retry
                    return Err(self.transport(key, &e));
                }
            }
        }

        Err(last_error)
    }

    fn transport(&self, key: &str, error: &reqwest::Error) -> ReferenceError {
        if error.is_timeout() {
            ReferenceError::Timeout {
                uri: key.to_string(),
                timeout: self.timeout,
            }
        } else {
            ReferenceError::Transport {
                uri: key.to_string(),
                message: error.to_string(),
            }
        }
    }

    fn check_size(&self, key: &str, length: u64) -> Result<(), ReferenceError> {
        if length > self.max_response_size {
            return Err(ReferenceError::Transport {
                uri: key.to_string(),
                message: format!(
                    "response is {length} bytes, limit is {} bytes",
                    self.max_response_size
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolHandler for HttpHandler {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, protocol: &str) -> bool {
        matches!(protocol, "http" | "https")
    }

    async fn handle(
        &self,
        uri: &ReferenceUri,
        _ctx: &ProcessingContext,
    ) -> Result<Resolved, ReferenceError> {
        let key = uri.key();
        let url = url::Url::parse(&key)
            .map_err(|e| ReferenceError::InvalidUri(format!("{key}: {e}")))?;

        tracing::debug!(uri = %key, "Fetching remote reference");
        let (content_type, body) = self.fetch(url.as_str(), &key).await?;

        let kind = content_type
            .as_deref()
            .and_then(ContentKind::from_mime)
            .unwrap_or_else(|| ContentKind::from_extension(url.path()));
        decode_content(&key, &body, kind)
    }
}
