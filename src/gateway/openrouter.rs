use super::credential::ApiKey;
use super::rate_limit::SlidingWindowLimiter;
use super::scrub::sanitize_error_body;
use super::types::{ChatPayload, ChatResponse};
use super::CompletionGateway;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

const EXTRA_HEADERS: [(&str, &str); 2] = [
    ("HTTP-Referer", "https://github.com/kusalatech/dhammashell"),
    ("X-Title", "DhammaShell"),
];

/// Chat-completions client for OpenRouter (or any compatible endpoint).
///
/// Throttled by a [`SlidingWindowLimiter`]; never retries on its own.
pub struct OpenRouterGateway {
    /// Pre-computed `"Bearer <key>"` header value.
    cached_auth_header: Zeroizing<String>,
    endpoint: String,
    client: Client,
    limiter: SlidingWindowLimiter,
    cancel: CancellationToken,
}

impl OpenRouterGateway {
    pub fn new(config: &GatewayConfig, api_key: &ApiKey) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            cached_auth_header: api_key.bearer_header(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            client,
            limiter: SlidingWindowLimiter::new(
                config.rate_limit_calls,
                Duration::from_secs(config.rate_limit_window_secs),
            ),
            cancel: CancellationToken::new(),
        })
    }

    /// Token that aborts a pending rate-limit wait.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    async fn send(&self, payload: &ChatPayload) -> Result<String, GatewayError> {
        if !self.limiter.acquire(&self.cancel).await {
            return Err(GatewayError::Cancelled);
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", self.cached_auth_header.as_str())
            .json(payload);
        for (name, value) in EXTRA_HEADERS {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: sanitize_error_body(&body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        parsed.first_content().ok_or(GatewayError::EmptyChoice)
    }
}

impl CompletionGateway for OpenRouterGateway {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn complete<'a>(
        &'a self,
        payload: &'a ChatPayload,
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + 'a>> {
        Box::pin(self.send(payload))
    }
}
