//! Outbound completion calls.
//!
//! [`CompletionGateway`] is the seam the protocol talks to. The production
//! implementation is [`OpenRouterGateway`]; retry and back-off live one
//! layer up in [`crate::health::breaker::ResilientGateway`].

pub mod credential;
pub mod openrouter;
pub mod rate_limit;
pub mod scrub;
pub mod types;

pub use credential::ApiKey;
pub use openrouter::OpenRouterGateway;
pub use rate_limit::SlidingWindowLimiter;
pub use types::{ChatPayload, ChatTurn, GenerationParams};

use crate::error::GatewayError;
use std::future::Future;
use std::pin::Pin;

pub trait CompletionGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Send one prepared request and return the assistant text.
    fn complete<'a>(
        &'a self,
        payload: &'a ChatPayload,
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + 'a>>;
}

impl<G: CompletionGateway + ?Sized> CompletionGateway for Box<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete<'a>(
        &'a self,
        payload: &'a ChatPayload,
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + 'a>> {
        (**self).complete(payload)
    }
}
