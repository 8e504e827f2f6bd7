//! Gate and retry decisions around the completion gateway.
//!
//! The decision functions are pure so they can be tested without network
//! I/O; [`ResilientGateway`] applies them around any [`CompletionGateway`].

use super::monitor::{HealthMonitor, HealthStatus, UnhealthyReason};
use crate::config::ReliabilityConfig;
use crate::error::GatewayError;
use crate::gateway::{ChatPayload, CompletionGateway};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// What the gate says to do with a call, given the current health.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Proceed,
    HealFirst(UnhealthyReason),
    Refuse,
}

pub fn gate(status: &HealthStatus) -> GateDecision {
    match status {
        HealthStatus::Healthy => GateDecision::Proceed,
        HealthStatus::Unhealthy(reason) => GateDecision::HealFirst(reason.clone()),
        HealthStatus::Exhausted => GateDecision::Refuse,
    }
}

/// Outcome of admitting one call through the monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted,
    AdmittedAfterHealing(UnhealthyReason),
    Refused { attempts: u32 },
}

/// Check health, heal once if needed, and decide whether the call may go out.
pub fn admit(monitor: &mut HealthMonitor) -> Admission {
    match gate(&monitor.check_health()) {
        GateDecision::Proceed => Admission::Admitted,
        GateDecision::HealFirst(reason) => {
            if monitor.attempt_healing() {
                Admission::AdmittedAfterHealing(reason)
            } else {
                Admission::Refused {
                    attempts: monitor.snapshot().healing_attempts,
                }
            }
        }
        GateDecision::Refuse => Admission::Refused {
            attempts: monitor.snapshot().healing_attempts,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ReliabilityConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.base_backoff_ms.max(50)),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(config.base_backoff_ms)),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ReliabilityConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Decide what to do after `attempt` (zero-based) failed with `error`.
///
/// Back-off doubles per attempt and is capped at `max_backoff`.
pub fn retry_decision(policy: &RetryPolicy, attempt: u32, error: &GatewayError) -> RetryDecision {
    if !error.is_retryable() || attempt >= policy.max_retries {
        return RetryDecision::GiveUp;
    }
    let factor = 2_u32.saturating_pow(attempt);
    let backoff = policy
        .base_backoff
        .saturating_mul(factor)
        .min(policy.max_backoff);
    RetryDecision::RetryAfter(backoff)
}

/// Retrying decorator around a [`CompletionGateway`].
pub struct ResilientGateway<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: CompletionGateway> ResilientGateway<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn complete_with_retries(&self, payload: &ChatPayload) -> Result<String, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(payload).await {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::info!(
                            gateway = self.inner.name(),
                            attempt,
                            "Gateway recovered after retries"
                        );
                    }
                    return Ok(text);
                }
                Err(error) => match retry_decision(&self.policy, attempt, &error) {
                    RetryDecision::RetryAfter(backoff) => {
                        tracing::warn!(
                            gateway = self.inner.name(),
                            attempt = attempt + 1,
                            max_retries = self.policy.max_retries,
                            backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                            "Gateway call failed, retrying: {error}"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => return Err(error),
                },
            }
        }
    }
}

impl<G: CompletionGateway> CompletionGateway for ResilientGateway<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn complete<'a>(
        &'a self,
        payload: &'a ChatPayload,
    ) -> Pin<Box<dyn Future<Output = Result<String, GatewayError>> + Send + 'a>> {
        Box::pin(self.complete_with_retries(payload))
    }
}
