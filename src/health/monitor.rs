use crate::config::HealthConfig;
use crate::scoring::QualityScore;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

const HEALING_TARGET: &str = "dhammashell::healing";

/// Limits the monitor judges the rolling metrics against.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    pub max_errors_per_window: u32,
    pub error_window: Duration,
    pub max_consecutive_errors: u32,
    pub min_quality_average: f64,
    pub max_response_time: Duration,
    pub response_time_window: usize,
    pub metric_cap: usize,
    pub max_healing_attempts: u32,
    pub min_check_interval: Duration,
}

impl HealthThresholds {
    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            max_errors_per_window: config.max_errors_per_window,
            error_window: Duration::from_secs(config.error_window_secs),
            max_consecutive_errors: config.max_consecutive_errors,
            min_quality_average: config.min_quality_average,
            max_response_time: Duration::try_from_secs_f64(config.max_response_time_secs)
                .unwrap_or(Duration::MAX),
            response_time_window: config.response_time_window,
            metric_cap: config.metric_cap,
            max_healing_attempts: config.max_healing_attempts,
            min_check_interval: Duration::from_secs(config.min_check_interval_secs),
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_errors_per_window: 10,
            error_window: Duration::from_secs(60),
            max_consecutive_errors: 5,
            min_quality_average: 2.5,
            max_response_time: Duration::from_secs(30),
            response_time_window: 10,
            metric_cap: 100,
            max_healing_attempts: 3,
            min_check_interval: Duration::from_secs(60),
        }
    }
}

/// Rolling, process-wide health state. Lists never grow past `metric_cap`.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub api_calls: u64,
    pub errors: u32,
    pub consecutive_errors: u32,
    pub healing_attempts: u32,
    pub total_healing_events: u64,
    pub quality_scores: VecDeque<u8>,
    pub response_times: VecDeque<Duration>,
    pub last_audit: Option<Instant>,
    error_window_started: Instant,
}

impl HealthSnapshot {
    fn new() -> Self {
        Self {
            api_calls: 0,
            errors: 0,
            consecutive_errors: 0,
            healing_attempts: 0,
            total_healing_events: 0,
            quality_scores: VecDeque::new(),
            response_times: VecDeque::new(),
            last_audit: None,
            error_window_started: Instant::now(),
        }
    }

    pub fn average_quality(&self) -> Option<f64> {
        if self.quality_scores.is_empty() {
            return None;
        }
        let sum: f64 = self.quality_scores.iter().map(|s| f64::from(*s)).sum();
        Some(sum / self.quality_scores.len() as f64)
    }

    /// Mean of the newest `window` response times.
    pub fn average_response_time(&self, window: usize) -> Option<Duration> {
        let window = window.max(1);
        let recent: Vec<Duration> = self.response_times.iter().rev().take(window).copied().collect();
        if recent.is_empty() {
            return None;
        }
        let total: Duration = recent.iter().sum();
        Some(total / u32::try_from(recent.len()).unwrap_or(u32::MAX))
    }
}

/// Why the monitor judged the system unhealthy.
#[derive(Debug, Clone, PartialEq)]
pub enum UnhealthyReason {
    ErrorRate { errors: u32, threshold: u32 },
    ConsecutiveErrors { streak: u32, threshold: u32 },
    LowQuality { average: f64, minimum: f64 },
    SlowResponses { average: Duration, maximum: Duration },
}

impl UnhealthyReason {
    /// Stable short code, used as the healing reason in chat history.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ErrorRate { .. } => "error_rate",
            Self::ConsecutiveErrors { .. } => "consecutive_errors",
            Self::LowQuality { .. } => "low_quality",
            Self::SlowResponses { .. } => "slow_responses",
        }
    }
}

impl fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ErrorRate { errors, threshold } => {
                write!(f, "Error rate {errors} exceeds threshold {threshold}")
            }
            Self::ConsecutiveErrors { streak, threshold } => {
                write!(f, "Consecutive errors {streak} exceed threshold {threshold}")
            }
            Self::LowQuality { average, minimum } => {
                write!(f, "Average quality score {average:.2} below threshold {minimum}")
            }
            Self::SlowResponses { average, maximum } => write!(
                f,
                "Average response time {:.2}s exceeds threshold {:.2}s",
                average.as_secs_f64(),
                maximum.as_secs_f64()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(UnhealthyReason),
    /// Healing attempts are used up; only [`HealthMonitor::reset`] leaves this state.
    Exhausted,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Serializable view for status output.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: String,
    pub api_calls: u64,
    pub errors: u32,
    pub consecutive_errors: u32,
    pub healing_attempts: u32,
    pub max_healing_attempts: u32,
    pub total_healing_events: u64,
    pub average_quality: Option<f64>,
    pub average_response_secs: Option<f64>,
}

/// Owns the single [`HealthSnapshot`] and decides when the system is healthy.
///
/// Not internally synchronized: every mutating method takes `&mut self`, so
/// shared use must sit behind one lock held for the whole read-modify-write.
#[derive(Debug)]
pub struct HealthMonitor {
    thresholds: HealthThresholds,
    snapshot: HealthSnapshot,
    exhausted: bool,
}

impl HealthMonitor {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            snapshot: HealthSnapshot::new(),
            exhausted: false,
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub fn snapshot(&self) -> &HealthSnapshot {
        &self.snapshot
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// A call that reached the upstream and came back with a usable answer.
    pub fn record_success(&mut self, latency: Duration) {
        self.snapshot.api_calls += 1;
        self.snapshot.consecutive_errors = 0;
        push_capped(
            &mut self.snapshot.response_times,
            latency,
            self.thresholds.metric_cap,
        );
    }

    pub fn record_error(&mut self) {
        self.snapshot.api_calls += 1;
        self.roll_error_window();
        self.snapshot.errors = self.snapshot.errors.saturating_add(1);
        self.snapshot.consecutive_errors = self.snapshot.consecutive_errors.saturating_add(1);
        tracing::debug!(
            target: HEALING_TARGET,
            errors = self.snapshot.errors,
            consecutive = self.snapshot.consecutive_errors,
            "Recorded upstream error"
        );
    }

    pub fn record_quality(&mut self, score: QualityScore) {
        push_capped(
            &mut self.snapshot.quality_scores,
            score.value(),
            self.thresholds.metric_cap,
        );
    }

    fn roll_error_window(&mut self) {
        if self.snapshot.error_window_started.elapsed() >= self.thresholds.error_window {
            self.snapshot.errors = 0;
            self.snapshot.error_window_started = Instant::now();
        }
    }

    /// Judge the rolling metrics.
    ///
    /// Within `min_check_interval` of the last healthy audit (or healing) the
    /// answer is healthy without re-evaluating. Only a healthy verdict moves
    /// the audit clock; nothing else is mutated.
    pub fn check_health(&mut self) -> HealthStatus {
        if self.exhausted {
            return HealthStatus::Exhausted;
        }

        if let Some(last) = self.snapshot.last_audit
            && last.elapsed() < self.thresholds.min_check_interval
        {
            return HealthStatus::Healthy;
        }

        if let Some(reason) = self.evaluate() {
            tracing::warn!(target: HEALING_TARGET, code = reason.code(), "{reason}");
            return HealthStatus::Unhealthy(reason);
        }

        self.snapshot.last_audit = Some(Instant::now());
        HealthStatus::Healthy
    }

    fn evaluate(&self) -> Option<UnhealthyReason> {
        let t = &self.thresholds;
        let s = &self.snapshot;

        let errors_in_window = if s.error_window_started.elapsed() >= t.error_window {
            0
        } else {
            s.errors
        };
        if errors_in_window > t.max_errors_per_window {
            return Some(UnhealthyReason::ErrorRate {
                errors: errors_in_window,
                threshold: t.max_errors_per_window,
            });
        }

        if s.consecutive_errors > t.max_consecutive_errors {
            return Some(UnhealthyReason::ConsecutiveErrors {
                streak: s.consecutive_errors,
                threshold: t.max_consecutive_errors,
            });
        }

        if let Some(average) = s.average_quality()
            && average < t.min_quality_average
        {
            return Some(UnhealthyReason::LowQuality {
                average,
                minimum: t.min_quality_average,
            });
        }

        if let Some(average) = s.average_response_time(t.response_time_window)
            && average > t.max_response_time
        {
            return Some(UnhealthyReason::SlowResponses {
                average,
                maximum: t.max_response_time,
            });
        }

        None
    }

    /// Clear error counters and restart the audit clock.
    ///
    /// Quality and latency history are kept. Returns `false`, and marks the
    /// monitor exhausted, once `max_healing_attempts` healings have been spent.
    pub fn attempt_healing(&mut self) -> bool {
        if self.exhausted || self.snapshot.healing_attempts >= self.thresholds.max_healing_attempts
        {
            if !self.exhausted {
                tracing::error!(
                    target: HEALING_TARGET,
                    max = self.thresholds.max_healing_attempts,
                    "Maximum healing attempts reached"
                );
            }
            self.exhausted = true;
            return false;
        }

        self.snapshot.healing_attempts += 1;
        self.snapshot.total_healing_events += 1;
        self.snapshot.errors = 0;
        self.snapshot.consecutive_errors = 0;
        self.snapshot.error_window_started = Instant::now();
        self.snapshot.last_audit = Some(Instant::now());
        tracing::info!(
            target: HEALING_TARGET,
            attempt = self.snapshot.healing_attempts,
            max = self.thresholds.max_healing_attempts,
            "Healing attempt initiated"
        );
        true
    }

    /// Zero every counter and leave the exhausted state.
    pub fn reset(&mut self) {
        self.snapshot = HealthSnapshot::new();
        self.exhausted = false;
        tracing::info!(target: HEALING_TARGET, "Health metrics reset");
    }

    pub fn summary(&self) -> HealthSummary {
        let status = if self.exhausted {
            "exhausted".to_string()
        } else {
            match self.evaluate() {
                Some(reason) => format!("unhealthy: {reason}"),
                None => "healthy".to_string(),
            }
        };
        HealthSummary {
            status,
            api_calls: self.snapshot.api_calls,
            errors: self.snapshot.errors,
            consecutive_errors: self.snapshot.consecutive_errors,
            healing_attempts: self.snapshot.healing_attempts,
            max_healing_attempts: self.thresholds.max_healing_attempts,
            total_healing_events: self.snapshot.total_healing_events,
            average_quality: self.snapshot.average_quality(),
            average_response_secs: self
                .snapshot
                .average_response_time(self.thresholds.response_time_window)
                .map(|d| d.as_secs_f64()),
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}

fn push_capped<T>(list: &mut VecDeque<T>, value: T, cap: usize) {
    list.push_back(value);
    while list.len() > cap.max(1) {
        list.pop_front();
    }
}
