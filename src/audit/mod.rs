//! Offline alignment scoring over chat history.
//!
//! Read-only: the auditor borrows a [`ChatHistory`] and produces derived,
//! disposable [`AlignmentMetrics`]. Only the rendered report is ever saved.

pub mod policy;
pub mod report;

pub use policy::{AuditPolicy, ScoreWeights};

use crate::error::{CoreError, FormatError};
use crate::history::{ChatHistory, ChatHistoryEntry};
use crate::persist;
use chrono::{DateTime, Local, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The five normalized components of the alignment score, each in `[0, 1]`
/// with higher meaning better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    pub healing_rate: f64,
    pub quality: f64,
    pub harm: f64,
    pub streak: f64,
    pub latency: f64,
}

impl SubScores {
    const PERFECT: Self = Self {
        healing_rate: 1.0,
        quality: 1.0,
        harm: 1.0,
        streak: 1.0,
        latency: 1.0,
    };

    fn weighted(&self, weights: &ScoreWeights) -> f64 {
        let total = weights.healing_rate * self.healing_rate
            + weights.quality * self.quality
            + weights.harm * self.harm
            + weights.streak * self.streak
            + weights.latency * self.latency;
        total.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentMetrics {
    pub total_entries: usize,
    pub healed_entries: usize,
    pub quality_scores: Vec<u8>,
    pub latencies: Vec<Duration>,
    /// Healing reasons by descending frequency.
    pub healing_reasons: Vec<(String, usize)>,
    /// Flagged patterns by descending frequency.
    pub harm_patterns: Vec<(String, usize)>,
    pub max_flagged_streak: usize,
    pub time_period: TimeDelta,
    pub sub_scores: SubScores,
    pub alignment_score: f64,
}

impl AlignmentMetrics {
    fn empty(time_period: TimeDelta) -> Self {
        Self {
            total_entries: 0,
            healed_entries: 0,
            quality_scores: Vec::new(),
            latencies: Vec::new(),
            healing_reasons: Vec::new(),
            harm_patterns: Vec::new(),
            max_flagged_streak: 0,
            time_period,
            sub_scores: SubScores::PERFECT,
            alignment_score: 1.0,
        }
    }

    pub fn average_quality(&self) -> Option<f64> {
        if self.quality_scores.is_empty() {
            return None;
        }
        let sum: f64 = self.quality_scores.iter().map(|q| f64::from(*q)).sum();
        Some(sum / self.quality_scores.len() as f64)
    }

    pub fn average_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total.div_f64(self.latencies.len() as f64))
    }

    pub fn healing_rate(&self) -> f64 {
        if self.total_entries == 0 {
            return 0.0;
        }
        self.healed_entries as f64 / self.total_entries as f64
    }

    pub fn total_flagged(&self) -> usize {
        self.harm_patterns.iter().map(|(_, count)| count).sum()
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_entries: self.total_entries,
            healed_entries: self.healed_entries,
            average_quality: self.average_quality(),
            average_latency_secs: self.average_latency().map(|d| d.as_secs_f64()),
            healing_reasons: self.healing_reasons.iter().cloned().collect(),
            harm_patterns: self.harm_patterns.iter().cloned().collect(),
            max_flagged_streak: self.max_flagged_streak,
            time_period_hours: self.time_period.num_seconds() as f64 / 3600.0,
            sub_scores: self.sub_scores,
            alignment_score: self.alignment_score,
        }
    }
}

/// Serializable view of [`AlignmentMetrics`] stored in saved reports.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_entries: usize,
    pub healed_entries: usize,
    pub average_quality: Option<f64>,
    pub average_latency_secs: Option<f64>,
    pub healing_reasons: HashMap<String, usize>,
    pub harm_patterns: HashMap<String, usize>,
    pub max_flagged_streak: usize,
    pub time_period_hours: f64,
    pub sub_scores: SubScores,
    pub alignment_score: f64,
}

#[derive(Debug, Serialize)]
struct SavedReport<'a> {
    generated_at: DateTime<Utc>,
    metrics: MetricsSummary,
    report: &'a str,
}

pub struct AlignmentAuditor<'a> {
    history: &'a ChatHistory,
    policy: AuditPolicy,
}

impl<'a> AlignmentAuditor<'a> {
    pub fn new(history: &'a ChatHistory, policy: AuditPolicy) -> Self {
        Self { history, policy }
    }

    pub fn policy(&self) -> &AuditPolicy {
        &self.policy
    }

    /// Metrics over entries no older than `window` (all entries if `None`).
    pub fn analyze(&self, window: Option<TimeDelta>) -> AlignmentMetrics {
        self.analyze_at(Utc::now(), window)
    }

    pub fn analyze_at(&self, now: DateTime<Utc>, window: Option<TimeDelta>) -> AlignmentMetrics {
        let entries: Vec<&ChatHistoryEntry> = self
            .history
            .entries()
            .filter(|entry| window.is_none_or(|w| now - entry.timestamp <= w))
            .collect();

        let Some(first) = entries.first() else {
            return AlignmentMetrics::empty(window.unwrap_or(TimeDelta::zero()));
        };
        let time_period = window.unwrap_or(now - first.timestamp);

        let mut healed_entries = 0;
        let mut healing_reasons: HashMap<String, usize> = HashMap::new();
        let mut harm_patterns: HashMap<String, usize> = HashMap::new();
        let mut streak = 0;
        let mut max_flagged_streak = 0;

        for entry in &entries {
            if let Some(reason) = entry.healing_reason() {
                healed_entries += 1;
                *healing_reasons.entry(reason.to_string()).or_default() += 1;
            }

            let mut flagged = false;
            for pattern in self.policy.flagged_in(&entry.original_response) {
                *harm_patterns.entry(pattern.to_string()).or_default() += 1;
                flagged = true;
            }
            if flagged {
                streak += 1;
                max_flagged_streak = max_flagged_streak.max(streak);
            } else {
                streak = 0;
            }
        }

        let mut metrics = AlignmentMetrics {
            total_entries: entries.len(),
            healed_entries,
            quality_scores: entries.iter().map(|e| e.quality_score.value()).collect(),
            latencies: entries.iter().filter_map(|e| e.latency()).collect(),
            healing_reasons: ranked(healing_reasons),
            harm_patterns: ranked(harm_patterns),
            max_flagged_streak,
            time_period,
            sub_scores: SubScores::PERFECT,
            alignment_score: 1.0,
        };
        metrics.sub_scores = self.sub_scores(&metrics);
        metrics.alignment_score = metrics.sub_scores.weighted(&self.policy.weights);

        tracing::debug!(
            entries = metrics.total_entries,
            score = metrics.alignment_score,
            "Computed alignment metrics"
        );
        metrics
    }

    fn sub_scores(&self, metrics: &AlignmentMetrics) -> SubScores {
        let total = metrics.total_entries as f64;
        let quality = metrics
            .average_quality()
            .map_or(0.0, |avg| (avg / 5.0).min(1.0));
        let latency = metrics.average_latency().map_or(1.0, |avg| {
            let ceiling = self.policy.latency_ceiling.as_secs_f64();
            if ceiling <= 0.0 {
                return 0.0;
            }
            1.0 - (avg.as_secs_f64() / ceiling).min(1.0)
        });

        SubScores {
            healing_rate: unit(1.0 - metrics.healing_rate()),
            quality: unit(quality),
            harm: unit(1.0 - metrics.total_flagged() as f64 / total),
            streak: unit(1.0 - metrics.max_flagged_streak as f64 / total),
            latency: unit(latency),
        }
    }

    pub fn report(&self, window: Option<TimeDelta>) -> String {
        report::render(&self.analyze(window), &self.policy)
    }

    /// Write `alignment_report_<YYYYmmdd_HHMMSS>.json` under `dir`.
    pub fn save_report(&self, dir: &Path, window: Option<TimeDelta>) -> Result<PathBuf, CoreError> {
        let metrics = self.analyze(window);
        let text = report::render(&metrics, &self.policy);
        let saved = SavedReport {
            generated_at: Utc::now(),
            metrics: metrics.summary(),
            report: &text,
        };
        let json = serde_json::to_string_pretty(&saved).map_err(FormatError::from)?;

        let name = format!(
            "alignment_report_{}.json",
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = dir.join(name);
        persist::write_atomic(&path, &json)?;
        tracing::info!(path = %path.display(), "Saved alignment report");
        Ok(path)
    }
}

fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn ranked(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}
