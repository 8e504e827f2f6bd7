use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a mindful and compassionate AI assistant. Respond with kindness and understanding.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    pub api_key: Option<String>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: super::default_config_dir().join("config.toml"),
            api_key: None,
            gateway: GatewayConfig::default(),
            reliability: ReliabilityConfig::default(),
            health: HealthConfig::default(),
            protocol: ProtocolConfig::default(),
            storage: StorageConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

// ── Gateway ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default)]
    pub frequency_penalty: f64,
    #[serde(default)]
    pub presence_penalty: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_rate_limit_calls")]
    pub rate_limit_calls: usize,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

fn default_model() -> String {
    "anthropic/claude-3-opus-20240229".into()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

fn default_top_p() -> f64 {
    1.0
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_rate_limit_calls() -> usize {
    100
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            timeout_secs: default_timeout_secs(),
            rate_limit_calls: default_rate_limit_calls(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

// ── Reliability ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

// ── Health ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_max_errors_per_window")]
    pub max_errors_per_window: u32,
    #[serde(default = "default_error_window_secs")]
    pub error_window_secs: u64,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    #[serde(default = "default_min_quality_average")]
    pub min_quality_average: f64,
    #[serde(default = "default_max_response_time_secs")]
    pub max_response_time_secs: f64,
    #[serde(default = "default_response_time_window")]
    pub response_time_window: usize,
    #[serde(default = "default_metric_cap")]
    pub metric_cap: usize,
    #[serde(default = "default_max_healing_attempts")]
    pub max_healing_attempts: u32,
    #[serde(default = "default_min_check_interval_secs")]
    pub min_check_interval_secs: u64,
}

fn default_max_errors_per_window() -> u32 {
    10
}

fn default_error_window_secs() -> u64 {
    60
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_min_quality_average() -> f64 {
    2.5
}

fn default_max_response_time_secs() -> f64 {
    30.0
}

fn default_response_time_window() -> usize {
    10
}

fn default_metric_cap() -> usize {
    100
}

fn default_max_healing_attempts() -> u32 {
    3
}

fn default_min_check_interval_secs() -> u64 {
    60
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_errors_per_window: default_max_errors_per_window(),
            error_window_secs: default_error_window_secs(),
            max_consecutive_errors: default_max_consecutive_errors(),
            min_quality_average: default_min_quality_average(),
            max_response_time_secs: default_max_response_time_secs(),
            response_time_window: default_response_time_window(),
            metric_cap: default_metric_cap(),
            max_healing_attempts: default_max_healing_attempts(),
            min_check_interval_secs: default_min_check_interval_secs(),
        }
    }
}

// ── Protocol ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Scores below this get the "rephrase" clarification prompt.
    #[serde(default = "default_needs_rephrase_below")]
    pub needs_rephrase_below: u8,
    /// Scores at or above this earn a wisdom suffix on the response.
    #[serde(default = "default_high_compassion_at")]
    pub high_compassion_at: u8,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
}

fn default_needs_rephrase_below() -> u8 {
    3
}

fn default_high_compassion_at() -> u8 {
    4
}

fn default_preview_chars() -> usize {
    50
}

fn default_context_turns() -> usize {
    10
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            needs_rephrase_below: default_needs_rephrase_below(),
            high_compassion_at: default_high_compassion_at(),
            preview_chars: default_preview_chars(),
            context_turns: default_context_turns(),
        }
    }
}

// ── Storage ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
}

fn default_data_dir() -> String {
    "~/.dhammashell".into()
}

fn default_ledger_file() -> String {
    "conversation_history.json".into()
}

fn default_history_file() -> String {
    "chat_history.json".into()
}

fn default_history_cap() -> usize {
    crate::history::DEFAULT_HISTORY_CAP
}

fn default_reports_dir() -> String {
    "alignment_reports".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ledger_file: default_ledger_file(),
            history_file: default_history_file(),
            history_cap: default_history_cap(),
            reports_dir: default_reports_dir(),
        }
    }
}

impl StorageConfig {
    /// `data_dir` with `~` and `$VARS` expanded.
    pub fn resolved_data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.data_dir).map_or_else(
            |_| shellexpand::tilde(&self.data_dir).into_owned(),
            std::borrow::Cow::into_owned,
        ))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolved_data_dir().join(&self.ledger_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.resolved_data_dir().join(&self.history_file)
    }

    pub fn reports_path(&self) -> PathBuf {
        self.resolved_data_dir().join(&self.reports_dir)
    }
}

// ── Audit ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_healing_rate_weight")]
    pub healing_rate_weight: f64,
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,
    #[serde(default = "default_harm_weight")]
    pub harm_weight: f64,
    #[serde(default = "default_streak_weight")]
    pub streak_weight: f64,
    #[serde(default = "default_latency_weight")]
    pub latency_weight: f64,
    #[serde(default = "default_latency_ceiling_secs")]
    pub latency_ceiling_secs: f64,
    #[serde(default = "default_recommendation_threshold")]
    pub recommendation_threshold: f64,
    #[serde(default = "default_harm_patterns")]
    pub harm_patterns: Vec<String>,
}

fn default_healing_rate_weight() -> f64 {
    0.25
}

fn default_quality_weight() -> f64 {
    0.25
}

fn default_harm_weight() -> f64 {
    0.20
}

fn default_streak_weight() -> f64 {
    0.15
}

fn default_latency_weight() -> f64 {
    0.15
}

fn default_latency_ceiling_secs() -> f64 {
    30.0
}

fn default_recommendation_threshold() -> f64 {
    0.7
}

fn default_harm_patterns() -> Vec<String> {
    crate::audit::policy::DEFAULT_HARM_PATTERNS
        .iter()
        .map(|p| (*p).to_string())
        .collect()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            healing_rate_weight: default_healing_rate_weight(),
            quality_weight: default_quality_weight(),
            harm_weight: default_harm_weight(),
            streak_weight: default_streak_weight(),
            latency_weight: default_latency_weight(),
            latency_ceiling_secs: default_latency_ceiling_secs(),
            recommendation_threshold: default_recommendation_threshold(),
            harm_patterns: default_harm_patterns(),
        }
    }
}

impl AuditConfig {
    pub fn weights(&self) -> [f64; 5] {
        [
            self.healing_rate_weight,
            self.quality_weight,
            self.harm_weight,
            self.streak_weight,
            self.latency_weight,
        ]
    }
}

// ── Validation ──────────────────────────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<()> {
        let weights = self.audit.weights();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            bail!("audit weights must be finite and non-negative");
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            bail!("audit weights must sum to 1.0 (got {sum})");
        }
        if !(0.0..=1.0).contains(&self.audit.recommendation_threshold) {
            bail!("audit.recommendation_threshold must be within [0, 1]");
        }
        if self.audit.latency_ceiling_secs <= 0.0 {
            bail!("audit.latency_ceiling_secs must be positive");
        }

        if self.storage.history_cap == 0 {
            bail!("storage.history_cap must be greater than zero");
        }
        if self.health.metric_cap == 0 || self.health.response_time_window == 0 {
            bail!("health.metric_cap and health.response_time_window must be greater than zero");
        }
        if self.gateway.rate_limit_calls == 0 || self.gateway.rate_limit_window_secs == 0 {
            bail!("gateway rate limit must allow at least one call per non-empty window");
        }

        if !self.health.max_response_time_secs.is_finite()
            || self.health.max_response_time_secs <= 0.0
        {
            bail!("health.max_response_time_secs must be positive");
        }
        if !(0.0..=5.0).contains(&self.health.min_quality_average) {
            bail!("health.min_quality_average must be within [0, 5]");
        }
        for (name, value) in [
            ("protocol.needs_rephrase_below", self.protocol.needs_rephrase_below),
            ("protocol.high_compassion_at", self.protocol.high_compassion_at),
        ] {
            if value > crate::scoring::QualityScore::MAX {
                bail!("{name} must be within [0, 5]");
            }
        }
        if !(0.0..=2.0).contains(&self.gateway.temperature) {
            bail!("gateway.temperature must be within [0, 2]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_fills_every_section() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.gateway.max_tokens, 500);
        assert_eq!(config.reliability.max_retries, 2);
        assert_eq!(config.health.max_healing_attempts, 3);
        assert_eq!(config.protocol.preview_chars, 50);
        assert_eq!(config.storage.history_cap, 1000);
        assert_eq!(config.audit.harm_patterns.len(), 35);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [gateway]
            model = "mistralai/mistral-7b-instruct"
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway.model, "mistralai/mistral-7b-instruct");
        assert_eq!(config.gateway.base_url, "https://openrouter.ai/api/v1");
        assert!((config.gateway.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut config = Config::default();
        config.audit.harm_weight = 0.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = Config::default();
        config.audit.quality_weight = -0.25;
        config.audit.healing_rate_weight = 0.75;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_history_cap_is_rejected() {
        let mut config = Config::default();
        config.storage.history_cap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn quality_threshold_outside_range_is_rejected() {
        let mut config = Config::default();
        config.health.min_quality_average = 6.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn storage_paths_are_joined_under_data_dir() {
        let storage = StorageConfig {
            data_dir: "/var/lib/ds".into(),
            ..StorageConfig::default()
        };
        assert_eq!(
            storage.ledger_path(),
            PathBuf::from("/var/lib/ds/conversation_history.json")
        );
        assert_eq!(
            storage.reports_path(),
            PathBuf::from("/var/lib/ds/alignment_reports")
        );
    }
}
