use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for the `DhammaShell` core.
///
/// Each subsystem defines its own error enum. Protocol operations only ever
/// surface [`CoreError::Validation`] and [`CoreError::Storage`]; gateway and
/// health failures are absorbed into fallback text before they reach a caller.
/// The binary edge uses `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Caller input ────────────────────────────────────────────────────
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    // ── Upstream completion service ─────────────────────────────────────
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    // ── Persisted data ──────────────────────────────────────────────────
    #[error("format: {0}")]
    Format(#[from] FormatError),

    // ── Storage medium ──────────────────────────────────────────────────
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    // ── Health monitor ──────────────────────────────────────────────────
    #[error("health: {0}")]
    HealthExhausted(#[from] HealthExhaustedError),
}

// ─── Validation errors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message content must not be empty")]
    EmptyContent,

    #[error("quality score {score} is outside 0..=5")]
    QualityOutOfRange { score: i64 },

    #[error("expected a {expected} message, got {found}")]
    WrongKind {
        expected: &'static str,
        found: String,
    },

    #[error("message does not belong to the active turn")]
    UnknownMessage,

    #[error("{operation} is not allowed while the turn is {state}")]
    OutOfOrder {
        operation: &'static str,
        state: &'static str,
    },

    #[error("an API key is required")]
    MissingApiKey,
}

// ─── Gateway errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("response JSON decode failed: {0}")]
    Decode(String),

    #[error("response contained no choices")]
    EmptyChoice,

    #[error("rate-limit wait cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Whether retrying the same request may succeed.
    ///
    /// 4xx client errors will not resolve with retries, except 408 Request
    /// Timeout and 429 Too Many Requests. Quota exhaustion never recovers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, body } => {
                if is_quota_exhausted(body) {
                    return false;
                }
                !((400..500).contains(status) && *status != 408 && *status != 429)
            }
            Self::Transport(_) | Self::Decode(_) | Self::EmptyChoice => true,
            Self::Cancelled => false,
        }
    }
}

fn is_quota_exhausted(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("insufficient_quota")
        || lower.contains("exceeded your current quota")
        || lower.contains("billing")
}

// ─── Format errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON array of records")]
    NotAnArray,

    #[error("unknown message type tag: {tag}")]
    UnknownKind { tag: String },

    #[error("record {index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("record {index} has a healed response without a healing reason (or vice versa)")]
    HealingMismatch { index: usize },
}

// ─── Storage errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("{action} {path}: {source}")]
pub struct StorageError {
    pub action: &'static str,
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

impl StorageError {
    pub fn new(action: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}

// ─── Health errors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("healing exhausted after {attempts} attempts")]
pub struct HealthExhaustedError {
    pub attempts: u32,
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
