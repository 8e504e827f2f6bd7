//! Capped, persisted record of completed generation calls.

use crate::error::{CoreError, FormatError, StorageError};
use crate::persist::{self, Loaded, iso8601};
use crate::scoring::QualityScore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{AsRefStr, Display};

pub const DEFAULT_HISTORY_CAP: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// One prior turn sent along as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ContextTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// One completed request/response interaction.
///
/// `healed_response` and `healing_reason` are set together or not at all;
/// they are private so the pair can only be written through
/// [`with_healing`](Self::with_healing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub request_text: String,
    pub original_response: String,
    healed_response: Option<String>,
    healing_reason: Option<String>,
    pub quality_score: QualityScore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub context_snapshot: Vec<ContextTurn>,
}

impl ChatHistoryEntry {
    pub fn new(
        request_text: impl Into<String>,
        original_response: impl Into<String>,
        quality_score: QualityScore,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            request_text: request_text.into(),
            original_response: original_response.into(),
            healed_response: None,
            healing_reason: None,
            quality_score,
            latency_ms: None,
            context_snapshot: Vec::new(),
        }
    }

    pub fn with_healing(mut self, response: impl Into<String>, reason: impl Into<String>) -> Self {
        self.healed_response = Some(response.into());
        self.healing_reason = Some(reason.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_context(mut self, context: Vec<ContextTurn>) -> Self {
        self.context_snapshot = context;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn healed_response(&self) -> Option<&str> {
        self.healed_response.as_deref()
    }

    pub fn healing_reason(&self) -> Option<&str> {
        self.healing_reason.as_deref()
    }

    pub fn is_healed(&self) -> bool {
        self.healed_response.is_some()
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency_ms.map(Duration::from_millis)
    }

    /// The text the user actually saw.
    pub fn delivered_response(&self) -> &str {
        self.healed_response
            .as_deref()
            .unwrap_or(&self.original_response)
    }
}

/// Ring of [`ChatHistoryEntry`] records, oldest evicted first once `cap` is
/// reached. With a backing path, every append rewrites the file.
#[derive(Debug)]
pub struct ChatHistory {
    path: Option<PathBuf>,
    entries: VecDeque<ChatHistoryEntry>,
    cap: usize,
}

impl ChatHistory {
    pub fn in_memory(cap: usize) -> Self {
        Self {
            path: None,
            entries: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// Open the history at `path`. Corrupt JSON is quarantined to
    /// `<file>.bak` the same way the conversation ledger does it.
    pub fn load(path: impl Into<PathBuf>, cap: usize) -> Result<Self, CoreError> {
        let path = path.into();
        let mut history = Self {
            path: None,
            entries: VecDeque::new(),
            cap: cap.max(1),
        };

        if let Loaded::Content(raw) = persist::read_document(&path)? {
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Array(records)) => {
                    for entry in decode_records(records)? {
                        history.push_capped(entry);
                    }
                }
                Ok(_) => quarantine(&path, "expected a JSON array")?,
                Err(error) => quarantine(&path, &error.to_string())?,
            }
        }

        tracing::info!(count = history.entries.len(), "Loaded chat history");
        history.path = Some(path);
        Ok(history)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> std::collections::vec_deque::Iter<'_, ChatHistoryEntry> {
        self.entries.iter()
    }

    /// Append, evicting the oldest entries past the cap, then persist.
    /// A failed write leaves the in-memory ring as it was.
    pub fn append(&mut self, entry: ChatHistoryEntry) -> Result<(), StorageError> {
        let evicted = self.push_capped(entry);
        if let Err(error) = self.persist() {
            self.entries.pop_back();
            for old in evicted.into_iter().rev() {
                self.entries.push_front(old);
            }
            return Err(error);
        }
        Ok(())
    }

    /// Returns the evicted entries, oldest first.
    fn push_capped(&mut self, entry: ChatHistoryEntry) -> Vec<ChatHistoryEntry> {
        self.entries.push_back(entry);
        let excess = self.entries.len().saturating_sub(self.cap);
        self.entries.drain(..excess).collect()
    }

    /// The last `turns` user/assistant turns, oldest first.
    pub fn recent_context(&self, turns: usize) -> Vec<ContextTurn> {
        let mut context: Vec<ContextTurn> = self
            .entries
            .iter()
            .rev()
            .flat_map(|entry| {
                [
                    ContextTurn::assistant(entry.delivered_response()),
                    ContextTurn::user(entry.request_text.clone()),
                ]
            })
            .take(turns)
            .collect();
        context.reverse();
        context
    }

    pub fn export(&self) -> Result<String, FormatError> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Replace all entries with a previously exported set and persist.
    pub fn import(&mut self, json: &str) -> Result<(), CoreError> {
        let records = match serde_json::from_str::<Value>(json).map_err(FormatError::from)? {
            Value::Array(records) => records,
            _ => return Err(FormatError::NotAnArray.into()),
        };
        let decoded = decode_records(records)?;

        let previous = std::mem::take(&mut self.entries);
        for entry in decoded {
            self.push_capped(entry);
        }
        if let Err(error) = self.persist() {
            self.entries = previous;
            return Err(error.into());
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), StorageError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| StorageError::new("failed serializing", path, e.into()))?;
        persist::write_atomic(path, &json)?;
        tracing::debug!(count = self.entries.len(), "Saved chat history");
        Ok(())
    }
}

fn quarantine(path: &Path, reason: &str) -> Result<(), StorageError> {
    tracing::error!(path = %path.display(), reason, "Chat history is corrupt");
    let backup = persist::quarantine(path)?;
    tracing::warn!(backup = %backup.display(), "Backed up corrupt chat history, starting empty");
    Ok(())
}

fn decode_records(records: Vec<Value>) -> Result<Vec<ChatHistoryEntry>, FormatError> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let entry: ChatHistoryEntry =
                serde_json::from_value(record).map_err(|error| FormatError::InvalidRecord {
                    index,
                    reason: error.to_string(),
                })?;
            if entry.healed_response.is_some() != entry.healing_reason.is_some() {
                return Err(FormatError::HealingMismatch { index });
            }
            Ok(entry)
        })
        .collect()
}
