use crate::error::{FormatError, ValidationError};
use crate::persist::iso8601;
use crate::scoring::QualityScore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

/// The four steps of one protocol turn. Serialized as its lowercase tag.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    Seek,
    Respond,
    Acknowledge,
    Clarify,
}

/// Structured metadata a protocol message may carry.
///
/// `original_message` is a value copy of the message this one answers, never
/// a live link into the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_message: Option<Box<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compassion_score: Option<QualityScore>,
}

impl MessageMetadata {
    pub fn referencing(original: &Message) -> Self {
        Self {
            original_message: Some(Box::new(original.clone())),
            compassion_score: None,
        }
    }

    pub fn with_compassion_score(mut self, score: QualityScore) -> Self {
        self.compassion_score = Some(score);
        self
    }
}

/// One protocol-level step in a conversation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: MessageKind,
    content: String,
    #[serde(rename = "timestamp", with = "iso8601")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    metadata: Option<MessageMetadata>,
}

impl Message {
    /// Build a message stamped now. Content is stored trimmed and must not be
    /// empty after trimming.
    pub fn new(
        kind: MessageKind,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<Self, ValidationError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        Ok(Self {
            kind,
            content: content.to_string(),
            created_at: Utc::now(),
            metadata,
        })
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> Option<&MessageMetadata> {
        self.metadata.as_ref()
    }

    /// Decode one persisted record, reporting unknown kind tags distinctly
    /// from other schema problems.
    pub(crate) fn from_record(index: usize, record: Value) -> Result<Self, FormatError> {
        let tag = record
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| FormatError::InvalidRecord {
                index,
                reason: "missing string field 'type'".into(),
            })?;
        if tag.parse::<MessageKind>().is_err() {
            return Err(FormatError::UnknownKind {
                tag: tag.to_string(),
            });
        }

        let message: Self =
            serde_json::from_value(record).map_err(|error| FormatError::InvalidRecord {
                index,
                reason: error.to_string(),
            })?;
        if message.content.trim().is_empty() {
            return Err(FormatError::InvalidRecord {
                index,
                reason: "empty content".into(),
            });
        }
        Ok(message)
    }
}
