use super::message::Message;
use crate::error::{CoreError, FormatError, StorageError};
use crate::persist::{self, Loaded};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Append-only, crash-safe log of protocol messages.
///
/// Every mutation rewrites the whole file through a temp file and an atomic
/// rename. Messages are never edited or removed one by one; only
/// [`trim_to`](Self::trim_to) and [`clear`](Self::clear) drop them in bulk.
#[derive(Debug)]
pub struct ConversationLedger {
    path: PathBuf,
    messages: Vec<Message>,
}

impl ConversationLedger {
    /// Open the ledger at `path`, reading whatever is already there.
    ///
    /// A file that is not valid JSON (or not a JSON array) is moved aside to
    /// `<file>.bak` and an empty ledger is used instead. Well-formed JSON
    /// holding an unknown message tag is a [`FormatError`]; an unreadable
    /// file is a [`StorageError`].
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let messages = match persist::read_document(&path)? {
            Loaded::Missing => {
                tracing::info!(path = %path.display(), "No existing conversation ledger found");
                Vec::new()
            }
            Loaded::Content(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Array(records)) => decode_records(records)?,
                Ok(_) => Self::quarantine(&path, "expected a JSON array")?,
                Err(error) => Self::quarantine(&path, &error.to_string())?,
            },
        };

        tracing::info!(count = messages.len(), "Loaded messages from ledger");
        Ok(Self { path, messages })
    }

    fn quarantine(path: &Path, reason: &str) -> Result<Vec<Message>, StorageError> {
        tracing::error!(path = %path.display(), reason, "Conversation ledger is corrupt");
        let backup = persist::quarantine(path)?;
        tracing::warn!(backup = %backup.display(), "Backed up corrupt ledger, starting empty");
        Ok(Vec::new())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append and persist. On a failed write the message is not kept.
    pub fn append(&mut self, message: Message) -> Result<(), StorageError> {
        self.messages.push(message);
        if let Err(error) = self.persist() {
            self.messages.pop();
            return Err(error);
        }
        Ok(())
    }

    /// Snapshot read of the ordered log.
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn export(&self) -> Result<String, FormatError> {
        Ok(serde_json::to_string_pretty(&self.messages)?)
    }

    /// Replace the whole log with a previously exported one and persist it.
    ///
    /// Unlike [`load`](Self::load), malformed input is rejected rather than
    /// quarantined, and the current log is left untouched.
    pub fn import(&mut self, json: &str) -> Result<(), CoreError> {
        let messages = parse_messages(json)?;
        let previous = std::mem::replace(&mut self.messages, messages);
        if let Err(error) = self.persist() {
            self.messages = previous;
            return Err(error.into());
        }
        tracing::info!(count = self.messages.len(), "Imported conversation");
        Ok(())
    }

    /// Keep only the newest `keep` messages.
    pub fn trim_to(&mut self, keep: usize) -> Result<usize, StorageError> {
        let excess = self.messages.len().saturating_sub(keep);
        if excess == 0 {
            return Ok(0);
        }
        let removed: Vec<Message> = self.messages.drain(..excess).collect();
        if let Err(error) = self.persist() {
            self.messages.splice(0..0, removed);
            return Err(error);
        }
        Ok(excess)
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.trim_to(0).map(|_| ())
    }

    fn persist(&self) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&self.messages)
            .map_err(|e| StorageError::new("failed serializing", &self.path, e.into()))?;
        persist::write_atomic(&self.path, &json)?;
        tracing::debug!(count = self.messages.len(), "Saved conversation ledger");
        Ok(())
    }
}

pub fn parse_messages(json: &str) -> Result<Vec<Message>, FormatError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Array(records) => decode_records(records),
        _ => Err(FormatError::NotAnArray),
    }
}

fn decode_records(records: Vec<Value>) -> Result<Vec<Message>, FormatError> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| Message::from_record(index, record))
        .collect()
}
