//! Whole-file JSON persistence shared by the ledger and the chat history.
//!
//! Writes go to a sibling `.tmp` file, are flushed to disk, then renamed over
//! the target so readers never observe a half-written file.

use crate::error::StorageError;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Outcome of reading a persisted JSON document.
#[derive(Debug)]
pub enum Loaded {
    /// No file, or a file containing only whitespace.
    Missing,
    /// Raw file contents, trimmed.
    Content(String),
}

pub fn write_atomic(path: &Path, content: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| StorageError::new("failed creating parent of", path, e))?;
    }

    let temp_path = temp_path_for(path);
    let write_result = File::create(&temp_path).and_then(|mut file| {
        file.write_all(content.as_bytes())?;
        file.sync_all()
    });
    if let Err(error) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(StorageError::new("failed writing temp file", &temp_path, error));
    }

    if let Err(rename_error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StorageError::new(
            "failed replacing file atomically",
            path,
            rename_error,
        ));
    }

    Ok(())
}

pub fn read_document(path: &Path) -> Result<Loaded, StorageError> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                Ok(Loaded::Missing)
            } else {
                Ok(Loaded::Content(trimmed.to_string()))
            }
        }
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(Loaded::Missing),
        Err(error) => Err(StorageError::new("failed reading", path, error)),
    }
}

/// Move a corrupt file aside to `<file>.bak`, replacing any older backup.
pub fn quarantine(path: &Path) -> Result<PathBuf, StorageError> {
    let backup = backup_path_for(path);
    fs::rename(path, &backup).map_err(|e| StorageError::new("failed quarantining", path, e))?;
    Ok(backup)
}

pub fn backup_path_for(path: &Path) -> PathBuf {
    append_extension(path, "bak")
}

fn temp_path_for(path: &Path) -> PathBuf {
    append_extension(path, "tmp")
}

fn append_extension(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// ISO-8601 timestamps that keep full precision on the way out and accept
/// both offset-carrying and naive (assumed UTC) stamps on the way in.
pub mod iso8601 {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
            return Ok(stamp.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|error| format!("invalid timestamp {raw:?}: {error}"))
    }
}
