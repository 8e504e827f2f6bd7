use crate::error::ValidationError;
use std::fmt;
use zeroize::Zeroizing;

/// Upstream API credential.
///
/// Never printed: `Debug` and `Display` both render a fixed mask, and the
/// backing buffer is wiped on drop.
#[derive(Clone)]
pub struct ApiKey(Zeroizing<String>);

impl ApiKey {
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingApiKey);
        }
        Ok(Self(Zeroizing::new(trimmed.to_string())))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub(crate) fn bearer_header(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("Bearer {}", self.0.as_str()))
    }

    /// First four characters followed by a mask, for `ds config` output.
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{prefix}****")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
