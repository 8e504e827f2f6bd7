//! Compassion scoring.
//!
//! The core only consumes a [`QualityScore`]; where it comes from is up to the
//! caller. [`LexiconScorer`] is the small word-list heuristic the `ds` binary
//! ships with.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An integer score in `0..=5`. Higher means kinder input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct QualityScore(u8);

impl QualityScore {
    pub const MAX: u8 = 5;

    pub fn new(score: i64) -> Result<Self, ValidationError> {
        u8::try_from(score)
            .ok()
            .filter(|value| *value <= Self::MAX)
            .map(Self)
            .ok_or(ValidationError::QualityOutOfRange { score })
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for QualityScore {
    type Error = ValidationError;

    fn try_from(score: i64) -> Result<Self, Self::Error> {
        Self::new(score)
    }
}

impl From<QualityScore> for u8 {
    fn from(score: QualityScore) -> Self {
        score.0
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

/// Result of scoring one piece of user text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub score: QualityScore,
    pub feedback: &'static str,
}

pub trait CompassionScorer: Send + Sync {
    fn assess(&self, text: &str) -> Result<Assessment, ValidationError>;
}

const HARSH_WORDS: [&str; 6] = ["hate", "stupid", "idiot", "dumb", "ugly", "terrible"];

const KIND_WORDS: [&str; 15] = [
    "compassion",
    "kindness",
    "understanding",
    "peace",
    "love",
    "wisdom",
    "mindful",
    "gentle",
    "patient",
    "caring",
    "help",
    "support",
    "guide",
    "heal",
    "nurture",
];

const BASE_SCORE: i64 = 3;
const MAX_KIND_BONUS: i64 = 2;

/// Word-list heuristic: start at 3, add one per kind word (at most two),
/// subtract one per harsh word, clamp to `0..=5`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconScorer;

impl CompassionScorer for LexiconScorer {
    fn assess(&self, text: &str) -> Result<Assessment, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyContent);
        }

        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split_whitespace()
            .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
            .collect();

        let harsh = words.iter().filter(|w| HARSH_WORDS.contains(w)).count();
        let kind = words
            .iter()
            .filter(|w| KIND_WORDS.iter().any(|k| w.contains(k)))
            .count();

        let harsh = i64::try_from(harsh).unwrap_or(i64::MAX);
        let kind = i64::try_from(kind).unwrap_or(i64::MAX).min(MAX_KIND_BONUS);
        let raw = BASE_SCORE.saturating_add(kind).saturating_sub(harsh);
        let score = QualityScore::new(raw.clamp(0, i64::from(QualityScore::MAX)))?;

        Ok(Assessment {
            score,
            feedback: feedback_for(score),
        })
    }
}

fn feedback_for(score: QualityScore) -> &'static str {
    match score.value() {
        0..=2 => "Try rephrasing with more kindness and understanding.",
        3 => "Good, but could be more compassionate.",
        _ => "Excellent compassionate communication!",
    }
}
