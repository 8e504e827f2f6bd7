use rand::seq::IndexedRandom;

pub const WISDOMS: [&str; 10] = [
    "The root of suffering is attachment.",
    "All conditioned things are impermanent.",
    "With our thoughts, we make the world.",
    "Peace comes from within.",
    "The mind is everything.",
    "In the end, only three things matter: how much you loved, how gently you lived, and how gracefully you let go.",
    "The way is not in the sky. The way is in the heart.",
    "You yourself deserve your love and affection.",
    "The only real failure is not to be true to the best one knows.",
    "Happiness never decreases by being shared.",
];

pub fn random_wisdom() -> &'static str {
    WISDOMS.choose(&mut rand::rng()).copied().unwrap_or(WISDOMS[0])
}

/// `text` followed by a blank line and one saying.
pub fn with_wisdom(text: &str) -> String {
    format!("{text}\n\nDharma Wisdom: {}", random_wisdom())
}
