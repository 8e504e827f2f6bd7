use console::style;
use std::fmt::Display;

/// Green bold: confirmations
pub fn success<D: Display>(text: D) -> String {
    style(text).green().bold().to_string()
}

/// White bold: report titles
pub fn header<D: Display>(text: D) -> String {
    style(text).white().bold().to_string()
}

pub fn dim<D: Display>(text: D) -> String {
    style(text).dim().to_string()
}

/// Yellow: warnings and feedback that asks for a change
pub fn yellow<D: Display>(text: D) -> String {
    style(text).yellow().to_string()
}

/// Green: paths, masked keys
pub fn value<D: Display>(text: D) -> String {
    style(text).green().to_string()
}

/// Cyan bold: the assistant's voice
pub fn accent<D: Display>(text: D) -> String {
    style(text).cyan().bold().to_string()
}

/// Colour a compassion score by band.
pub fn score<D: Display>(text: D, band: u8) -> String {
    match band {
        0..=2 => style(text).red().bold().to_string(),
        3 => style(text).yellow().bold().to_string(),
        _ => style(text).green().bold().to_string(),
    }
}
