use std::borrow::Cow;

const MAX_ERROR_BODY_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Prefixes of bare tokens that are redacted wherever they appear.
const TOKEN_PREFIXES: [&str; 4] = ["sk-or-", "sk-", "ghp_", "eyJ"];

/// Markers after which the following token is redacted.
const VALUE_MARKERS: [&str; 8] = [
    "Authorization: Bearer ",
    "authorization: bearer ",
    "Bearer ",
    "api_key=",
    "access_token=",
    "\"api_key\":\"",
    "\"token\":\"",
    "\"key\":\"",
];

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

fn token_end(input: &str, from: usize) -> usize {
    input[from..]
        .char_indices()
        .find(|(_, c)| !is_token_char(*c))
        .map_or(input.len(), |(i, _)| from + i)
}

/// Replace `marker` plus the token that follows it. Markers with nothing
/// after them are left alone.
fn redact_after(text: &mut String, marker: &str) {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find(marker) {
        let start = search_from + rel;
        let value_start = start + marker.len();
        let end = token_end(text, value_start);
        if end == value_start {
            search_from = value_start;
            continue;
        }
        text.replace_range(start..end, REDACTED);
        search_from = start + REDACTED.len();
    }
}

/// Redact API keys and bearer tokens from upstream error text.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    let suspicious = TOKEN_PREFIXES
        .iter()
        .chain(VALUE_MARKERS.iter())
        .any(|p| input.contains(p));
    if !suspicious {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for marker in VALUE_MARKERS {
        redact_after(&mut scrubbed, marker);
    }
    for prefix in TOKEN_PREFIXES {
        redact_after(&mut scrubbed, prefix);
    }
    Cow::Owned(scrubbed)
}

/// Scrub and cap an upstream error body before it is stored or logged.
pub fn sanitize_error_body(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    if scrubbed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return scrubbed.into_owned();
    }
    let truncated: String = scrubbed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{truncated}...")
}
