//! Parser for usage section text
//!
//! A section's visible text looks like `Current session Resets in 2 hr 15 min 45% used`,
//! possibly spread across several lines. Only the percentage is mandatory.

use crate::usage::types::WindowUsage;
use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder when a section shows no reset time
pub const UNKNOWN_RESET: &str = "unknown";

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("valid percentage pattern"));

// Stops at the end of the line or right before a trailing percentage
static RESET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bresets(?:\s+in)?[:\s]+([^\n%]+?)(?:\s+\d+(?:\.\d+)?\s*%|\n|$)")
        .expect("valid reset pattern")
});

/// Parses the reset time and percentage out of a section's text
///
/// # Returns
///
/// * `Ok(WindowUsage)` - A percentage was found
/// * `Err(String)` - No percentage in the text
///
/// # Example
///
/// ```
/// use usage_keeper::usage::parse_window_usage;
///
/// let usage = parse_window_usage("Current session\nResets in 4 hr\n12% used").unwrap();
/// assert_eq!(usage.resets_in, "4 hr");
/// assert_eq!(usage.percentage_used, 12.0);
/// ```
pub fn parse_window_usage(text: &str) -> Result<WindowUsage, String> {
    let percentage_used = PERCENT_RE
        .captures_iter(text)
        .find_map(|caps| caps[1].parse::<f64>().ok())
        .map(|value| value.clamp(0.0, 100.0))
        .ok_or_else(|| {
            format!(
                "no percentage found in section text: '{}'",
                truncate(text.trim(), 80)
            )
        })?;

    let resets_in = RESET_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| UNKNOWN_RESET.to_string());

    Ok(WindowUsage {
        resets_in,
        percentage_used,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
