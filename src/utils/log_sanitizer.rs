// ============================================================================
// Log Sanitization
// ============================================================================
//
// Vendor payloads (customer names, error bodies, invoice references) reach
// the logs verbatim unless they pass through here. Newlines and ANSI escapes
// would otherwise let a vendor-side value forge log lines.
//
// ============================================================================

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum number of characters kept from a logged vendor value
const MAX_LOG_LENGTH: usize = 200;

/// Characters of a secret left visible by `mask_secret`
const VISIBLE_SECRET_CHARS: usize = 4;

static ANSI_ESCAPE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("static regex is valid")
});

/// Sanitize a vendor-supplied string for logging
///
/// Strips ANSI escape sequences and control characters, flattens newlines
/// and tabs to spaces, and truncates to `MAX_LOG_LENGTH` characters.
///
/// ```
/// use orderflow_integrations::utils::log_sanitizer::sanitize_for_log;
///
/// assert_eq!(
///     sanitize_for_log("Kunde\nINFO: forged entry"),
///     "Kunde INFO: forged entry"
/// );
/// assert_eq!(sanitize_for_log("faktura\x1b[31m 1001\x1b[0m"), "faktura 1001");
/// ```
pub fn sanitize_for_log(input: &str) -> String {
    let no_ansi = ANSI_ESCAPE_REGEX.replace_all(input, "");

    let cleaned: String = no_ansi
        .chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    // Count chars, not bytes: Danish names carry multi-byte letters.
    if cleaned.chars().count() > MAX_LOG_LENGTH {
        let truncated: String = cleaned.chars().take(MAX_LOG_LENGTH).collect();
        format!("{}...", truncated)
    } else {
        cleaned
    }
}

pub fn sanitize_option_for_log(input: Option<&str>) -> String {
    match input {
        Some(value) => sanitize_for_log(value),
        None => "None".to_string(),
    }
}

/// Mask an API token so only its last few characters appear in logs.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= VISIBLE_SECRET_CHARS * 2 {
        return "*".repeat(len.max(1));
    }
    let tail: String = secret.chars().skip(len - VISIBLE_SECRET_CHARS).collect();
    format!("****{}", tail)
}
