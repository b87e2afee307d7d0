//! Shared HTTP utilities for the URL shortener workspace.
//!
//! Provides JSON error bodies, short-URL building, time formatting and
//! query/config parsing helpers used by the api-server. Framework-agnostic.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create an error JSON with a default message based on the reason.
///
/// Returns: `{"error": "<reason>", "message": "<default message>"}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Short link not found",
        "bad_request" => "Bad request",
        "invalid_code" => "Invalid short code format",
        "conflict" => "Resource already exists",
        "code_generation_failed" => "Could not allocate a short code, please retry",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    json_error_with_message(code, message)
}

/// Create an error JSON with a custom message.
///
/// `error` is the stable machine-readable reason; `message` is for people.
pub fn json_error_with_message(reason: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": reason, "message": message})
}

// ============================================================================
// URL Building
// ============================================================================

/// Build a short URL for `code`.
///
/// Uses `base` (e.g. `https://sho.rt`) when configured, otherwise
/// `http://{host}/{code}`, or `/{code}` if host is empty.
pub fn build_short_url(base: Option<&str>, host: &str, code: &str) -> String {
    if let Some(dom) = base.filter(|d| !d.is_empty()) {
        return format!("{}/{}", dom.trim_end_matches('/'), code);
    }
    if host.is_empty() {
        format!("/{}", code)
    } else {
        format!("http://{}/{}", host, code)
    }
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Parsing Helpers
// ============================================================================

/// Interpret a flag value the way query strings and env vars spell booleans.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Split a comma-separated list, trimming entries and dropping empties.
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
