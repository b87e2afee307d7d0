//! Abuse report intake rules.

use crate::{CoreError, ShortCode};

/// Longest accepted reason, counted before escaping.
pub const MAX_REASON_LENGTH: usize = 1000;

/// A report that passed the input checks but whose code has not yet been
/// looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidReport {
    pub code: ShortCode,
    /// Trimmed and HTML-escaped.
    pub reason: String,
}

/// Check the shape of a report. Existence of the code is checked by the
/// service against the store.
pub fn validate_report(code: &str, reason: &str) -> Result<ValidReport, CoreError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(CoreError::InvalidReport("reason is required".into()));
    }
    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(CoreError::InvalidReport(format!(
            "reason must be at most {} characters",
            MAX_REASON_LENGTH
        )));
    }
    let code = ShortCode::new(code.trim())?;
    Ok(ValidReport {
        code,
        reason: escape_html(reason),
    })
}

/// Escape the five HTML-significant characters.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_escapes() {
        let r = validate_report("abc123", "  <script>alert('x')</script> & more ").unwrap();
        assert_eq!(r.code.as_str(), "abc123");
        assert_eq!(
            r.reason,
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt; &amp; more"
        );
    }

    #[test]
    fn rejects_blank_reason() {
        for reason in ["", "   ", "\n\t"] {
            let err = validate_report("abc123", reason).unwrap_err();
            assert!(matches!(err, CoreError::InvalidReport(_)));
        }
    }

    #[test]
    fn rejects_overlong_reason() {
        let err = validate_report("abc123", &"x".repeat(MAX_REASON_LENGTH + 1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidReport(_)));
        assert!(validate_report("abc123", &"x".repeat(MAX_REASON_LENGTH)).is_ok());
    }

    #[test]
    fn rejects_bad_code_format() {
        for code in ["", "abc", "abc1234", "abc_12"] {
            let err = validate_report(code, "spam").unwrap_err();
            assert!(matches!(err, CoreError::InvalidCode(_)), "{code:?}");
        }
    }

    #[test]
    fn escape_is_not_idempotent_on_ampersands() {
        assert_eq!(escape_html("&amp;"), "&amp;amp;");
        assert_eq!(escape_html("plain"), "plain");
    }
}
