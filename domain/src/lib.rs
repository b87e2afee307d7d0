//! Domain library for the URL Shortener.
//!
//! Holds the domain types, ports (traits), error definitions and the pure
//! policies that sit on the trust boundary: URL admission, short-code
//! generation and the redirect state machine. Keep adapters and IO concerns
//! out of this crate.

use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use thiserror::Error;

/// Length of generated short codes.
pub const CODE_LENGTH: usize = 6;

/// Maximum accepted length of an original URL, in characters.
pub const MAX_URL_LENGTH: usize = 2048;

/// A fixed-length alphanumeric short code identifying a stored URL.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortCode(String);

impl ShortCode {
    /// Parse a code, requiring exactly [`CODE_LENGTH`] ASCII alphanumerics.
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if !is_code_format(&val) {
            return Err(CoreError::InvalidCode(format!(
                "code must be {} alphanumeric characters",
                CODE_LENGTH
            )));
        }
        Ok(Self(val))
    }

    /// For generators that produce valid codes by construction.
    pub(crate) fn new_unchecked(s: String) -> Self {
        debug_assert!(is_code_format(&s));
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true when `s` has the shape of a short code (`[A-Za-z0-9]{6}`).
pub fn is_code_format(s: &str) -> bool {
    s.len() == CODE_LENGTH && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Stored code -> URL mapping. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlRecord {
    pub code: ShortCode,
    pub original_url: String,
    pub created_at: SystemTime,
}

impl UrlRecord {
    pub fn new(code: ShortCode, original_url: String, created_at: SystemTime) -> Self {
        Self {
            code,
            original_url,
            created_at,
        }
    }
}

/// An abuse report filed against a short code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportRecord {
    pub url_code: ShortCode,
    /// Already HTML-escaped; safe to render verbatim.
    pub reason: String,
    pub created_at: SystemTime,
}

/// Outcome of the shorten pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortenResult {
    pub record: UrlRecord,
    /// True when the URL had been shortened before and the existing code was reused.
    pub already_existed: bool,
}

/// Payload handed to operators when a report is filed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportNotice {
    pub code: ShortCode,
    pub target_url: String,
    pub reason: String,
    pub reported_at: SystemTime,
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Produces candidate short codes. Uniqueness is not this trait's concern;
/// see [`code::generate_unique_code`].
pub trait CodeGenerator: Send + Sync {
    fn next_code(&self) -> ShortCode;
}

/// Storage port for code -> URL mappings and their reports.
///
/// Implementations must enforce uniqueness of `code` themselves and report a
/// losing insert as [`CoreError::AlreadyExists`]; the service's
/// check-then-insert is only a fast path.
pub trait UrlStore: Send + Sync {
    /// Exact-match lookup on the stored original URL.
    fn find_by_url(&self, url: &str) -> Result<Option<UrlRecord>, CoreError>;
    fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlRecord>, CoreError>;
    fn code_exists(&self, code: &ShortCode) -> Result<bool, CoreError>;
    fn insert(&self, record: &UrlRecord) -> Result<(), CoreError>;
    /// Attach a report. Returns `NotFound` if the code does not exist.
    fn add_report(&self, report: &ReportRecord) -> Result<(), CoreError>;
    fn has_reports(&self, code: &ShortCode) -> Result<bool, CoreError>;
    /// Total number of stored URL records.
    fn count(&self) -> Result<u64, CoreError>;
}

/// Out-of-band operator notification for new reports.
///
/// Callers treat an `Err` as non-fatal; implementations should hand work off
/// rather than block.
pub trait ReportNotifier: Send + Sync {
    fn notify(&self, notice: ReportNotice) -> Result<(), CoreError>;
}

/// Notifier that drops every notice. Useful for tests and the demo CLI.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl ReportNotifier for NoopNotifier {
    fn notify(&self, _notice: ReportNotice) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Why a submitted URL was refused admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UrlRejection {
    Empty,
    TooLong,
    MalformedUrl,
    DisallowedProtocol,
    PrivateAddress,
    ChainedShortener,
    SelfReferential,
}

impl UrlRejection {
    /// Stable reason code, safe to expose to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlRejection::Empty => "missing_url",
            UrlRejection::TooLong => "too_long",
            UrlRejection::MalformedUrl => "malformed_url",
            UrlRejection::DisallowedProtocol => "disallowed_protocol",
            UrlRejection::PrivateAddress => "private_address",
            UrlRejection::ChainedShortener => "chained_shortener",
            UrlRejection::SelfReferential => "self_referential",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            UrlRejection::Empty => "originalUrl is required",
            UrlRejection::TooLong => "URL exceeds the maximum length of 2048 characters",
            UrlRejection::MalformedUrl => "Invalid URL format",
            UrlRejection::DisallowedProtocol => "Only http and https URLs are allowed",
            UrlRejection::PrivateAddress => "URLs pointing to local or private addresses are not allowed",
            UrlRejection::ChainedShortener => "URLs from other link shorteners are not allowed",
            UrlRejection::SelfReferential => "URLs pointing to this service are not allowed",
        }
    }
}

impl Display for UrlRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(UrlRejection),
    #[error("invalid code: {0}")]
    InvalidCode(String),
    #[error("invalid report: {0}")]
    InvalidReport(String),
    #[error("resource already exists")]
    AlreadyExists,
    #[error("not found")]
    NotFound,
    #[error("failed to generate a unique code after {attempts} attempts")]
    UniquenessExhausted { attempts: u32 },
    #[error("repository error: {0}")]
    Repository(String),
}

impl CoreError {
    /// Stable reason code for client-facing error bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::InvalidUrl(r) => r.as_str(),
            CoreError::InvalidCode(_) => "invalid_code",
            CoreError::InvalidReport(_) => "invalid_report",
            CoreError::AlreadyExists => "conflict",
            CoreError::NotFound => "not_found",
            CoreError::UniquenessExhausted { .. } => "code_generation_failed",
            CoreError::Repository(_) => "internal",
        }
    }

    /// True for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidUrl(_) | CoreError::InvalidCode(_) | CoreError::InvalidReport(_)
        )
    }
}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - domain library loaded", pkg, ver)
}

pub mod adapters;
pub mod base62;
pub mod code;
pub mod redirect;
pub mod report;
pub mod service;
pub mod validate;
