//! Redirect state machine.
//!
//! A code is in exactly one of four states when visited:
//! `Unknown` (no record), `Trusted` (record, no reports), `Reported`
//! (record, at least one report) or `ExternalUnconfirmed` (strict mode only,
//! target host outside the trusted list). The last two require a
//! confirmation round-trip; confirmation is a plain query flag and carries no
//! server-side state.

use url::Url;

use crate::validate::{host_matches, normalize_host};
use crate::{is_code_format, CoreError, ShortCode, UrlRecord, UrlStore};

/// Which hosts may be redirected to without a confirmation step.
#[derive(Clone, Debug, Default)]
pub struct TrustPolicy {
    /// When false, only reports trigger the warning page.
    pub strict_external: bool,
    /// Lower-cased hosts; subdomains are trusted too.
    pub trusted_hosts: Vec<String>,
}

impl TrustPolicy {
    pub fn new<I, S>(strict_external: bool, trusted_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            strict_external,
            trusted_hosts: trusted_hosts
                .into_iter()
                .map(|h| normalize_host(h.as_ref()))
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// True if `url` must go through the confirmation page under this policy.
    pub fn requires_confirmation(&self, url: &str) -> bool {
        if !self.strict_external {
            return false;
        }
        let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(normalize_host)) {
            Some(h) => h,
            // Unparseable targets are never trusted.
            None => return true,
        };
        !self.trusted_hosts.iter().any(|t| host_matches(&host, t))
    }
}

/// Why a warning page is shown instead of a redirect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarningKind {
    Reported,
    ExternalUnconfirmed,
}

/// Per-visit trust state of a code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Unknown,
    Trusted,
    Reported,
    ExternalUnconfirmed,
}

/// What the HTTP layer should do for one visit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectDecision {
    NotFound,
    Redirect { record: UrlRecord, state: LinkState },
    Warn { record: UrlRecord, kind: WarningKind },
}

/// Derive the state of a stored record. Reports take precedence over the
/// external-host rule.
pub fn classify(record: Option<&UrlRecord>, reported: bool, policy: &TrustPolicy) -> LinkState {
    match record {
        None => LinkState::Unknown,
        Some(_) if reported => LinkState::Reported,
        Some(r) if policy.requires_confirmation(&r.original_url) => LinkState::ExternalUnconfirmed,
        Some(_) => LinkState::Trusted,
    }
}

/// Decide the outcome of visiting `code`. `confirmed` is the caller-supplied
/// confirmation flag from the second request of the handshake.
pub fn resolve<S>(
    store: &S,
    policy: &TrustPolicy,
    code: &str,
    confirmed: bool,
) -> Result<RedirectDecision, CoreError>
where
    S: UrlStore + ?Sized,
{
    if !is_code_format(code) {
        return Ok(RedirectDecision::NotFound);
    }
    let code = ShortCode::new(code)?;
    let Some(record) = store.find_by_code(&code)? else {
        return Ok(RedirectDecision::NotFound);
    };
    let reported = store.has_reports(&code)?;
    let state = classify(Some(&record), reported, policy);
    let decision = match state {
        LinkState::Reported if !confirmed => RedirectDecision::Warn {
            record,
            kind: WarningKind::Reported,
        },
        LinkState::ExternalUnconfirmed if !confirmed => RedirectDecision::Warn {
            record,
            kind: WarningKind::ExternalUnconfirmed,
        },
        LinkState::Unknown => RedirectDecision::NotFound,
        state => RedirectDecision::Redirect { record, state },
    };
    Ok(decision)
}
