//! URL admission checks.
//!
//! Everything here is string-level: hostnames are never resolved, so a public
//! name that points at a private address passes. Treat this as a best-effort
//! filter in front of the store, not as an SSRF guarantee.

use std::net::Ipv4Addr;

use url::{Host, Url};

use crate::{UrlRejection, MAX_URL_LENGTH};

/// Shorteners refused by default so links cannot be chained through us.
pub const DEFAULT_BLOCKED_SHORTENERS: &[&str] = &[
    "bit.ly",
    "bitly.com",
    "tinyurl.com",
    "t.co",
    "goo.gl",
    "ow.ly",
    "is.gd",
    "buff.ly",
    "rebrand.ly",
    "cutt.ly",
    "shorturl.at",
    "tiny.cc",
    "bl.ink",
    "rb.gy",
    "v.gd",
    "t.ly",
];

/// Inputs to the admission check that vary per deployment.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Lower-cased shortener domains; subdomains are blocked too.
    pub blocked_shorteners: Vec<String>,
    /// Host the service itself is published under.
    pub own_domain: Option<String>,
}

impl ValidatorConfig {
    pub fn new<I, S>(blocked_shorteners: I, own_domain: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocked_shorteners: blocked_shorteners
                .into_iter()
                .map(|d| normalize_host(d.as_ref()))
                .filter(|d| !d.is_empty())
                .collect(),
            own_domain: own_domain
                .map(|d| normalize_host(&d))
                .filter(|d| !d.is_empty()),
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKED_SHORTENERS.iter(), None)
    }
}

/// Classify a candidate URL. Checks run in a fixed order and the first
/// failure wins. Surrounding whitespace is ignored.
pub fn validate_original_url(s: &str, cfg: &ValidatorConfig) -> Result<(), UrlRejection> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(UrlRejection::Empty);
    }
    if trimmed.chars().count() > MAX_URL_LENGTH {
        return Err(UrlRejection::TooLong);
    }

    let parsed = Url::parse(trimmed).map_err(|_| UrlRejection::MalformedUrl)?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(UrlRejection::DisallowedProtocol),
    }

    let host = match parsed.host() {
        Some(Host::Domain(d)) => normalize_host(d),
        Some(Host::Ipv4(addr)) => {
            if is_private_ipv4(addr) {
                return Err(UrlRejection::PrivateAddress);
            }
            addr.to_string()
        }
        // IPv6 literals are not screened.
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => return Err(UrlRejection::MalformedUrl),
    };

    if host == "localhost" {
        return Err(UrlRejection::PrivateAddress);
    }

    if cfg
        .blocked_shorteners
        .iter()
        .any(|d| host_matches(&host, d))
    {
        return Err(UrlRejection::ChainedShortener);
    }

    if let Some(own) = &cfg.own_domain {
        if host_matches(&host, own) {
            return Err(UrlRejection::SelfReferential);
        }
    }

    Ok(())
}

/// Loopback and RFC 1918 ranges: 127/8, 10/8, 172.16/12, 192.168/16.
pub fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    let [a, b, _, _] = addr.octets();
    a == 127 || a == 10 || (a == 192 && b == 168) || (a == 172 && (16..=31).contains(&b))
}

/// True when `host` equals `domain` or is one of its subdomains.
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Lower-case and drop a trailing root dot.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}
