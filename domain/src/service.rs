use tracing::{info, warn};

use crate::code::{generate_unique_code, MAX_ATTEMPTS};
use crate::redirect::{self, RedirectDecision, TrustPolicy};
use crate::report::validate_report;
use crate::validate::{validate_original_url, ValidatorConfig};
use crate::{
    Clock, CodeGenerator, CoreError, ReportNotice, ReportNotifier, ReportRecord, ShortenResult,
    UrlRecord, UrlStore,
};

/// Application service orchestrating shortening, redirect resolution and
/// report intake.
///
/// Generic over the store, code generator, clock and notifier so the whole
/// pipeline runs in tests against the in-memory store. It holds no mutable
/// state of its own; every call is bounded by its store round-trips.
pub struct ShortenerService<S: UrlStore, G: CodeGenerator, C: Clock, N: ReportNotifier> {
    store: S,
    generator: G,
    clock: C,
    notifier: N,
    validator: ValidatorConfig,
    trust: TrustPolicy,
}

impl<S: UrlStore, G: CodeGenerator, C: Clock, N: ReportNotifier> ShortenerService<S, G, C, N> {
    pub fn new(store: S, generator: G, clock: C, notifier: N) -> Self {
        Self {
            store,
            generator,
            clock,
            notifier,
            validator: ValidatorConfig::default(),
            trust: TrustPolicy::default(),
        }
    }

    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_trust_policy(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Shorten a URL, reusing the existing code when the same URL was seen
    /// before.
    ///
    /// The lookup and the insert are separate round-trips, so two concurrent
    /// submissions of one URL may both insert. Each then gets its own code;
    /// the store's uniqueness constraint keeps codes from being shared.
    pub fn shorten(&self, original_url: &str) -> Result<ShortenResult, CoreError> {
        let url = original_url.trim();
        validate_original_url(url, &self.validator).map_err(|reason| {
            warn!(reason = %reason, "url rejected");
            CoreError::InvalidUrl(reason)
        })?;

        if let Some(record) = self.store.find_by_url(url)? {
            info!(code = %record.code, "shorten hit existing code");
            return Ok(ShortenResult {
                record,
                already_existed: true,
            });
        }

        // A code that was free at check time can still lose the insert to a
        // concurrent writer. Both outcomes spend one draw from the same budget.
        let now = self.clock.now();
        let record = generate_unique_code(&self.generator, MAX_ATTEMPTS, |code| {
            if self.store.code_exists(&code)? {
                return Ok(None);
            }
            let record = UrlRecord::new(code, url.to_string(), now);
            match self.store.insert(&record) {
                Ok(()) => Ok(Some(record)),
                Err(CoreError::AlreadyExists) => {
                    warn!(code = %record.code, "insert lost code race, retrying");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })?;
        info!(code = %record.code, "shorten ok");
        Ok(ShortenResult {
            record,
            already_existed: false,
        })
    }

    /// Decide what a visit to `code` should produce.
    pub fn resolve(&self, code: &str, confirmed: bool) -> Result<RedirectDecision, CoreError> {
        redirect::resolve(&self.store, &self.trust, code, confirmed)
    }

    /// File an abuse report against an existing code.
    ///
    /// Operators are notified after the report is stored; a notifier failure
    /// is logged and does not fail the call.
    pub fn report(&self, code: &str, reason: &str) -> Result<ReportRecord, CoreError> {
        let valid = validate_report(code, reason)?;
        let record = self
            .store
            .find_by_code(&valid.code)?
            .ok_or(CoreError::NotFound)?;

        let report = ReportRecord {
            url_code: valid.code,
            reason: valid.reason,
            created_at: self.clock.now(),
        };
        self.store.add_report(&report)?;
        info!(code = %report.url_code, "report recorded");

        let notice = ReportNotice {
            code: report.url_code.clone(),
            target_url: record.original_url,
            reason: report.reason.clone(),
            reported_at: report.created_at,
        };
        if let Err(e) = self.notifier.notify(notice) {
            warn!(code = %report.url_code, err = %e, "report notification failed");
        }
        Ok(report)
    }

    /// Total number of shortened URLs.
    pub fn link_count(&self) -> Result<u64, CoreError> {
        self.store.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::InMemoryStore;
    use crate::code::tests::ScriptedGenerator;
    use crate::code::RandomCodeGenerator;
    use crate::redirect::WarningKind;
    use crate::{is_code_format, NoopNotifier, ShortCode, UrlRejection};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::SystemTime;

    struct TestClock;
    impl Clock for TestClock {
        fn now(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        seen: Arc<Mutex<Vec<ReportNotice>>>,
    }
    impl ReportNotifier for RecordingNotifier {
        fn notify(&self, notice: ReportNotice) -> Result<(), CoreError> {
            self.seen.lock().unwrap().push(notice);
            Ok(())
        }
    }

    struct FailingNotifier;
    impl ReportNotifier for FailingNotifier {
        fn notify(&self, _notice: ReportNotice) -> Result<(), CoreError> {
            Err(CoreError::Repository("smtp down".into()))
        }
    }

    /// Rejects the first `n` inserts as if another writer took the code.
    struct RacingStore {
        inner: InMemoryStore,
        lose: AtomicUsize,
    }
    impl UrlStore for RacingStore {
        fn find_by_url(&self, url: &str) -> Result<Option<UrlRecord>, CoreError> {
            self.inner.find_by_url(url)
        }
        fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlRecord>, CoreError> {
            self.inner.find_by_code(code)
        }
        fn code_exists(&self, code: &ShortCode) -> Result<bool, CoreError> {
            self.inner.code_exists(code)
        }
        fn insert(&self, record: &UrlRecord) -> Result<(), CoreError> {
            let left = self.lose.load(Ordering::SeqCst);
            if left > 0 {
                self.lose.store(left - 1, Ordering::SeqCst);
                return Err(CoreError::AlreadyExists);
            }
            self.inner.insert(record)
        }
        fn add_report(&self, report: &ReportRecord) -> Result<(), CoreError> {
            self.inner.add_report(report)
        }
        fn has_reports(&self, code: &ShortCode) -> Result<bool, CoreError> {
            self.inner.has_reports(code)
        }
        fn count(&self) -> Result<u64, CoreError> {
            self.inner.count()
        }
    }

    fn svc() -> ShortenerService<InMemoryStore, RandomCodeGenerator, TestClock, NoopNotifier> {
        ShortenerService::new(
            InMemoryStore::new(),
            RandomCodeGenerator::new(),
            TestClock,
            NoopNotifier,
        )
    }

    #[test]
    fn shorten_then_resolve() {
        let svc = svc();
        let res = svc.shorten("https://example.com/a/b?c=1").unwrap();
        assert!(!res.already_existed);
        assert!(is_code_format(res.record.code.as_str()));

        match svc.resolve(res.record.code.as_str(), false).unwrap() {
            RedirectDecision::Redirect { record, .. } => {
                assert_eq!(record.original_url, "https://example.com/a/b?c=1")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shorten_is_idempotent_per_url() {
        let svc = svc();
        let a = svc.shorten("https://example.com").unwrap();
        let b = svc.shorten("https://example.com").unwrap();
        let c = svc.shorten("  https://example.com ").unwrap();
        assert_eq!(a.record.code, b.record.code);
        assert_eq!(a.record.code, c.record.code);
        assert!(b.already_existed && c.already_existed);
        assert_eq!(svc.link_count().unwrap(), 1);
    }

    #[test]
    fn shorten_rejects_invalid_without_touching_store() {
        let svc = svc();
        let err = svc.shorten("http://127.0.0.1/x").unwrap_err();
        assert!(matches!(err, CoreError::InvalidUrl(UrlRejection::PrivateAddress)));
        assert_eq!(svc.link_count().unwrap(), 0);
    }

    #[test]
    fn shorten_skips_taken_codes() {
        let store = InMemoryStore::new();
        store
            .insert(&UrlRecord::new(
                ShortCode::new("taken1").unwrap(),
                "https://a.example".into(),
                SystemTime::UNIX_EPOCH,
            ))
            .unwrap();
        let svc = ShortenerService::new(
            store,
            ScriptedGenerator::new(&["taken1", "fresh1"]),
            TestClock,
            NoopNotifier,
        );
        let res = svc.shorten("https://b.example").unwrap();
        assert_eq!(res.record.code.as_str(), "fresh1");
    }

    #[test]
    fn shorten_fails_when_every_code_is_taken() {
        let store = InMemoryStore::new();
        store
            .insert(&UrlRecord::new(
                ShortCode::new("taken1").unwrap(),
                "https://a.example".into(),
                SystemTime::UNIX_EPOCH,
            ))
            .unwrap();
        let svc = ShortenerService::new(
            store,
            ScriptedGenerator::new(&["taken1"]),
            TestClock,
            NoopNotifier,
        );
        let err = svc.shorten("https://b.example").unwrap_err();
        assert!(matches!(err, CoreError::UniquenessExhausted { .. }));
        assert_eq!(svc.link_count().unwrap(), 1);
    }

    #[test]
    fn shorten_retries_lost_insert_race() {
        let store = RacingStore {
            inner: InMemoryStore::new(),
            lose: AtomicUsize::new(2),
        };
        let svc = ShortenerService::new(store, RandomCodeGenerator::new(), TestClock, NoopNotifier);
        let res = svc.shorten("https://example.com").unwrap();
        assert!(!res.already_existed);
        assert_eq!(svc.link_count().unwrap(), 1);
    }

    /// Counts draws so the attempt budget can be checked.
    struct CountingGenerator {
        inner: RandomCodeGenerator,
        draws: AtomicUsize,
    }
    impl CodeGenerator for CountingGenerator {
        fn next_code(&self) -> ShortCode {
            self.draws.fetch_add(1, Ordering::SeqCst);
            self.inner.next_code()
        }
    }

    #[test]
    fn lost_races_and_taken_codes_share_one_attempt_budget() {
        let store = RacingStore {
            inner: InMemoryStore::new(),
            lose: AtomicUsize::new(usize::MAX),
        };
        let generator = CountingGenerator {
            inner: RandomCodeGenerator::new(),
            draws: AtomicUsize::new(0),
        };
        let svc = ShortenerService::new(store, generator, TestClock, NoopNotifier);
        let err = svc.shorten("https://example.com").unwrap_err();
        assert!(matches!(err, CoreError::UniquenessExhausted { attempts: 5 }));
        assert_eq!(svc.generator.draws.load(Ordering::SeqCst), MAX_ATTEMPTS as usize);
        assert_eq!(svc.link_count().unwrap(), 0);
    }

    #[test]
    fn concurrent_shortens_get_distinct_codes() {
        const N: usize = 64;
        let svc = svc();
        let codes: Vec<ShortCode> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..N)
                .map(|i| {
                    let svc = &svc;
                    s.spawn(move || {
                        svc.shorten(&format!("https://example.com/{i}"))
                            .unwrap()
                            .record
                            .code
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let distinct: HashSet<_> = codes.into_iter().collect();
        assert_eq!(distinct.len(), N);
        assert_eq!(svc.link_count().unwrap(), N as u64);
    }

    #[test]
    fn report_flips_code_to_warning() {
        let notifier = RecordingNotifier::default();
        let svc = ShortenerService::new(
            InMemoryStore::new(),
            RandomCodeGenerator::new(),
            TestClock,
            notifier.clone(),
        );
        let code = svc.shorten("https://example.com").unwrap().record.code;
        let rep = svc.report(code.as_str(), "<b>phishing</b>").unwrap();
        assert_eq!(rep.reason, "&lt;b&gt;phishing&lt;/b&gt;");

        let d = svc.resolve(code.as_str(), false).unwrap();
        assert!(matches!(
            d,
            RedirectDecision::Warn {
                kind: WarningKind::Reported,
                ..
            }
        ));

        let seen = notifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].code, code);
        assert_eq!(seen[0].target_url, "https://example.com");
    }

    #[test]
    fn report_errors() {
        let svc = svc();
        assert!(matches!(
            svc.report("ZZZZZZ", "spam").unwrap_err(),
            CoreError::NotFound
        ));
        assert!(matches!(
            svc.report("bad", "spam").unwrap_err(),
            CoreError::InvalidCode(_)
        ));
        let code = svc.shorten("https://example.com").unwrap().record.code;
        assert!(matches!(
            svc.report(code.as_str(), "  ").unwrap_err(),
            CoreError::InvalidReport(_)
        ));
    }

    #[test]
    fn report_succeeds_when_notifier_fails() {
        let svc = ShortenerService::new(
            InMemoryStore::new(),
            RandomCodeGenerator::new(),
            TestClock,
            FailingNotifier,
        );
        let code = svc.shorten("https://example.com").unwrap().record.code;
        assert!(svc.report(code.as_str(), "spam").is_ok());
        assert!(svc.store().has_reports(&code).unwrap());
    }

    #[test]
    fn self_referential_uses_configured_domain() {
        let svc = svc().with_validator(ValidatorConfig::new(
            ["bit.ly"],
            Some("sho.rt".to_string()),
        ));
        assert!(matches!(
            svc.shorten("https://sho.rt/abc123").unwrap_err(),
            CoreError::InvalidUrl(UrlRejection::SelfReferential)
        ));
    }
}
