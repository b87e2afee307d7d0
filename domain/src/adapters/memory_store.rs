use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::{CoreError, ReportRecord, ShortCode, UrlRecord, UrlStore};

#[derive(Default)]
struct Tables {
    urls: BTreeMap<String, UrlRecord>,
    /// original_url -> code of the first record stored for it
    by_url: HashMap<String, String>,
    reports: Vec<ReportRecord>,
}

/// In-memory store. A single mutex guards all tables, so code uniqueness is
/// enforced at insert time just like the SQLite constraint.
pub struct InMemoryStore {
    inner: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, CoreError> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlStore for InMemoryStore {
    fn find_by_url(&self, url: &str) -> Result<Option<UrlRecord>, CoreError> {
        let t = self.lock()?;
        Ok(t.by_url.get(url).and_then(|code| t.urls.get(code)).cloned())
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlRecord>, CoreError> {
        let t = self.lock()?;
        Ok(t.urls.get(code.as_str()).cloned())
    }

    fn code_exists(&self, code: &ShortCode) -> Result<bool, CoreError> {
        let t = self.lock()?;
        Ok(t.urls.contains_key(code.as_str()))
    }

    fn insert(&self, record: &UrlRecord) -> Result<(), CoreError> {
        let mut t = self.lock()?;
        let key = record.code.as_str().to_string();
        if t.urls.contains_key(&key) {
            return Err(CoreError::AlreadyExists);
        }
        t.by_url
            .entry(record.original_url.clone())
            .or_insert_with(|| key.clone());
        t.urls.insert(key, record.clone());
        Ok(())
    }

    fn add_report(&self, report: &ReportRecord) -> Result<(), CoreError> {
        let mut t = self.lock()?;
        if !t.urls.contains_key(report.url_code.as_str()) {
            return Err(CoreError::NotFound);
        }
        t.reports.push(report.clone());
        Ok(())
    }

    fn has_reports(&self, code: &ShortCode) -> Result<bool, CoreError> {
        let t = self.lock()?;
        Ok(t.reports.iter().any(|r| r.url_code == *code))
    }

    fn count(&self) -> Result<u64, CoreError> {
        let t = self.lock()?;
        Ok(t.urls.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn rec(code: &str, url: &str) -> UrlRecord {
        UrlRecord::new(ShortCode::new(code).unwrap(), url.into(), SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn insert_and_lookup_both_ways() {
        let store = InMemoryStore::new();
        store.insert(&rec("abc123", "https://e.com")).unwrap();
        let code = ShortCode::new("abc123").unwrap();
        assert!(store.code_exists(&code).unwrap());
        assert_eq!(
            store.find_by_code(&code).unwrap().unwrap().original_url,
            "https://e.com"
        );
        assert_eq!(
            store.find_by_url("https://e.com").unwrap().unwrap().code,
            code
        );
        assert!(store.find_by_url("https://other.com").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn duplicate_code_is_rejected() {
        let store = InMemoryStore::new();
        store.insert(&rec("abc123", "https://one")).unwrap();
        let err = store.insert(&rec("abc123", "https://two")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn same_url_twice_keeps_first_code_for_lookup() {
        let store = InMemoryStore::new();
        store.insert(&rec("first1", "https://e.com")).unwrap();
        store.insert(&rec("secnd2", "https://e.com")).unwrap();
        assert_eq!(
            store.find_by_url("https://e.com").unwrap().unwrap().code.as_str(),
            "first1"
        );
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn reports_require_existing_code() {
        let store = InMemoryStore::new();
        let code = ShortCode::new("abc123").unwrap();
        let report = ReportRecord {
            url_code: code.clone(),
            reason: "spam".into(),
            created_at: SystemTime::UNIX_EPOCH,
        };
        assert!(matches!(
            store.add_report(&report).unwrap_err(),
            CoreError::NotFound
        ));

        store.insert(&rec("abc123", "https://e.com")).unwrap();
        assert!(!store.has_reports(&code).unwrap());
        store.add_report(&report).unwrap();
        store.add_report(&report).unwrap();
        assert!(store.has_reports(&code).unwrap());
        assert_eq!(store.lock().unwrap().reports.len(), 2);
    }
}
