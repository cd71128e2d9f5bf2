//! In-memory sheet service.
//!
//! Behaves like a remote spreadsheet backend: every slice has an ordered row
//! list, a revision counter bumped on each change, and a per-record
//! modification time. Failures can be injected per slice.

use async_trait::async_trait;
use bizdash_core::{
    BizdashError, Clock, Fields, RemoteRow, RemoteSlice, Result, SheetService, SystemClock,
    Timestamp,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Failure to return for a slice instead of serving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Unavailable,
    Unauthorized,
}

#[derive(Debug, Default, Clone)]
struct Sheet {
    rows: Vec<RemoteRow>,
    revision: u64,
    modified_at: BTreeMap<String, Timestamp>,
}

impl Sheet {
    fn to_remote(&self) -> RemoteSlice {
        RemoteSlice {
            rows: self.rows.clone(),
            revision: format!("rev-{}", self.revision),
            per_record_modified_at: self.modified_at.clone(),
        }
    }
}

/// Sheet backend held entirely in memory.
pub struct InMemorySheetService {
    sheets: Mutex<HashMap<String, Sheet>>,
    failures: Mutex<HashMap<String, InjectedFailure>>,
    clock: Arc<dyn Clock>,
    fetches: AtomicUsize,
    pushes: AtomicUsize,
}

impl InMemorySheetService {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Uses `clock` to stamp records written through `push_slice`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sheets: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            clock,
            fetches: AtomicUsize::new(0),
            pushes: AtomicUsize::new(0),
        }
    }

    fn sheets(&self) -> MutexGuard<'_, HashMap<String, Sheet>> {
        self.sheets.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn failures(&self) -> MutexGuard<'_, HashMap<String, InjectedFailure>> {
        self.failures.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Writes one record as if another collaborator edited the sheet at `at`.
    pub fn put_record(&self, slice: &str, key: &str, fields: Fields, at: Timestamp) {
        let mut sheets = self.sheets();
        let sheet = sheets.entry(slice.to_string()).or_default();
        match sheet.rows.iter_mut().find(|r| r.key == key) {
            Some(row) => row.fields = fields,
            None => sheet.rows.push(RemoteRow::new(key, fields)),
        }
        sheet.modified_at.insert(key.to_string(), at);
        sheet.revision += 1;
    }

    /// Removes one record from the sheet.
    pub fn remove_record(&self, slice: &str, key: &str) {
        let mut sheets = self.sheets();
        if let Some(sheet) = sheets.get_mut(slice) {
            let before = sheet.rows.len();
            sheet.rows.retain(|r| r.key != key);
            sheet.modified_at.remove(key);
            if sheet.rows.len() != before {
                sheet.revision += 1;
            }
        }
    }

    /// Current rows of a sheet.
    pub fn rows(&self, slice: &str) -> Vec<RemoteRow> {
        self.sheets()
            .get(slice)
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }

    pub fn revision(&self, slice: &str) -> String {
        format!("rev-{}", self.sheets().get(slice).map_or(0, |s| s.revision))
    }

    /// Makes every call for `slice` fail until cleared.
    pub fn inject_failure(&self, slice: &str, failure: InjectedFailure) {
        self.failures().insert(slice.to_string(), failure);
    }

    pub fn clear_failure(&self, slice: &str) {
        self.failures().remove(slice);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn check_failure(&self, slice: &str) -> Result<()> {
        match self.failures().get(slice) {
            Some(InjectedFailure::Unavailable) => Err(BizdashError::service_unavailable(
                slice,
                "HTTP 503: sheet backend unavailable",
            )),
            Some(InjectedFailure::Unauthorized) => Err(BizdashError::auth_failure(
                slice,
                "HTTP 401: token rejected",
            )),
            None => Ok(()),
        }
    }
}

impl Default for InMemorySheetService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SheetService for InMemorySheetService {
    async fn fetch_slice(&self, name: &str) -> Result<RemoteSlice> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_failure(name)?;
        Ok(self
            .sheets()
            .get(name)
            .map(Sheet::to_remote)
            .unwrap_or_else(|| Sheet::default().to_remote()))
    }

    async fn push_slice(&self, name: &str, rows: &[RemoteRow]) -> Result<String> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.check_failure(name)?;

        let now = self.clock.now();
        let mut sheets = self.sheets();
        let sheet = sheets.entry(name.to_string()).or_default();

        let mut modified_at = BTreeMap::new();
        for row in rows {
            let unchanged = sheet
                .rows
                .iter()
                .any(|existing| existing.key == row.key && existing.fields == row.fields);
            let stamp = match sheet.modified_at.get(&row.key) {
                Some(prev) if unchanged => *prev,
                _ => now,
            };
            modified_at.insert(row.key.clone(), stamp);
        }

        sheet.rows = rows.to_vec();
        sheet.modified_at = modified_at;
        sheet.revision += 1;
        Ok(format!("rev-{}", sheet.revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdash_core::clock::timestamp_secs;
    use bizdash_core::ManualClock;
    use serde_json::json;

    fn amount(value: i64) -> Fields {
        let mut fields = Fields::new();
        fields.insert("amount".to_string(), json!(value));
        fields
    }

    #[tokio::test]
    async fn test_unknown_sheet_is_empty() {
        let service = InMemorySheetService::new();
        let remote = service.fetch_slice("revenue").await.unwrap();
        assert!(remote.rows.is_empty());
        assert_eq!(remote.revision, "rev-0");
    }

    #[tokio::test]
    async fn test_put_record_bumps_revision() {
        let service = InMemorySheetService::new();
        service.put_record("expenses", "e1", amount(10), timestamp_secs(3));

        let remote = service.fetch_slice("expenses").await.unwrap();
        assert_eq!(remote.revision, "rev-1");
        assert_eq!(remote.per_record_modified_at.get("e1"), Some(&timestamp_secs(3)));
    }

    #[tokio::test]
    async fn test_push_stamps_only_changed_rows() {
        let clock = Arc::new(ManualClock::at_secs(100));
        let service = InMemorySheetService::with_clock(clock.clone());
        service.put_record("hr", "a", amount(1), timestamp_secs(5));
        service.put_record("hr", "b", amount(2), timestamp_secs(6));

        let rows = vec![RemoteRow::new("a", amount(1)), RemoteRow::new("b", amount(20))];
        let revision = service.push_slice("hr", &rows).await.unwrap();
        assert_eq!(revision, "rev-3");

        let remote = service.fetch_slice("hr").await.unwrap();
        assert_eq!(remote.per_record_modified_at.get("a"), Some(&timestamp_secs(5)));
        assert_eq!(remote.per_record_modified_at.get("b"), Some(&timestamp_secs(100)));
        assert_eq!(service.push_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let service = InMemorySheetService::new();
        service.inject_failure("okrs", InjectedFailure::Unauthorized);
        assert!(service.fetch_slice("okrs").await.unwrap_err().is_auth_failure());

        service.inject_failure("okrs", InjectedFailure::Unavailable);
        assert!(service.fetch_slice("okrs").await.unwrap_err().is_retryable());

        service.clear_failure("okrs");
        assert!(service.fetch_slice("okrs").await.is_ok());
    }
}
