//! # Violation Ledger
//!
//! Ordered, append-at-front storage of [`ViolationRecord`]s.
//!
//! - Ids come from a counter that only moves forward; a deleted id is never
//!   handed out again.
//! - The lifetime total and the count for the current UTC day are updated under
//!   the same lock as the collection, so readers never see one without the other.
//! - `record()` performs no content de-duplication. One call, one record.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::signal::SignalPhase;
use crate::models::violation::{ViolationCandidate, ViolationRecord, ViolationSource};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Aggregate counters, read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerCounters {
    /// Records ever stored this session. Deletions do not lower it.
    pub lifetime_total: u64,
    /// Stored records captured on the current UTC day.
    pub today: u64,
}

/// Result of a deletion request.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The record was present and is gone.
    Removed(Arc<ViolationRecord>),
    /// No record carried that id.
    NotFound,
}

/// Ledger change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerChange {
    /// A record was stored.
    Recorded(Arc<ViolationRecord>),
    /// A record was removed.
    Deleted(u64),
    /// A history batch of this many records was loaded.
    HistoryLoaded(usize),
}

/// Filter predicates. Unset fields match everything; set fields combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationFilter {
    /// Case-insensitive plate substring.
    pub plate: Option<String>,
    /// Phase at capture.
    pub phase: Option<SignalPhase>,
    /// Case-insensitive vehicle class.
    pub vehicle_type: Option<String>,
    /// UTC capture day.
    pub date: Option<NaiveDate>,
}

impl ViolationFilter {
    /// Whether `record` satisfies every set predicate.
    pub fn matches(&self, record: &ViolationRecord) -> bool {
        if let Some(plate) = self.plate.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            if !record.plate.contains(&plate.to_uppercase()) {
                return false;
            }
        }
        if let Some(phase) = self.phase {
            if record.phase != phase {
                return false;
            }
        }
        if let Some(kind) = self.vehicle_type.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            if !record.vehicle_type.eq_ignore_ascii_case(kind) {
                return false;
            }
        }
        if let Some(date) = self.date {
            if record.date() != Some(date) {
                return false;
            }
        }
        true
    }
}

/// One page of a view.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// The page actually served, 1-based, after clamping.
    pub number: usize,
    /// Page count; at least 1 even for an empty view.
    pub total_pages: usize,
    /// Length of the whole view.
    pub total_items: usize,
}

/// Slices `view` into pages of `size` and returns page `number`.
///
/// `number` is clamped into `1..=total_pages` and a `size` of zero is treated as
/// one, so out-of-range input never fails.
pub fn page<T: Clone>(view: &[T], size: usize, number: usize) -> Page<T> {
    let size = size.max(1);
    let total_pages = view.len().div_ceil(size).max(1);
    let number = number.clamp(1, total_pages);
    let start = (number - 1) * size;
    let end = (start + size).min(view.len());
    Page {
        items: view.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
        number,
        total_pages,
        total_items: view.len(),
    }
}

struct LedgerState {
    records: VecDeque<Arc<ViolationRecord>>,
    next_id: u64,
    lifetime_total: u64,
    today: u64,
    today_date: NaiveDate,
}

impl LedgerState {
    fn recount_today(&mut self, date: NaiveDate) {
        self.today_date = date;
        self.today = self.records.iter().filter(|r| r.date() == Some(date)).count() as u64;
    }

    fn roll_over(&mut self, date: NaiveDate) {
        if date != self.today_date {
            log::info!("Calendar day rolled over to {}; recounting today's violations.", date);
            self.recount_today(date);
        }
    }

    fn insert(&mut self, candidate: ViolationCandidate, source: ViolationSource, now: DateTime<Utc>) -> Arc<ViolationRecord> {
        self.roll_over(now.date_naive());
        let id = self.next_id;
        self.next_id += 1;
        let record = Arc::new(ViolationRecord::from_candidate(id, candidate, source, now.timestamp()));
        if record.date() == Some(self.today_date) {
            self.today += 1;
        }
        self.lifetime_total += 1;
        self.records.push_front(record.clone());
        record
    }
}

/// The ledger.
pub struct ViolationLedger {
    state: Mutex<LedgerState>,
    changes: broadcast::Sender<LedgerChange>,
    clock: Clock,
}

impl Default for ViolationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationLedger {
    /// An empty ledger on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// An empty ledger reading "now" from `clock`.
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        let (changes, _) = broadcast::channel(256);
        let today_date = clock().date_naive();
        Self {
            state: Mutex::new(LedgerState {
                records: VecDeque::new(),
                next_id: 1,
                lifetime_total: 0,
                today: 0,
                today_date,
            }),
            changes,
            clock: Box::new(clock),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerChange> {
        self.changes.subscribe()
    }

    /// Stores `candidate` at the front and returns the stored record.
    pub fn record(&self, candidate: ViolationCandidate, source: ViolationSource) -> Arc<ViolationRecord> {
        let now = (self.clock)();
        let record = self.lock().insert(candidate, source, now);
        log::info!(
            "Violation #{} recorded: {} {} at {} ({:?}).",
            record.id,
            record.plate,
            record.vehicle_type,
            record.camera,
            record.source
        );
        let _ = self.changes.send(LedgerChange::Recorded(record.clone()));
        record
    }

    /// Loads a history batch given newest-first.
    ///
    /// Records are inserted oldest-first, so the ledger ends newest-first with ids
    /// increasing with recency. Returns the number loaded.
    pub fn load_history(&self, candidates: Vec<ViolationCandidate>) -> usize {
        let now = (self.clock)();
        let count = candidates.len();
        {
            let mut state = self.lock();
            for candidate in candidates.into_iter().rev() {
                state.insert(candidate, ViolationSource::Server, now);
            }
        }
        log::info!("Loaded {} historical violation(s).", count);
        let _ = self.changes.send(LedgerChange::HistoryLoaded(count));
        count
    }

    /// Removes record `id`. Absent ids are reported, not treated as errors.
    pub fn delete(&self, id: u64) -> DeleteOutcome {
        let today = (self.clock)().date_naive();
        let removed = {
            let mut state = self.lock();
            let removed = state
                .records
                .iter()
                .position(|r| r.id == id)
                .and_then(|pos| state.records.remove(pos));
            if removed.is_some() {
                state.recount_today(today);
            }
            removed
        };

        match removed {
            Some(record) => {
                log::info!("Violation #{} ({}) deleted.", id, record.plate);
                let _ = self.changes.send(LedgerChange::Deleted(id));
                DeleteOutcome::Removed(record)
            }
            None => {
                log::warn!("Delete requested for unknown violation #{}.", id);
                DeleteOutcome::NotFound
            }
        }
    }

    /// Lifetime and current-day counts.
    pub fn counters(&self) -> LedgerCounters {
        let today = (self.clock)().date_naive();
        let mut state = self.lock();
        state.roll_over(today);
        LedgerCounters { lifetime_total: state.lifetime_total, today: state.today }
    }

    /// The record with `id`, if stored.
    pub fn get(&self, id: u64) -> Option<Arc<ViolationRecord>> {
        self.lock().records.iter().find(|r| r.id == id).cloned()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether the ledger holds no records.
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Every record, most recent first.
    pub fn all(&self) -> Vec<Arc<ViolationRecord>> {
        self.lock().records.iter().cloned().collect()
    }

    /// Records satisfying `filter`, most recent first. The ledger is not touched.
    pub fn filter(&self, filter: &ViolationFilter) -> Vec<Arc<ViolationRecord>> {
        self.lock().records.iter().filter(|r| filter.matches(r)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, Ordering};

    const DAY: i64 = 86_400;
    // 2024-03-10 12:00:00 UTC
    const NOON: i64 = 1_710_072_000;

    fn candidate(plate: &str, ts: Option<f64>) -> ViolationCandidate {
        ViolationCandidate {
            plate: plate.to_string(),
            vehicle_type: "motorbike".to_string(),
            timestamp: ts,
            ..Default::default()
        }
    }

    fn fixed_ledger(now: Arc<AtomicI64>) -> ViolationLedger {
        ViolationLedger::with_clock(move || {
            Utc.timestamp_opt(now.load(Ordering::SeqCst), 0).single().unwrap_or_default()
        })
    }

    #[test]
    fn test_ids_strictly_increase_regardless_of_timestamps() {
        let ledger = fixed_ledger(Arc::new(AtomicI64::new(NOON)));
        let stamps = [NOON - 10, NOON - 5000, NOON + 30, NOON - 1];
        let ids: Vec<u64> = stamps
            .iter()
            .map(|ts| ledger.record(candidate("51B-12345", Some(*ts as f64)), ViolationSource::Server).id)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        // Most-recent-first by insertion, not by timestamp.
        let order: Vec<u64> = ledger.all().iter().map(|r| r.id).collect();
        assert_eq!(order, ids.iter().rev().copied().collect::<Vec<_>>());
    }

    #[test]
    fn test_no_content_dedup() {
        let ledger = fixed_ledger(Arc::new(AtomicI64::new(NOON)));
        let a = ledger.record(candidate("30F-99001", Some(NOON as f64)), ViolationSource::Demo);
        let b = ledger.record(candidate("30F-99001", Some(NOON as f64)), ViolationSource::Demo);
        assert_ne!(a.id, b.id);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_delete_is_idempotent_and_ids_not_reused() {
        let ledger = fixed_ledger(Arc::new(AtomicI64::new(NOON)));
        let first = ledger.record(candidate("A", None), ViolationSource::Operator);
        ledger.record(candidate("B", None), ViolationSource::Operator);

        assert!(matches!(ledger.delete(first.id), DeleteOutcome::Removed(r) if r.plate == "A"));
        assert_eq!(ledger.delete(first.id), DeleteOutcome::NotFound);

        let next = ledger.record(candidate("C", None), ViolationSource::Operator);
        assert_eq!(next.id, 3);
        assert!(ledger.get(first.id).is_none());
    }

    #[test]
    fn test_counters_move_together_and_recount_on_delete() {
        let ledger = fixed_ledger(Arc::new(AtomicI64::new(NOON)));
        let today = ledger.record(candidate("A", Some(NOON as f64 - 60.0)), ViolationSource::Server);
        ledger.record(candidate("B", Some((NOON - DAY) as f64)), ViolationSource::Server);
        ledger.record(candidate("C", None), ViolationSource::Server);

        assert_eq!(ledger.counters(), LedgerCounters { lifetime_total: 3, today: 2 });
        ledger.delete(today.id);
        assert_eq!(ledger.counters(), LedgerCounters { lifetime_total: 3, today: 1 });
    }

    #[test]
    fn test_day_rollover_recounts() {
        let now = Arc::new(AtomicI64::new(NOON));
        let ledger = fixed_ledger(now.clone());
        ledger.record(candidate("A", None), ViolationSource::Demo);
        assert_eq!(ledger.counters().today, 1);

        now.store(NOON + DAY, Ordering::SeqCst);
        assert_eq!(ledger.counters().today, 0);
        ledger.record(candidate("B", None), ViolationSource::Demo);
        assert_eq!(ledger.counters(), LedgerCounters { lifetime_total: 2, today: 1 });
    }

    #[test]
    fn test_load_history_orders_newest_first() {
        let ledger = fixed_ledger(Arc::new(AtomicI64::new(NOON)));
        let mut rx = ledger.subscribe();
        let history = vec![
            candidate("NEWEST", Some(NOON as f64 - 10.0)),
            candidate("MIDDLE", Some(NOON as f64 - 20.0)),
            candidate("OLDEST", Some(NOON as f64 - 30.0)),
        ];
        assert_eq!(ledger.load_history(history), 3);

        let all = ledger.all();
        assert_eq!(all.iter().map(|r| r.plate.as_str()).collect::<Vec<_>>(), ["NEWEST", "MIDDLE", "OLDEST"]);
        assert!(all[0].id > all[2].id);
        assert_eq!(rx.try_recv().unwrap(), LedgerChange::HistoryLoaded(3));
    }

    #[test]
    fn test_filter_combines_with_and() {
        let ledger = fixed_ledger(Arc::new(AtomicI64::new(NOON)));
        ledger.record(candidate("51B-12345", Some(NOON as f64)), ViolationSource::Server);
        ledger.record(
            ViolationCandidate { vehicle_type: "car".into(), ..candidate("51G-22334", Some(NOON as f64)) },
            ViolationSource::Server,
        );
        ledger.record(
            ViolationCandidate { phase: Some(SignalPhase::Yellow), ..candidate("51B-99999", Some(NOON as f64)) },
            ViolationSource::Server,
        );
        ledger.record(candidate("51B-00001", Some((NOON - DAY) as f64)), ViolationSource::Server);

        let by_plate = ViolationFilter { plate: Some("51b".into()), ..Default::default() };
        assert_eq!(ledger.filter(&by_plate).len(), 3);

        let combined = ViolationFilter {
            plate: Some("51".into()),
            phase: Some(SignalPhase::Red),
            vehicle_type: Some("MOTORBIKE".into()),
            date: Utc.timestamp_opt(NOON, 0).single().map(|d| d.date_naive()),
        };
        let hits = ledger.filter(&combined);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].plate, "51B-12345");
        assert_eq!(ledger.len(), 4);
    }

    #[test]
    fn test_page_clamps() {
        let view: Vec<u32> = (1..=7).collect();
        let p = page(&view, 3, 2);
        assert_eq!(p.items, vec![4, 5, 6]);
        assert_eq!(p.total_pages, 3);

        let last = page(&view, 3, 99);
        assert_eq!((last.number, last.items), (3, vec![7]));

        let first = page(&view, 3, 0);
        assert_eq!((first.number, first.items), (1, vec![1, 2, 3]));

        let empty = page::<u32>(&[], 10, 5);
        assert_eq!((empty.number, empty.total_pages, empty.items.len()), (1, 1, 0));
    }
}
