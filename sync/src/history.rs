use std::any::{type_name, Any, TypeId};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::types::SyncId;

/// Retention cap for one tracker. Aging only begins once a tracker holds
/// more than this many snapshots, so short bursts never trigger pruning.
pub const MAX_HISTORY_ENTRIES: usize = 64;

/// Errors from snapshot storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// A key was offered a value of a different type than it has always
    /// stored. A sync key keeps one value type for its lifetime.
    #[error("history stores `{expected}` but was offered `{found}`. A sync key keeps one value type for its lifetime")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

struct HistoryEntry {
    id: SyncId,
    value: Box<dyn Any + Send>,
    entered: Instant,
}

/// Snapshot history for one sync key and one direction of one peer.
///
/// Entries are kept sorted by id, which is also arrival order: ids are
/// allocated sequentially on the sending side and stored in wire order on
/// the receiving side. The acknowledgment watermark marks the most recent
/// snapshot both sides hold, which is the baseline for the next delta.
pub struct DeltaHistory {
    entries: Vec<HistoryEntry>,
    next_id: SyncId,
    acked: SyncId,
    cleaned_below: SyncId,
    value_type: TypeId,
    value_type_name: &'static str,
}

impl DeltaHistory {
    pub fn new<T: Any + Send>() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            acked: 0,
            cleaned_below: 0,
            value_type: TypeId::of::<T>(),
            value_type_name: type_name::<T>(),
        }
    }

    /// The type this tracker stores, fixed at creation.
    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    pub fn value_type_name(&self) -> &'static str {
        self.value_type_name
    }

    /// Allocates the next snapshot id. Ids start at 1 and never repeat; 0
    /// stays reserved for the zero baseline.
    pub fn alloc_id(&mut self) -> SyncId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Stores a snapshot under `id`, keeping entries sorted. Returns the
    /// value previously stored under the same id, if any.
    pub fn store<T: Any + Send>(
        &mut self,
        id: SyncId,
        value: T,
        now: &Instant,
    ) -> Result<Option<Box<dyn Any + Send>>, HistoryError> {
        if TypeId::of::<T>() != self.value_type {
            return Err(HistoryError::TypeMismatch {
                expected: self.value_type_name,
                found: type_name::<T>(),
            });
        }
        let entry = HistoryEntry {
            id,
            value: Box::new(value),
            entered: *now,
        };
        match self.entries.binary_search_by(|candidate| candidate.id.cmp(&id)) {
            Ok(index) => {
                let previous = std::mem::replace(&mut self.entries[index], entry);
                Ok(Some(previous.value))
            }
            Err(index) => {
                self.entries.insert(index, entry);
                Ok(None)
            }
        }
    }

    /// The snapshot stored under `id`.
    pub fn get(&self, id: SyncId) -> Option<&(dyn Any + Send)> {
        self.entries
            .binary_search_by(|candidate| candidate.id.cmp(&id))
            .ok()
            .map(|index| self.entries[index].value.as_ref())
    }

    /// The acknowledged snapshot to delta against, or `None` when nothing
    /// has been acknowledged yet or the acknowledged snapshot has aged out.
    pub fn baseline(&self) -> Option<(SyncId, &(dyn Any + Send))> {
        if self.acked == 0 {
            return None;
        }
        self.get(self.acked).map(|value| (self.acked, value))
    }

    /// Raises the acknowledgment watermark to `id`. Returns false for ids
    /// this side never allocated, which are ignored; acknowledgments may
    /// arrive out of order, so an id at or below the watermark is accepted
    /// but changes nothing.
    pub fn validate_id(&mut self, id: SyncId) -> bool {
        if id >= self.next_id {
            return false;
        }
        if id > self.acked {
            self.acked = id;
        }
        true
    }

    pub fn acked(&self) -> SyncId {
        self.acked
    }

    /// Discards snapshots older than `max_age`, returning the evicted
    /// values for disposal. Does nothing until the tracker holds more than
    /// [`MAX_HISTORY_ENTRIES`] snapshots. The acknowledgment watermark is
    /// not protected: a stale acknowledged snapshot ages out too, and the
    /// next write falls back to the zero baseline.
    pub fn cleanup_by_age(
        &mut self,
        max_age: Duration,
        now: &Instant,
    ) -> Vec<Box<dyn Any + Send>> {
        if self.entries.len() <= MAX_HISTORY_ENTRIES {
            return Vec::new();
        }
        let cutoff = self
            .entries
            .partition_point(|entry| now.saturating_duration_since(entry.entered) > max_age);
        if cutoff == 0 {
            return Vec::new();
        }
        let evicted = self
            .entries
            .drain(..cutoff)
            .map(|entry| entry.value)
            .collect();
        if let Some(first) = self.entries.first() {
            if first.id > self.cleaned_below {
                self.cleaned_below = first.id;
            }
        }
        evicted
    }

    /// Discards snapshots with ids below `up_to`, returning the evicted
    /// values for disposal. Idempotent: repeating an acknowledgment that
    /// was already cleaned removes nothing.
    pub fn cleanup_by_ack_id(&mut self, up_to: SyncId) -> Vec<Box<dyn Any + Send>> {
        if up_to <= self.cleaned_below {
            return Vec::new();
        }
        self.cleaned_below = up_to;
        let cutoff = self.entries.partition_point(|entry| entry.id < up_to);
        self.entries
            .drain(..cutoff)
            .map(|entry| entry.value)
            .collect()
    }

    /// Empties the tracker, returning every stored value for disposal.
    pub fn drain_all(&mut self) -> Vec<Box<dyn Any + Send>> {
        self.entries.drain(..).map(|entry| entry.value).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The oldest retained id, which bounds what the other side may still
    /// be asked to delta from.
    pub fn oldest_id(&self) -> Option<SyncId> {
        self.entries.first().map(|entry| entry.id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SyncId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(count: u64, base: &Instant) -> DeltaHistory {
        let mut history = DeltaHistory::new::<u32>();
        for second in 1..=count {
            let id = history.alloc_id();
            assert_eq!(id, second);
            let entered = *base + Duration::from_secs(second);
            history.store(id, second as u32, &entered).unwrap();
        }
        history
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut history = DeltaHistory::new::<u32>();
        assert_eq!(history.alloc_id(), 1);
        assert_eq!(history.alloc_id(), 2);
        assert_eq!(history.alloc_id(), 3);
    }

    #[test]
    fn baseline_follows_the_watermark() {
        let base = Instant::now();
        let mut history = filled(5, &base);
        assert!(history.baseline().is_none());

        assert!(history.validate_id(3));
        let (id, value) = history.baseline().unwrap();
        assert_eq!(id, 3);
        assert_eq!(*value.downcast_ref::<u32>().unwrap(), 3);

        // acknowledgments arriving out of order never lower the watermark
        assert!(history.validate_id(2));
        assert_eq!(history.acked(), 3);

        // an id this side never allocated is rejected
        assert!(!history.validate_id(99));
        assert_eq!(history.acked(), 3);
    }

    #[test]
    fn storing_a_different_type_errors() {
        let base = Instant::now();
        let mut history = DeltaHistory::new::<u32>();
        let result = history.store(1, String::from("wrong"), &base);
        assert!(matches!(
            result,
            Err(HistoryError::TypeMismatch { expected, found })
                if expected.contains("u32") && found.contains("String")
        ));
    }

    #[test]
    fn restoring_an_id_returns_the_displaced_value() {
        let base = Instant::now();
        let mut history = DeltaHistory::new::<u32>();
        history.store(1, 10u32, &base).unwrap();
        let displaced = history.store(1, 11u32, &base).unwrap().unwrap();
        assert_eq!(*displaced.downcast::<u32>().unwrap(), 10);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn age_cleanup_waits_for_the_cap() {
        let base = Instant::now();
        let mut history = filled(64, &base);
        let now = base + Duration::from_secs(1_000_000);
        assert!(history.cleanup_by_age(Duration::from_secs(1), &now).is_empty());
        assert_eq!(history.len(), 64);
    }

    #[test]
    fn age_cleanup_keeps_the_young_tail() {
        let base = Instant::now();
        let mut history = filled(100, &base);

        let now = base + Duration::from_secs(101);
        let evicted = history.cleanup_by_age(Duration::from_secs(64), &now);
        assert_eq!(evicted.len(), 36);
        assert_eq!(history.oldest_id(), Some(37));
        assert_eq!(history.len(), 64);
        assert_eq!(history.ids().last(), Some(100));
    }

    #[test]
    fn ack_cleanup_discards_below_and_repeats_are_noops() {
        let base = Instant::now();
        let mut history = filled(100, &base);

        assert!(history.validate_id(40));
        let evicted = history.cleanup_by_ack_id(40);
        assert_eq!(evicted.len(), 39);
        assert_eq!(history.oldest_id(), Some(40));

        assert!(history.cleanup_by_ack_id(40).is_empty());
        assert!(history.cleanup_by_ack_id(12).is_empty());
        assert_eq!(history.len(), 61);
    }

    #[test]
    fn drain_returns_everything() {
        let base = Instant::now();
        let mut history = filled(7, &base);
        assert_eq!(history.drain_all().len(), 7);
        assert!(history.is_empty());
    }
}
