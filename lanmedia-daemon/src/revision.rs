//! Catalog revision tracker.
//!
//! The revision (UPnP `SystemUpdateID`) advances by exactly one per poll in
//! which the catalog's cumulative mutation counter moved, however many
//! mutations happened in between.

use std::sync::Arc;

use lanmedia_catalog::Catalog;

use crate::events::Eventing;

/// Source of a cumulative, lock-free mutation count.
pub trait ChangeCounter {
    fn total_changes(&self) -> u64;
}

impl ChangeCounter for Catalog {
    fn total_changes(&self) -> u64 {
        Catalog::total_changes(self)
    }
}

impl<T: ChangeCounter + ?Sized> ChangeCounter for Arc<T> {
    fn total_changes(&self) -> u64 {
        (**self).total_changes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionTracker {
    update_id: u32,
    last_changes: u64,
}

impl RevisionTracker {
    /// Start from the persisted revision and the last counter value seen.
    pub fn new(update_id: u32, last_changes: u64) -> Self {
        Self {
            update_id,
            last_changes,
        }
    }

    pub fn update_id(&self) -> u32 {
        self.update_id
    }

    /// Read the counter; on change, advance the revision by one and notify
    /// `events` once. Returns whether the revision advanced.
    pub fn poll_and_maybe_advance<C, E>(&mut self, counter: &C, events: &mut E) -> bool
    where
        C: ChangeCounter + ?Sized,
        E: Eventing + ?Sized,
    {
        let changes = counter.total_changes();
        if changes == self.last_changes {
            return false;
        }
        self.last_changes = changes;
        self.update_id = self.update_id.saturating_add(1);
        tracing::debug!(update_id = self.update_id, changes, "catalog revision advanced");
        events.content_changed(self.update_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingEvents;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Counter(AtomicU64);

    impl ChangeCounter for Counter {
        fn total_changes(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn ten_to_fifteen_is_one_bump_and_one_notification() {
        let counter = Counter(AtomicU64::new(10));
        let mut events = RecordingEvents::default();
        let mut tracker = RevisionTracker::new(3, 10);

        assert!(!tracker.poll_and_maybe_advance(&counter, &mut events));
        counter.0.store(15, Ordering::Relaxed);
        assert!(tracker.poll_and_maybe_advance(&counter, &mut events));
        assert!(!tracker.poll_and_maybe_advance(&counter, &mut events));

        assert_eq!(tracker.update_id(), 4);
        assert_eq!(events.changes, vec![4]);
    }

    #[test]
    fn one_bump_per_changed_poll() {
        let counter = Counter::default();
        let mut events = RecordingEvents::default();
        let mut tracker = RevisionTracker::new(0, 0);
        for (round, total) in [1u64, 1, 7, 7, 8, 100].into_iter().enumerate() {
            counter.0.store(total, Ordering::Relaxed);
            tracker.poll_and_maybe_advance(&counter, &mut events);
            assert!(tracker.update_id() as usize <= round + 1);
        }
        assert_eq!(tracker.update_id(), 4);
        assert_eq!(events.changes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn revision_saturates_instead_of_wrapping() {
        let counter = Counter(AtomicU64::new(1));
        let mut events = RecordingEvents::default();
        let mut tracker = RevisionTracker::new(u32::MAX, 0);
        tracker.poll_and_maybe_advance(&counter, &mut events);
        assert_eq!(tracker.update_id(), u32::MAX);
    }
}
