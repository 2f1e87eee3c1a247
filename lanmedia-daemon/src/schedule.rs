//! Periodic task scheduler: the re-announce timer and the revision-poll timer.
//!
//! Deadlines live on the monotonic clock. Both are seeded one interval after
//! startup and rescheduled to `now + interval` when they fire.

use std::time::Duration;

use tokio::time::Instant;

use crate::paths::REVISION_POLL_INTERVAL;

/// Stand-in deadline for intervals too long to add to an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Work due at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueActions {
    /// Re-announce, carrying the advertisement lifetime.
    pub announce: Option<Duration>,
    pub revision_poll: bool,
}

impl DueActions {
    pub fn is_empty(&self) -> bool {
        self.announce.is_none() && !self.revision_poll
    }
}

#[derive(Debug, Clone)]
pub struct AnnounceSchedule {
    announce_interval: Duration,
    poll_interval: Duration,
    next_announce: Instant,
    next_poll: Instant,
}

impl AnnounceSchedule {
    pub fn new(now: Instant, announce_interval: Duration) -> Self {
        Self::with_poll_interval(now, announce_interval, REVISION_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        now: Instant,
        announce_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            announce_interval,
            poll_interval,
            next_announce: after(now, announce_interval),
            next_poll: after(now, poll_interval),
        }
    }

    /// `2 × interval + 10 s`, so peers keep the advertisement between
    /// announcements.
    pub fn advertisement_lifetime(&self) -> Duration {
        self.announce_interval
            .saturating_mul(2)
            .saturating_add(Duration::from_secs(10))
    }

    /// Time until the earlier of the two deadlines; zero when one is overdue.
    pub fn next_deadline(&self, now: Instant) -> Duration {
        self.next_announce
            .min(self.next_poll)
            .saturating_duration_since(now)
    }

    /// Report which timers are due at `now` and reschedule them.
    pub fn due_actions(&mut self, now: Instant) -> DueActions {
        let mut due = DueActions::default();
        if now >= self.next_announce {
            due.announce = Some(self.advertisement_lifetime());
            self.next_announce = after(now, self.announce_interval);
        }
        if now >= self.next_poll {
            due.revision_poll = true;
            self.next_poll = after(now, self.poll_interval);
        }
        due
    }
}

fn after(now: Instant, interval: Duration) -> Instant {
    now.checked_add(interval).unwrap_or(now + FAR_FUTURE)
}
