//! Deferred tasks owned by the engine loop.
//!
//! Entries are tagged with the sync session that scheduled them so a new
//! session can drop everything its predecessor left behind.

use std::collections::BTreeMap;
use std::time::Duration;

use cinesync_common::QueryKind;
use tokio::time::Instant;

/// Work the engine defers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimedTask {
    /// One staggered run of a bulk load.
    FetchPages {
        kind: QueryKind,
        page: u32,
        count: u32,
    },
    /// First full view of a fresh load.
    InitialReveal,
    EnhancedRefresh,
    FinalRefresh,
    /// Online search after a local search came back empty.
    OnlineSearch { text: String },
    /// Periodic load progress report.
    ProgressTick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub session: u64,
    pub task: TimedTask,
}

#[derive(Debug, Default)]
pub struct Timeline {
    entries: BTreeMap<(Instant, u64), Scheduled>,
    seq: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, at: Instant, session: u64, task: TimedTask) {
        self.seq += 1;
        self.entries.insert((at, self.seq), Scheduled { session, task });
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration, session: u64, task: TimedTask) {
        self.schedule_at(now + delay, session, task);
    }

    /// Drop every entry not scheduled by `session`. Returns how many were dropped.
    pub fn cancel_other_sessions(&mut self, session: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, s| s.session == session);
        before - self.entries.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(at, _)| *at)
    }

    /// Remove and return every entry due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<Scheduled> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    /// Whether any pending entry would issue network requests.
    pub fn has_pending_fetches(&self) -> bool {
        self.entries.values().any(|s| {
            matches!(
                s.task,
                TimedTask::FetchPages { .. } | TimedTask::OnlineSearch { .. }
            )
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
