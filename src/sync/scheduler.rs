//! Bounded-concurrency detail fetching.
//!
//! The scheduler only does bookkeeping: it decides which ids to dispatch and
//! when. The engine performs the requests and reports every response back,
//! success or failure, so the counters always advance.

use std::collections::{HashSet, VecDeque};

use cinesync_common::ExternalId;

/// A dispatched detail request, tagged with the batch that queued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailTicket {
    pub id: ExternalId,
    pub batch: u64,
}

#[derive(Debug)]
pub struct DetailScheduler {
    queue: VecDeque<ExternalId>,
    in_flight: HashSet<ExternalId>,
    ceiling: usize,
    fetched: usize,
    target: usize,
    batch: u64,
}

impl DetailScheduler {
    pub fn new(ceiling: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: HashSet::new(),
            ceiling: ceiling.max(1),
            fetched: 0,
            target: 0,
            batch: 0,
        }
    }

    /// Replace the queue with a new batch and return the ids to dispatch now.
    ///
    /// Duplicates and ids already in flight are skipped. Requests still in
    /// flight from an earlier batch keep counting against the ceiling.
    pub fn submit_batch(&mut self, ids: impl IntoIterator<Item = ExternalId>) -> Vec<DetailTicket> {
        let mut seen = HashSet::new();
        self.queue = ids
            .into_iter()
            .filter(|id| !self.in_flight.contains(id) && seen.insert(*id))
            .collect();
        self.batch += 1;
        self.target = self.queue.len();
        self.fetched = 0;
        self.drain()
    }

    /// Pop queued ids while there is room under the ceiling.
    pub fn drain(&mut self) -> Vec<DetailTicket> {
        let mut tickets = Vec::new();
        while self.in_flight.len() < self.ceiling {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            self.in_flight.insert(id);
            tickets.push(DetailTicket {
                id,
                batch: self.batch,
            });
        }
        tickets
    }

    /// Record a finished request and return the next ids to dispatch.
    pub fn on_response(&mut self, ticket: DetailTicket) -> Vec<DetailTicket> {
        self.in_flight.remove(&ticket.id);
        if ticket.batch == self.batch {
            self.fetched += 1;
        }
        self.drain()
    }

    pub fn active(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    pub fn is_batch_complete(&self) -> bool {
        self.fetched >= self.target
    }
}
