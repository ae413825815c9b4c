//! Reconciles accumulated batches with the store and the visible list.
//!
//! The orchestrator decides; the engine acts. Every entry point returns a
//! list of [`Action`]s so the policies here can be tested without a runtime
//! or a network.

use std::time::Duration;

use cinesync_common::{ExternalId, QueryKind, Result, SortSpec, UserId};
use cinesync_db::models::CatalogEntity;
use cinesync_db::store::CatalogStore;
use tokio::time::Instant;
use tracing::{debug, info};

use super::timeline::TimedTask;
use super::view::{ViewFilter, ViewSpec};
use crate::config::SyncConfig;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Why the visible list is being rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// A page worth of new rows, or the refresh interval elapsed.
    Throttle,
    /// Every batch after the initial reveal.
    Maintenance,
    InitialReveal,
    Enhanced,
    Final,
    /// Filter, sort, or user changed.
    ViewChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Refresh(RefreshReason),
    Schedule { delay: Duration, task: TimedTask },
    SubmitDetails(Vec<ExternalId>),
    Progress { persisted: u64, target: u64 },
    BulkComplete { persisted: u64 },
    Status(String),
}

/// Staged-reveal flags for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevealState {
    pub initial_scheduled: bool,
    pub initial_shown: bool,
    pub followups_scheduled: bool,
}

#[derive(Debug)]
struct Throttle {
    last_displayed: u64,
    last_refresh: Instant,
}

#[derive(Debug)]
pub struct Orchestrator {
    store: CatalogStore,
    config: SyncConfig,
    view: ViewSpec,
    session: u64,
    reveal: RevealState,
    throttle: Throttle,
    loading: bool,
    target_reached: bool,
}

impl Orchestrator {
    pub fn new(store: CatalogStore, config: SyncConfig, now: Instant) -> Self {
        Self {
            store,
            config,
            view: ViewSpec::default(),
            session: 0,
            reveal: RevealState::default(),
            throttle: Throttle {
                last_displayed: 0,
                last_refresh: now,
            },
            loading: false,
            target_reached: false,
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn view(&self) -> &ViewSpec {
        &self.view
    }

    pub fn reveal(&self) -> RevealState {
        self.reveal
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn target_reached(&self) -> bool {
        self.target_reached
    }

    /// Start a new sync session and return its id.
    ///
    /// Reveal flags, throttle counters, and the target flag all reset.
    pub fn begin_session(&mut self, now: Instant) -> Result<u64> {
        self.session += 1;
        self.reveal = RevealState::default();
        self.throttle = Throttle {
            last_displayed: self.store.count()?,
            last_refresh: now,
        };
        self.loading = true;
        self.target_reached = false;
        debug!(session = self.session, "Sync session started");
        Ok(self.session)
    }

    /// Mark the current load as finished without reaching the target.
    pub fn finish_loading(&mut self) {
        self.loading = false;
    }

    /// Staggered fetch plan for a bulk load: page 1 at once, then runs of
    /// `batch_pages` pages spaced `stagger` apart after `initial_delay`.
    pub fn plan_bulk_load(&self, kind: &QueryKind) -> Vec<(Duration, TimedTask)> {
        let max_pages = if kind.is_search() {
            self.config.search_pages
        } else {
            self.config.browse_pages
        };
        let batch = self.config.batch_pages.max(1);

        let mut plan = vec![(
            Duration::ZERO,
            TimedTask::FetchPages {
                kind: kind.clone(),
                page: 1,
                count: 1,
            },
        )];

        let mut page = 2;
        let mut n = 0u32;
        while page <= max_pages {
            plan.push((
                self.config.initial_delay() + self.config.stagger() * n,
                TimedTask::FetchPages {
                    kind: kind.clone(),
                    page,
                    count: batch.min(max_pages - page + 1),
                },
            ));
            page += batch;
            n += 1;
        }

        plan
    }

    /// Whether a staggered fetch that is firing now should still be issued.
    pub fn should_issue_scheduled_fetch(&self) -> bool {
        !self.target_reached
    }

    /// Persist a batch and decide what follows from it.
    ///
    /// A batch is everything the session has collected so far, so the owed
    /// ids computed here cover earlier runs whose detail fetches have not
    /// landed yet.
    pub fn on_batch_accumulated(
        &mut self,
        entities: Vec<CatalogEntity>,
        now: Instant,
    ) -> Result<Vec<Action>> {
        if entities.is_empty() {
            if self.store.count()? == 0 {
                return Ok(vec![Action::Status("No movies found".into())]);
            }
            return Ok(Vec::new());
        }

        let summary = self.store.upsert_all(&entities)?;

        let mut owed = Vec::new();
        for entity in &entities {
            if entity.needs_runtime() && !self.store.has_known_runtime(entity.external_id)? {
                owed.push(entity.external_id);
            }
        }

        let persisted = self.store.count()?;
        let target = self.config.target_count;
        debug!(
            received = entities.len(),
            inserted = summary.inserted,
            updated = summary.updated,
            owed = owed.len(),
            persisted,
            "Batch reconciled"
        );

        let mut actions = Vec::new();
        if !owed.is_empty() {
            actions.push(Action::SubmitDetails(owed));
        }
        actions.push(Action::Progress { persisted, target });

        if !self.reveal.initial_scheduled && persisted >= self.config.reveal_threshold {
            self.reveal.initial_scheduled = true;
            actions.push(Action::Schedule {
                delay: self.config.reveal_delay(),
                task: TimedTask::InitialReveal,
            });
            actions.push(Action::Status(
                "Preparing movie display with complete information...".into(),
            ));
        }

        if self.reveal.initial_scheduled && !self.reveal.followups_scheduled {
            self.reveal.followups_scheduled = true;
            actions.push(Action::Schedule {
                delay: self.config.enhanced_refresh(),
                task: TimedTask::EnhancedRefresh,
            });
            actions.push(Action::Schedule {
                delay: self.config.final_refresh(),
                task: TimedTask::FinalRefresh,
            });
        }

        let grown = persisted.saturating_sub(self.throttle.last_displayed);
        let elapsed = now.saturating_duration_since(self.throttle.last_refresh);
        if grown >= u64::from(self.config.page_size) || elapsed >= self.config.refresh_interval() {
            actions.push(Action::Refresh(RefreshReason::Throttle));
        } else if self.reveal.initial_shown {
            actions.push(Action::Refresh(RefreshReason::Maintenance));
        }

        if !self.target_reached && persisted >= target {
            self.target_reached = true;
            self.loading = false;
            info!(persisted, target, "Bulk load target reached");
            actions.push(Action::BulkComplete { persisted });
            actions.push(Action::Status(format!(
                "Movie database fully loaded! {} movies available for browsing.",
                persisted
            )));
        }

        Ok(actions)
    }

    /// Handle a reveal-stage or progress task that came due.
    pub fn on_timed(&mut self, task: &TimedTask) -> Result<Vec<Action>> {
        let actions = match task {
            TimedTask::InitialReveal => {
                self.reveal.initial_shown = true;
                let persisted = self.store.count()?;
                vec![
                    Action::Refresh(RefreshReason::InitialReveal),
                    Action::Status(format!(
                        "Displaying {} movies with complete information",
                        persisted
                    )),
                ]
            }
            TimedTask::EnhancedRefresh => vec![Action::Refresh(RefreshReason::Enhanced)],
            TimedTask::FinalRefresh => {
                let persisted = self.store.count()?;
                vec![
                    Action::Refresh(RefreshReason::Final),
                    Action::Status(format!(
                        "All movie details updated - {} movies available",
                        persisted
                    )),
                ]
            }
            TimedTask::ProgressTick if self.loading => {
                let persisted = self.store.count()?;
                vec![
                    Action::Progress {
                        persisted,
                        target: self.config.target_count,
                    },
                    Action::Schedule {
                        delay: PROGRESS_INTERVAL,
                        task: TimedTask::ProgressTick,
                    },
                ]
            }
            _ => Vec::new(),
        };
        Ok(actions)
    }

    /// Rebuild the visible list for the active view and reset the throttle.
    pub fn refresh_view(&mut self, now: Instant) -> Result<Vec<CatalogEntity>> {
        let rows = self.view.rebuild(&self.store)?;
        self.throttle.last_displayed = self.store.count()?;
        self.throttle.last_refresh = now;
        Ok(rows)
    }

    pub fn set_filter(&mut self, filter: ViewFilter) -> Vec<Action> {
        self.view.filter = filter;
        vec![Action::Refresh(RefreshReason::ViewChanged)]
    }

    pub fn set_sort(&mut self, sort: SortSpec) -> Vec<Action> {
        self.view.sort = sort;
        vec![Action::Refresh(RefreshReason::ViewChanged)]
    }

    pub fn set_user(&mut self, user: Option<UserId>) -> Vec<Action> {
        self.view.user = user;
        vec![Action::Refresh(RefreshReason::ViewChanged)]
    }

    /// Search the local catalog first; fall back to an online search when
    /// nothing matches.
    pub fn search(&mut self, text: &str) -> Result<Vec<Action>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(self.set_filter(ViewFilter::All));
        }

        self.view.filter = ViewFilter::Search(text.to_string());
        let found = self.view.rebuild(&self.store)?.len();

        if found > 0 {
            Ok(vec![
                Action::Refresh(RefreshReason::ViewChanged),
                Action::Status(format!("Found {} movies matching '{}'", found, text)),
            ])
        } else {
            Ok(vec![
                Action::Status(format!(
                    "No local results found for '{}'. Searching online...",
                    text
                )),
                Action::Schedule {
                    delay: self.config.fallback_search_delay(),
                    task: TimedTask::OnlineSearch {
                        text: text.to_string(),
                    },
                },
            ])
        }
    }
}
