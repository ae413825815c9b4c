//! The sync engine task.
//!
//! One spawned task owns every piece of sync state. Commands arrive on an
//! mpsc channel, network responses come back on an internal channel, and
//! deferred work is driven by the [`Timeline`]. Nothing is shared, so no
//! locks are needed; requests themselves run on their own tasks.

use std::sync::Arc;

use anyhow::Result;
use cinesync_common::{ExternalId, QueryKind, SortSpec, UserId};
use cinesync_db::store::CatalogStore;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::accumulator::{Accumulator, FailureOutcome, PageOutcome, PageRequest};
use super::events::SyncEvent;
use super::genres::GenreDirectory;
use super::orchestrator::{Action, Orchestrator, RefreshReason};
use super::scheduler::{DetailScheduler, DetailTicket};
use super::timeline::{TimedTask, Timeline};
use super::view::ViewFilter;
use crate::config::SyncConfig;
use crate::tmdb::{CatalogSource, FetchError, GenreEntry, ListPage, MovieRecord};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 1024;

/// Requests accepted by a running engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncCommand {
    /// Staggered bulk load of a browse listing or search.
    LoadCatalog { query: QueryKind },
    /// Fetch `count` pages starting at `page`. Page 1 starts a new session.
    FetchPages {
        kind: QueryKind,
        page: u32,
        count: u32,
    },
    /// Local-first search with online fallback.
    Search { text: String },
    SetFilter(ViewFilter),
    SetSort(SortSpec),
    SetUser(Option<UserId>),
    RefreshView,
    FindTrailer(ExternalId),
    Shutdown,
}

enum Completion {
    Genres(Result<Vec<GenreEntry>, FetchError>),
    Page {
        request: PageRequest,
        result: Result<ListPage, FetchError>,
    },
    Detail {
        ticket: DetailTicket,
        result: Result<MovieRecord, FetchError>,
    },
    Trailer {
        id: ExternalId,
        result: Result<Option<String>, FetchError>,
    },
}

/// Cloneable handle for talking to a running engine.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<SyncCommand>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncHandle {
    /// Subscribe to engine events. Only events sent after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn send(&self, command: SyncCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("Sync engine is not running"))
    }

    pub async fn load_catalog(&self, query: QueryKind) -> Result<()> {
        self.send(SyncCommand::LoadCatalog { query }).await
    }

    pub async fn search(&self, text: impl Into<String>) -> Result<()> {
        self.send(SyncCommand::Search { text: text.into() }).await
    }

    pub async fn set_filter(&self, filter: ViewFilter) -> Result<()> {
        self.send(SyncCommand::SetFilter(filter)).await
    }

    pub async fn set_sort(&self, sort: SortSpec) -> Result<()> {
        self.send(SyncCommand::SetSort(sort)).await
    }

    pub async fn set_user(&self, user: Option<UserId>) -> Result<()> {
        self.send(SyncCommand::SetUser(user)).await
    }

    pub async fn find_trailer(&self, id: ExternalId) -> Result<()> {
        self.send(SyncCommand::FindTrailer(id)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SyncCommand::Shutdown).await
    }
}

pub struct SyncEngine {
    source: Arc<dyn CatalogSource>,
    config: SyncConfig,
    commands: mpsc::Receiver<SyncCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    events: broadcast::Sender<SyncEvent>,
    directory: GenreDirectory,
    accumulator: Accumulator,
    details: DetailScheduler,
    timeline: Timeline,
    orchestrator: Orchestrator,
    genres_pending: bool,
    deferred_load: Option<QueryKind>,
    config_error_reported: bool,
    idle_reported: bool,
}

impl SyncEngine {
    /// Create an engine and the handle that drives it.
    ///
    /// `image_base` is joined with each poster path during normalization.
    pub fn new(
        config: SyncConfig,
        image_base: impl Into<String>,
        source: Arc<dyn CatalogSource>,
        store: CatalogStore,
    ) -> (Self, SyncHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = SyncHandle {
            commands: commands_tx,
            events: events.clone(),
        };

        let engine = Self {
            source,
            details: DetailScheduler::new(config.max_concurrent_details),
            orchestrator: Orchestrator::new(store, config.clone(), Instant::now()),
            config,
            commands,
            completions_tx,
            completions_rx,
            events,
            directory: GenreDirectory::new(),
            accumulator: Accumulator::new(image_base),
            timeline: Timeline::new(),
            genres_pending: false,
            deferred_load: None,
            config_error_reported: false,
            idle_reported: false,
        };

        (engine, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until a `Shutdown` command arrives or every handle is dropped.
    pub async fn run(mut self) {
        info!(
            max_concurrent_details = self.config.max_concurrent_details,
            target = self.config.target_count,
            "Sync engine started"
        );

        self.refresh(RefreshReason::ViewChanged);
        self.genres_pending = true;
        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Completion::Genres(source.genres().await));
        });

        loop {
            let deadline = self.timeline.next_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(SyncCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion);
                }
                _ = wait_for(deadline) => self.fire_due(),
            }

            self.check_idle();
        }

        info!("Sync engine stopped");
    }

    fn handle_command(&mut self, command: SyncCommand) {
        debug!(?command, "Sync command");
        match command {
            SyncCommand::LoadCatalog { query } => {
                if self.genres_pending {
                    debug!(query = %query, "Deferring load until the genre directory is ready");
                    self.deferred_load = Some(query);
                } else {
                    self.start_load(query);
                }
            }
            SyncCommand::FetchPages { kind, page, count } => {
                if page <= 1 && !self.begin_session() {
                    return;
                }
                self.fetch_pages(kind, page, count);
            }
            SyncCommand::Search { text } => {
                let actions = self.orchestrator.search(&text);
                self.apply_result(actions);
            }
            SyncCommand::SetFilter(filter) => {
                let actions = self.orchestrator.set_filter(filter);
                self.apply(actions);
            }
            SyncCommand::SetSort(sort) => {
                let actions = self.orchestrator.set_sort(sort);
                self.apply(actions);
            }
            SyncCommand::SetUser(user) => {
                let actions = self.orchestrator.set_user(user);
                self.apply(actions);
            }
            SyncCommand::RefreshView => self.refresh(RefreshReason::ViewChanged),
            SyncCommand::FindTrailer(id) => {
                let source = Arc::clone(&self.source);
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = source.trailer(id).await;
                    let _ = tx.send(Completion::Trailer { id, result });
                });
            }
            SyncCommand::Shutdown => {}
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Genres(result) => {
                self.genres_pending = false;
                match result {
                    Ok(entries) => {
                        if self.directory.load(entries) {
                            info!(genres = self.directory.len(), "Genre directory loaded");
                            self.emit(SyncEvent::GenreDirectoryReady);
                        }
                    }
                    Err(e) => self.report_fetch_error("genres", &e),
                }

                if let Some(query) = self.deferred_load.take() {
                    self.start_load(query);
                } else if self.config.autoload {
                    self.start_load(QueryKind::Browse);
                }
            }
            Completion::Page { request, result } => match result {
                Ok(page) => match self.accumulator.on_page(&request, page, &self.directory) {
                    PageOutcome::Continue(next) => self.dispatch_page(next),
                    PageOutcome::Completed(entities) => {
                        let actions = self
                            .orchestrator
                            .on_batch_accumulated(entities, Instant::now());
                        self.apply_result(actions);
                    }
                    PageOutcome::Stale => {
                        debug!(page = request.query.page, "Dropping stale page response");
                    }
                },
                Err(e) => match self.accumulator.on_failure(&request) {
                    FailureOutcome::Stale => {
                        debug!(page = request.query.page, "Dropping stale page failure");
                    }
                    FailureOutcome::Abandoned => self.report_fetch_error("page", &e),
                    FailureOutcome::Completed(entities) => {
                        self.report_fetch_error("page", &e);
                        let actions = self
                            .orchestrator
                            .on_batch_accumulated(entities, Instant::now());
                        self.apply_result(actions);
                    }
                },
            },
            Completion::Detail { ticket, result } => {
                let next = self.details.on_response(ticket);
                self.dispatch_details(next);
                self.apply_detail(ticket.id, result);
            }
            Completion::Trailer { id, result } => {
                let url = match result {
                    Ok(url) => url,
                    Err(e) => {
                        self.report_fetch_error("trailer", &e);
                        None
                    }
                };
                self.emit(SyncEvent::TrailerFound {
                    external_id: id,
                    url,
                });
            }
        }
    }

    fn apply_detail(&mut self, id: ExternalId, result: Result<MovieRecord, FetchError>) {
        match result {
            Ok(record) => {
                let runtime = record.runtime.unwrap_or(0);
                if runtime > 0 {
                    if let Err(e) = self.orchestrator.store().update_runtime(id, runtime) {
                        self.report(format!("Failed to store runtime for movie {}: {}", id, e));
                    }
                }
                self.emit(SyncEvent::EntityUpdated {
                    external_id: id,
                    rating: record.vote_average,
                    runtime_minutes: (runtime > 0).then_some(runtime),
                });
            }
            Err(e) => {
                self.report_fetch_error("detail", &e);
                self.emit(SyncEvent::EntityUpdated {
                    external_id: id,
                    rating: None,
                    runtime_minutes: None,
                });
            }
        }
    }

    fn fire_due(&mut self) {
        for scheduled in self.timeline.pop_due(Instant::now()) {
            // An earlier task in this batch may have started a new session.
            if scheduled.session != self.orchestrator.session() {
                continue;
            }
            match scheduled.task {
                TimedTask::FetchPages { kind, page, count } => {
                    if self.orchestrator.should_issue_scheduled_fetch() {
                        self.fetch_pages(kind, page, count);
                    } else {
                        debug!(page, "Target reached; skipping scheduled fetch");
                    }
                }
                TimedTask::OnlineSearch { text } => {
                    if self.begin_session() {
                        let pages = self.config.fallback_search_pages;
                        self.fetch_pages(QueryKind::Search(text), 1, pages);
                    }
                }
                task => {
                    let actions = self.orchestrator.on_timed(&task);
                    self.apply_result(actions);
                }
            }
        }
    }

    /// Start a new session and drop work scheduled by earlier ones.
    fn begin_session(&mut self) -> bool {
        match self.orchestrator.begin_session(Instant::now()) {
            Ok(session) => {
                let dropped = self.timeline.cancel_other_sessions(session);
                if dropped > 0 {
                    debug!(session, dropped, "Cancelled work from previous session");
                }
                true
            }
            Err(e) => {
                self.report(format!("Failed to start sync: {}", e));
                false
            }
        }
    }

    fn start_load(&mut self, query: QueryKind) {
        if !self.begin_session() {
            return;
        }
        info!(query = %query, "Starting catalog load");

        let now = Instant::now();
        let session = self.orchestrator.session();
        for (delay, task) in self.orchestrator.plan_bulk_load(&query) {
            self.timeline.schedule(now, delay, session, task);
        }
        self.timeline.schedule(
            now,
            std::time::Duration::from_secs(1),
            session,
            TimedTask::ProgressTick,
        );
        self.emit(SyncEvent::LoadStarted { query });
        self.emit(SyncEvent::status("Loading movies..."));
    }

    fn fetch_pages(&mut self, kind: QueryKind, page: u32, count: u32) {
        match self.accumulator.begin(kind, page, count) {
            Some(request) => self.dispatch_page(request),
            None => debug!(page, "Page run not started"),
        }
    }

    fn dispatch_page(&self, request: PageRequest) {
        debug!(
            kind = %request.query.kind,
            page = request.query.page,
            "Requesting page"
        );
        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = source.list_page(&request.query).await;
            let _ = tx.send(Completion::Page { request, result });
        });
    }

    fn dispatch_details(&self, tickets: Vec<DetailTicket>) {
        for ticket in tickets {
            let source = Arc::clone(&self.source);
            let tx = self.completions_tx.clone();
            tokio::spawn(async move {
                let result = source.movie_detail(ticket.id).await;
                let _ = tx.send(Completion::Detail { ticket, result });
            });
        }
    }

    fn apply_result(&mut self, actions: cinesync_common::Result<Vec<Action>>) {
        match actions {
            Ok(actions) => self.apply(actions),
            Err(e) => self.report(format!("Catalog update failed: {}", e)),
        }
    }

    fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Refresh(reason) => self.refresh(reason),
                Action::Schedule { delay, task } => {
                    let session = self.orchestrator.session();
                    self.timeline.schedule(Instant::now(), delay, session, task);
                }
                Action::SubmitDetails(ids) => {
                    let tickets = self.details.submit_batch(ids);
                    debug!(
                        dispatched = tickets.len(),
                        queued = self.details.queued(),
                        "Detail batch submitted"
                    );
                    self.dispatch_details(tickets);
                }
                Action::Progress { persisted, target } => {
                    self.emit(SyncEvent::Progress { persisted, target });
                }
                Action::BulkComplete { persisted } => {
                    self.emit(SyncEvent::BulkComplete { persisted });
                }
                Action::Status(message) => self.emit(SyncEvent::Status { message }),
            }
        }
    }

    fn refresh(&mut self, reason: RefreshReason) {
        match self.orchestrator.refresh_view(Instant::now()) {
            Ok(entities) => {
                debug!(?reason, rows = entities.len(), "View refreshed");
                self.emit(SyncEvent::EntitiesAvailable { entities });
            }
            Err(e) => self.report(format!("Failed to read catalog: {}", e)),
        }
    }

    fn check_idle(&mut self) {
        let idle = self.accumulator.is_idle()
            && self.details.is_idle()
            && !self.timeline.has_pending_fetches()
            && !self.genres_pending;

        if idle && !self.idle_reported {
            self.idle_reported = true;
            self.orchestrator.finish_loading();
            debug!("Sync engine idle");
            self.emit(SyncEvent::Idle);
        } else if !idle {
            self.idle_reported = false;
        }
    }

    /// Report a failed request. Configuration errors are reported once.
    fn report_fetch_error(&mut self, what: &str, err: &FetchError) {
        if err.is_configuration() {
            if self.config_error_reported {
                return;
            }
            self.config_error_reported = true;
        }
        warn!(request = what, error = %err, "Remote request failed");
        self.emit(SyncEvent::error(err.to_string()));
    }

    fn report(&mut self, message: String) {
        error!("{}", message);
        self.emit(SyncEvent::error(message));
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cinesync_db::pool::init_memory_pool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::tmdb::{Credits, PageQuery};

    /// Source that never answers with data, only configuration errors.
    struct Unconfigured {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSource for Unconfigured {
        async fn list_page(&self, _query: &PageQuery) -> Result<ListPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Configuration("TMDb API key is not set".into()))
        }

        async fn movie_detail(&self, _id: ExternalId) -> Result<MovieRecord, FetchError> {
            Err(FetchError::Configuration("TMDb API key is not set".into()))
        }

        async fn genres(&self) -> Result<Vec<GenreEntry>, FetchError> {
            Err(FetchError::Configuration("TMDb API key is not set".into()))
        }

        async fn trailer(&self, _id: ExternalId) -> Result<Option<String>, FetchError> {
            Err(FetchError::Configuration("TMDb API key is not set".into()))
        }

        async fn credits(&self, _id: ExternalId) -> Result<Credits, FetchError> {
            Err(FetchError::Configuration("TMDb API key is not set".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_error_reported_once() {
        let source = Arc::new(Unconfigured {
            calls: AtomicUsize::new(0),
        });
        let store = CatalogStore::new(init_memory_pool().unwrap());
        let config = SyncConfig {
            browse_pages: 4,
            ..Default::default()
        };
        let (engine, handle) = SyncEngine::new(config, "", source.clone(), store);
        let mut events = handle.subscribe();
        let task = engine.spawn();

        let mut errors = 0;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
                .await
                .expect("engine went quiet")
                .unwrap();
            match event {
                SyncEvent::Error { .. } => errors += 1,
                SyncEvent::Idle => break,
                _ => {}
            }
        }

        // Genre fetch, page 1, and the run at page 2 all fail the same way.
        assert_eq!(errors, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailer_failure_still_answers() {
        let source = Arc::new(Unconfigured {
            calls: AtomicUsize::new(0),
        });
        let store = CatalogStore::new(init_memory_pool().unwrap());
        let config = SyncConfig {
            autoload: false,
            ..Default::default()
        };
        let (engine, handle) = SyncEngine::new(config, "", source, store);
        let mut events = handle.subscribe();
        let task = engine.spawn();

        handle.find_trailer(ExternalId::new(550)).await.unwrap();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("no trailer answer")
                .unwrap();
            if let SyncEvent::TrailerFound { external_id, url } = event {
                assert_eq!(external_id, ExternalId::new(550));
                assert_eq!(url, None);
                break;
            }
        }

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
