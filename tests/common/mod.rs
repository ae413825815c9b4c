//! Shared test harness for sync engine integration tests.
//!
//! `ScriptedSource` serves deterministic pages and detail records and
//! records every request so tests can assert on what was fetched. Chosen
//! pages and detail ids can be made to fail.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cinesync::config::SyncConfig;
use cinesync::sync::{SyncEngine, SyncEvent, SyncHandle};
use cinesync::tmdb::{
    CastMember, CatalogSource, Credits, FetchError, GenreEntry, ListPage, MovieRecord, PageQuery,
};
use cinesync_common::{ExternalId, QueryKind};
use cinesync_db::pool::init_memory_pool;
use cinesync_db::store::CatalogStore;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

pub const DRAMA: i64 = 18;
pub const COMEDY: i64 = 35;

/// Deterministic in-memory catalog.
///
/// Browse page `p` holds ids `p * 1000 .. p * 1000 + per_page`; search pages
/// are offset by 500_000. Even ids are comedies, odd ids dramas.
pub struct ScriptedSource {
    pub total_pages: u32,
    pub per_page: i64,
    pub runtime: u32,
    pub detail_delay: Duration,
    pub page_delay: Duration,
    /// Page numbers that answer with a transport error, for any listing.
    pub failing_pages: HashSet<u32>,
    /// Detail ids that answer with a malformed response.
    pub failing_details: HashSet<i64>,
    pub page_calls: Mutex<Vec<PageQuery>>,
    pub detail_calls: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(total_pages: u32, per_page: i64) -> Self {
        Self {
            total_pages,
            per_page,
            runtime: 110,
            detail_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            failing_pages: HashSet::new(),
            failing_details: HashSet::new(),
            page_calls: Mutex::new(Vec::new()),
            detail_calls: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_detail_delay(mut self, delay: Duration) -> Self {
        self.detail_delay = delay;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn failing_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn failing_detail(mut self, id: i64) -> Self {
        self.failing_details.insert(id);
        self
    }

    /// Pages requested so far, in request order.
    pub fn pages_requested(&self) -> Vec<PageQuery> {
        self.page_calls.lock().unwrap().clone()
    }

    pub fn browse_pages_requested(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .pages_requested()
            .into_iter()
            .filter(|q| q.kind == QueryKind::Browse)
            .map(|q| q.page)
            .collect();
        pages.sort_unstable();
        pages
    }

    pub fn details_requested(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    fn record(&self, id: i64, title: String) -> MovieRecord {
        MovieRecord {
            id,
            title: Some(title),
            release_date: Some(format!("{}-06-01", 1980 + id % 40)),
            vote_average: Some(6.5),
            genre_ids: Some(vec![if id % 2 == 0 { COMEDY } else { DRAMA }]),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CatalogSource for ScriptedSource {
    async fn list_page(&self, query: &PageQuery) -> Result<ListPage, FetchError> {
        self.page_calls.lock().unwrap().push(query.clone());

        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
        if self.failing_pages.contains(&query.page) {
            return Err(FetchError::Transport(format!(
                "connection reset on page {}",
                query.page
            )));
        }

        let (offset, label) = match &query.kind {
            QueryKind::Browse => (0, "Movie".to_string()),
            QueryKind::Search(text) => (500_000, format!("{} result", text)),
        };

        let results = if query.page <= self.total_pages {
            let base = offset + i64::from(query.page) * 1000;
            (base..base + self.per_page)
                .map(|id| self.record(id, format!("{} {}", label, id)))
                .collect()
        } else {
            Vec::new()
        };

        Ok(ListPage {
            page: query.page,
            total_pages: self.total_pages,
            total_results: self.total_pages * self.per_page as u32,
            results,
        })
    }

    async fn movie_detail(&self, id: ExternalId) -> Result<MovieRecord, FetchError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.detail_delay.is_zero() {
            tokio::time::sleep(self.detail_delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing_details.contains(&id.get()) {
            return Err(FetchError::MalformedResponse(format!(
                "missing fields for movie {}",
                id
            )));
        }
        let mut record = self.record(id.get(), format!("Movie {}", id));
        record.runtime = Some(self.runtime);
        Ok(record)
    }

    async fn genres(&self) -> Result<Vec<GenreEntry>, FetchError> {
        Ok(vec![
            GenreEntry {
                id: DRAMA,
                name: "Drama".into(),
            },
            GenreEntry {
                id: COMEDY,
                name: "Comedy".into(),
            },
        ])
    }

    async fn trailer(&self, id: ExternalId) -> Result<Option<String>, FetchError> {
        Ok(Some(format!("https://www.youtube.com/watch?v=t{}", id)))
    }

    async fn credits(&self, _id: ExternalId) -> Result<Credits, FetchError> {
        Ok(Credits {
            cast: vec![CastMember {
                name: "Someone".into(),
                character: "Themselves".into(),
                order: 0,
            }],
            ..Default::default()
        })
    }
}

/// A running engine wired to a scripted source and an in-memory store.
pub struct TestEngine {
    pub source: Arc<ScriptedSource>,
    pub store: CatalogStore,
    pub handle: SyncHandle,
    pub events: broadcast::Receiver<SyncEvent>,
    task: JoinHandle<()>,
}

impl TestEngine {
    pub fn start(source: ScriptedSource, config: SyncConfig) -> Self {
        let source = Arc::new(source);
        let store = CatalogStore::new(init_memory_pool().unwrap());
        let (engine, handle) = SyncEngine::new(
            config,
            "https://image.tmdb.org/t/p/w500",
            source.clone(),
            store.clone(),
        );
        let events = handle.subscribe();
        let task = engine.spawn();
        Self {
            source,
            store,
            handle,
            events,
            task,
        }
    }

    /// Receive events until one matches `stop`, returning everything seen.
    pub async fn events_until(&mut self, stop: impl Fn(&SyncEvent) -> bool) -> Vec<SyncEvent> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(600), self.events.recv())
                .await
                .expect("timed out waiting for sync events");
            match event {
                Ok(event) => {
                    let done = stop(&event);
                    seen.push(event);
                    if done {
                        return seen;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("engine stopped unexpectedly"),
            }
        }
    }

    /// Receive events until the engine goes idle after a load has started.
    pub async fn until_load_idle(&mut self) -> Vec<SyncEvent> {
        let mut seen = self
            .events_until(|e| matches!(e, SyncEvent::LoadStarted { .. }))
            .await;
        seen.extend(self.events_until(|e| matches!(e, SyncEvent::Idle)).await);
        seen
    }

    pub async fn until_idle(&mut self) -> Vec<SyncEvent> {
        self.events_until(|e| matches!(e, SyncEvent::Idle)).await
    }

    pub async fn stop(self) {
        self.handle.shutdown().await.unwrap();
        self.task.await.unwrap();
    }
}

/// Config small enough to run quickly under paused time.
pub fn quick_config(browse_pages: u32) -> SyncConfig {
    SyncConfig {
        browse_pages,
        search_pages: browse_pages,
        ..Default::default()
    }
}
