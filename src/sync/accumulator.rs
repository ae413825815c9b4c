//! Multi-page listing accumulation.
//!
//! A session collects normalized entities from one listing (browse or a
//! search) across several page runs. Each run walks its pages one at a time
//! and stops at its last page or at the listing's reported end, whichever
//! comes first. When a run stops, everything the session has collected so
//! far is handed off, so every hand-off covers the whole session.

use std::collections::HashMap;

use cinesync_common::{ExternalId, QueryKind};
use cinesync_db::models::CatalogEntity;
use tracing::debug;

use super::genres::GenreDirectory;
use crate::tmdb::{ListPage, PageQuery};

/// Identifies one accumulation session. Responses from older sessions are dropped.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u32);

/// A page request together with the bookkeeping needed to route its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: Generation,
    pub run: RunId,
    pub query: PageQuery,
}

/// What to do after a page response.
#[derive(Debug)]
pub enum PageOutcome {
    /// Issue this request next, immediately.
    Continue(PageRequest),
    /// The run finished; these entities are ready to persist.
    Completed(Vec<CatalogEntity>),
    /// The response belongs to a superseded session or a finished run.
    Stale,
}

/// What to do after a failed page.
#[derive(Debug)]
pub enum FailureOutcome {
    /// Other runs are still going, or nothing new was collected.
    Abandoned,
    /// The failed run was the session's last; hand off what was collected.
    Completed(Vec<CatalogEntity>),
    /// The request belongs to a superseded session or a finished run.
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct PageRun {
    cursor: u32,
    last_page: u32,
}

#[derive(Debug)]
pub struct Session {
    kind: QueryKind,
    generation: Generation,
    runs: HashMap<RunId, PageRun>,
    collected: Vec<CatalogEntity>,
    index: HashMap<ExternalId, usize>,
    /// Collected entities changed since the last hand-off.
    dirty: bool,
}

impl Session {
    fn new(kind: QueryKind, generation: Generation) -> Self {
        Self {
            kind,
            generation,
            runs: HashMap::new(),
            collected: Vec::new(),
            index: HashMap::new(),
            dirty: false,
        }
    }

    pub fn kind(&self) -> &QueryKind {
        &self.kind
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    fn merge(&mut self, entity: CatalogEntity) {
        self.dirty = true;
        match self.index.get(&entity.external_id) {
            Some(&i) => self.collected[i].merge_from(&entity),
            None => {
                self.index.insert(entity.external_id, self.collected.len());
                self.collected.push(entity);
            }
        }
    }

    fn hand_off(&mut self) -> Vec<CatalogEntity> {
        self.dirty = false;
        self.collected.clone()
    }
}

#[derive(Debug)]
pub struct Accumulator {
    session: Option<Session>,
    image_base: String,
    next_generation: Generation,
    next_run: u32,
}

impl Accumulator {
    pub fn new(image_base: impl Into<String>) -> Self {
        Self {
            session: None,
            image_base: image_base.into(),
            next_generation: 0,
            next_run: 0,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Number of runs with a page in flight.
    pub fn active_runs(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.runs.len())
    }

    /// Entities collected by the current session across all its runs.
    pub fn collected_len(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.collected.len())
    }

    pub fn is_idle(&self) -> bool {
        self.active_runs() == 0
    }

    /// Start fetching `page_count` pages from `page`.
    ///
    /// Page 1 starts a fresh session. Any other page continues the current
    /// session; a continuation for a different listing is stale and yields
    /// `None`.
    pub fn begin(&mut self, kind: QueryKind, page: u32, page_count: u32) -> Option<PageRequest> {
        let page = page.max(1);
        let page_count = page_count.max(1);

        let fresh = page == 1 || self.session.is_none();

        if fresh {
            self.next_generation += 1;
            debug!(
                generation = self.next_generation,
                kind = %kind,
                "Starting accumulation session"
            );
            self.session = Some(Session::new(kind.clone(), self.next_generation));
        }

        let session = self.session.as_mut()?;
        if session.kind != kind {
            debug!(
                session_kind = %session.kind,
                requested = %kind,
                page,
                "Ignoring continuation for a superseded listing"
            );
            return None;
        }

        self.next_run += 1;
        let run = RunId(self.next_run);
        session.runs.insert(
            run,
            PageRun {
                cursor: page,
                last_page: page.saturating_add(page_count - 1),
            },
        );

        Some(PageRequest {
            generation: session.generation,
            run,
            query: PageQuery::new(session.kind.clone(), page),
        })
    }

    /// Fold a page response into the session.
    pub fn on_page(
        &mut self,
        request: &PageRequest,
        page: ListPage,
        directory: &GenreDirectory,
    ) -> PageOutcome {
        let Some(session) = self.session.as_mut() else {
            return PageOutcome::Stale;
        };
        if session.generation != request.generation {
            return PageOutcome::Stale;
        }
        let Some(run) = session.runs.get(&request.run).copied() else {
            return PageOutcome::Stale;
        };

        let received = page.results.len();
        for record in page.results {
            session.merge(record.into_entity(directory, &self.image_base));
        }

        let current = run.cursor;
        debug!(
            page = current,
            total_pages = page.total_pages,
            received,
            collected = session.collected.len(),
            "Page accumulated"
        );

        if current < run.last_page && current < page.total_pages {
            let next = current + 1;
            session.runs.insert(
                request.run,
                PageRun {
                    cursor: next,
                    last_page: run.last_page,
                },
            );
            return PageOutcome::Continue(PageRequest {
                generation: session.generation,
                run: request.run,
                query: PageQuery::new(session.kind.clone(), next),
            });
        }

        session.runs.remove(&request.run);
        PageOutcome::Completed(session.hand_off())
    }

    /// End a run whose page failed. Entities it already collected stay in
    /// the session and are handed off once no other run is left.
    pub fn on_failure(&mut self, request: &PageRequest) -> FailureOutcome {
        let Some(session) = self.session.as_mut() else {
            return FailureOutcome::Stale;
        };
        if session.generation != request.generation
            || session.runs.remove(&request.run).is_none()
        {
            return FailureOutcome::Stale;
        }

        if session.runs.is_empty() && session.dirty {
            debug!(
                page = request.query.page,
                collected = session.collected.len(),
                "Run failed; handing off collected entities"
            );
            FailureOutcome::Completed(session.hand_off())
        } else {
            FailureOutcome::Abandoned
        }
    }
}
