//! Catalog synchronization.
//!
//! - `accumulator` - Multi-page listing accumulation and deduplication
//! - `scheduler` - Bounded-concurrency detail fetching
//! - `orchestrator` - Persistence, refresh throttling, and staged reveal
//! - `timeline` - Deferred, session-tagged tasks
//! - `engine` - The task that wires it all to a [`CatalogSource`](crate::tmdb::CatalogSource)

pub mod accumulator;
pub mod engine;
pub mod events;
pub mod genres;
pub mod orchestrator;
pub mod scheduler;
pub mod timeline;
pub mod view;

pub use engine::{SyncCommand, SyncEngine, SyncHandle};
pub use events::SyncEvent;
pub use genres::GenreDirectory;
pub use view::{ViewFilter, ViewSpec};
