//! Events broadcast from the engine to whatever renders the catalog.

use cinesync_common::{ExternalId, QueryKind};
use cinesync_db::models::CatalogEntity;
use serde::{Deserialize, Serialize};

/// Engine-to-view notification.
///
/// `EntitiesAvailable` always carries the complete visible list for the
/// active filter and sort; consumers replace what they show. The other
/// variants are incremental.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Full refresh of the visible list.
    EntitiesAvailable { entities: Vec<CatalogEntity> },

    /// A detail fetch finished for one entity. Both fields are `None` when
    /// the fetch failed.
    EntityUpdated {
        external_id: ExternalId,
        rating: Option<f64>,
        runtime_minutes: Option<u32>,
    },

    /// A recovered failure worth showing to the user.
    Error { message: String },

    /// Genre names can now be resolved.
    GenreDirectoryReady,

    /// A bulk load has been planned and its first page requested.
    LoadStarted { query: QueryKind },

    /// Persisted catalog size during a bulk load.
    Progress { persisted: u64, target: u64 },

    /// The persisted count reached the bulk-load target.
    BulkComplete { persisted: u64 },

    TrailerFound {
        external_id: ExternalId,
        url: Option<String>,
    },

    /// Human-readable status line.
    Status { message: String },

    /// Nothing is in flight and no fetch is scheduled.
    Idle,
}

impl SyncEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }
}
