//! The seam between the sync engine and the remote catalog.

use async_trait::async_trait;
use cinesync_common::ExternalId;

use super::error::FetchError;
use super::types::{Credits, GenreEntry, ListPage, MovieRecord, PageQuery};

/// Async access to a remote movie catalog.
///
/// The engine only talks to the network through this trait, so tests can
/// drive it with a scripted source. Implementations are shared across
/// request tasks behind an `Arc`.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch one page of a browse or search listing.
    async fn list_page(&self, query: &PageQuery) -> Result<ListPage, FetchError>;

    /// Fetch the full record of one movie, including its runtime.
    async fn movie_detail(&self, id: ExternalId) -> Result<MovieRecord, FetchError>;

    /// Fetch the genre id/name table.
    async fn genres(&self) -> Result<Vec<GenreEntry>, FetchError>;

    /// Find a watchable trailer URL for a movie, if there is one.
    async fn trailer(&self, id: ExternalId) -> Result<Option<String>, FetchError>;

    /// Fetch cast and grouped crew for a movie.
    async fn credits(&self, id: ExternalId) -> Result<Credits, FetchError>;
}
