//! The catalog store handed to the sync engine and the CLI.
//!
//! `CatalogStore` is constructed explicitly around a pool and cloned into
//! whoever needs it. Each method checks out one connection for its own
//! duration and never holds it across a call to another method, which keeps
//! the single-connection in-memory pool usable.

use cinesync_common::{Error, ExternalId, LocalId, Result, SortSpec, UserId};

use crate::models::{CatalogEntity, UpsertSummary, Upserted, User};
use crate::pool::{get_conn, DbPool};
use crate::queries::movies::{self, MovieFilter};
use crate::queries::relations::{self, Relation};
use crate::queries::users;

#[derive(Clone)]
pub struct CatalogStore {
    pool: DbPool,
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore")
            .field("max_connections", &self.pool.max_size())
            .finish()
    }
}

impl CatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or update a movie keyed by its external id.
    pub fn upsert_by_external_id(&self, entity: &CatalogEntity) -> Result<Upserted> {
        let conn = get_conn(&self.pool)?;
        movies::upsert_movie(&conn, entity)
    }

    /// Upsert a batch in one transaction.
    pub fn upsert_all(&self, entities: &[CatalogEntity]) -> Result<UpsertSummary> {
        let conn = get_conn(&self.pool)?;
        movies::upsert_movies(&conn, entities)
    }

    pub fn exists_by_external_id(&self, external_id: ExternalId) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        movies::exists_by_external_id(&conn, external_id)
    }

    pub fn local_id(&self, external_id: ExternalId) -> Result<Option<LocalId>> {
        let conn = get_conn(&self.pool)?;
        movies::local_id(&conn, external_id)
    }

    /// Store a fetched runtime. Returns `false` when the movie is not persisted.
    pub fn update_runtime(&self, external_id: ExternalId, minutes: u32) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        movies::update_runtime(&conn, external_id, minutes)
    }

    pub fn has_known_runtime(&self, external_id: ExternalId) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        movies::has_known_runtime(&conn, external_id)
    }

    pub fn get(&self, external_id: ExternalId, user: Option<UserId>) -> Result<Option<CatalogEntity>> {
        let conn = get_conn(&self.pool)?;
        movies::get_movie(&conn, external_id, user)
    }

    pub fn query_all(&self, sort: SortSpec, user: Option<UserId>) -> Result<Vec<CatalogEntity>> {
        self.list(&MovieFilter::All, sort, user)
    }

    /// Movies whose genre list contains `genre` as a whole element.
    ///
    /// Matching is case-insensitive; callers that need an exact match filter
    /// the result with [`CatalogEntity::has_genre`].
    pub fn query_by_genre(
        &self,
        genre: &str,
        sort: SortSpec,
        user: Option<UserId>,
    ) -> Result<Vec<CatalogEntity>> {
        self.list(&MovieFilter::Genre(genre.to_string()), sort, user)
    }

    /// Movies whose title contains `text`, ignoring case.
    pub fn query_by_search_text(
        &self,
        text: &str,
        sort: SortSpec,
        user: Option<UserId>,
    ) -> Result<Vec<CatalogEntity>> {
        self.list(&MovieFilter::Title(text.to_string()), sort, user)
    }

    pub fn list(
        &self,
        filter: &MovieFilter,
        sort: SortSpec,
        user: Option<UserId>,
    ) -> Result<Vec<CatalogEntity>> {
        let conn = get_conn(&self.pool)?;
        movies::list_movies(&conn, filter, sort, user)
    }

    pub fn distinct_genres(&self) -> Result<Vec<String>> {
        let conn = get_conn(&self.pool)?;
        movies::distinct_genres(&conn)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = get_conn(&self.pool)?;
        movies::count_movies(&conn)
    }

    /// Flip the favorite flag and return the new state.
    pub fn toggle_favorite(&self, user: UserId, external_id: ExternalId) -> Result<bool> {
        self.toggle(Relation::Favorites, user, external_id)
    }

    /// Flip the watchlist flag and return the new state.
    pub fn toggle_watchlist(&self, user: UserId, external_id: ExternalId) -> Result<bool> {
        self.toggle(Relation::Watchlist, user, external_id)
    }

    fn toggle(&self, relation: Relation, user: UserId, external_id: ExternalId) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        let movie = movies::local_id(&conn, external_id)?
            .ok_or_else(|| Error::not_found(format!("movie {}", external_id)))?;
        relations::toggle(&conn, relation, user, movie)
    }

    pub fn favorites(&self, user: UserId, sort: SortSpec) -> Result<Vec<CatalogEntity>> {
        let conn = get_conn(&self.pool)?;
        relations::list(&conn, Relation::Favorites, user, sort)
    }

    pub fn watchlist(&self, user: UserId, sort: SortSpec) -> Result<Vec<CatalogEntity>> {
        let conn = get_conn(&self.pool)?;
        relations::list(&conn, Relation::Watchlist, user, sort)
    }

    /// Fold a user rating into the running average and return the new average.
    pub fn record_rating(&self, local_id: LocalId, rating: f64) -> Result<f64> {
        let conn = get_conn(&self.pool)?;
        movies::record_rating(&conn, local_id, rating)
    }

    /// Create an account. The password is hashed before it reaches the table.
    pub fn register_user(&self, username: &str, password: &str) -> Result<User> {
        let conn = get_conn(&self.pool)?;
        users::create_user(&conn, username, &users::hash_credential(password))
    }

    pub fn verify_user(&self, username: &str, password: &str) -> Result<Option<User>> {
        let conn = get_conn(&self.pool)?;
        users::verify_credentials(&conn, username, password)
    }

    pub fn user_id(&self, username: &str) -> Result<Option<UserId>> {
        let conn = get_conn(&self.pool)?;
        Ok(users::get_user_by_username(&conn, username)?.map(|u| u.id))
    }
}
