//! Database models for the catalog.
//!
//! These structs mirror the SQLite schema and are the values handed between
//! the store, the sync engine, and whatever view consumes its events.

use cinesync_common::{ExternalId, LocalId, UserId};
use serde::{Deserialize, Serialize};

/// One movie in the catalog.
///
/// `local_id` is `None` until the entity has been persisted. A
/// `runtime_minutes` of zero means the detail record has not been fetched yet.
/// The two membership flags are derived from the requesting user's relation
/// rows and are never written back by an upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntity {
    pub external_id: ExternalId,
    pub local_id: Option<LocalId>,
    pub title: String,
    /// Release year, 0 when unknown.
    pub release_year: u16,
    /// Average rating on a 0-10 scale.
    pub rating_average: f64,
    /// Runtime in minutes, 0 when not yet known.
    pub runtime_minutes: u32,
    /// Remote image URL or resolved local path; empty when there is no image.
    pub poster_reference: String,
    pub genres: Vec<String>,
    pub is_favorite: bool,
    pub is_in_watchlist: bool,
}

impl CatalogEntity {
    /// Create an unpersisted entity with only its identity and title set.
    pub fn new(external_id: ExternalId, title: impl Into<String>) -> Self {
        Self {
            external_id,
            local_id: None,
            title: title.into(),
            release_year: 0,
            rating_average: 0.0,
            runtime_minutes: 0,
            poster_reference: String::new(),
            genres: Vec::new(),
            is_favorite: false,
            is_in_watchlist: false,
        }
    }

    /// Whether a detail fetch is still owed for this entity.
    pub fn needs_runtime(&self) -> bool {
        self.runtime_minutes == 0
    }

    /// Whether `genre` is literally one of this entity's genres.
    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g.trim() == genre)
    }

    /// Merge a later observation of the same movie into this one.
    ///
    /// Non-empty incoming fields win; a known runtime is never replaced by
    /// an unknown one.
    pub fn merge_from(&mut self, other: &CatalogEntity) {
        debug_assert_eq!(self.external_id, other.external_id);
        if !other.title.is_empty() {
            self.title = other.title.clone();
        }
        if other.release_year != 0 {
            self.release_year = other.release_year;
        }
        self.rating_average = other.rating_average;
        if other.runtime_minutes > 0 {
            self.runtime_minutes = other.runtime_minutes;
        }
        if !other.poster_reference.is_empty() {
            self.poster_reference = other.poster_reference.clone();
        }
        if !other.genres.is_empty() {
            self.genres = other.genres.clone();
        }
    }
}

/// Result of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// A new row was created.
    Inserted(LocalId),
    /// An existing row was updated in place.
    Updated(LocalId),
}

impl Upserted {
    pub fn local_id(self) -> LocalId {
        match self {
            Self::Inserted(id) | Self::Updated(id) => id,
        }
    }
}

/// Counts from a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// A local user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

/// Encode a genre list into the comma-separated column format.
pub(crate) fn encode_genres(genres: &[String]) -> String {
    genres
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode the comma-separated genre column.
pub(crate) fn decode_genres(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_needs_runtime() {
        let entity = CatalogEntity::new(ExternalId::new(1), "Heat");
        assert!(entity.needs_runtime());
        assert!(entity.local_id.is_none());
    }

    #[test]
    fn test_merge_keeps_known_runtime() {
        let mut existing = CatalogEntity::new(ExternalId::new(949), "Heat");
        existing.runtime_minutes = 170;
        existing.genres = vec!["Crime".into()];

        let mut incoming = CatalogEntity::new(ExternalId::new(949), "Heat");
        incoming.rating_average = 7.9;

        existing.merge_from(&incoming);
        assert_eq!(existing.runtime_minutes, 170);
        assert_eq!(existing.genres, vec!["Crime".to_string()]);
        assert!((existing.rating_average - 7.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_has_genre_is_literal() {
        let mut entity = CatalogEntity::new(ExternalId::new(2), "Airplane!");
        entity.genres = vec!["Comedy".into()];
        assert!(entity.has_genre("Comedy"));
        assert!(!entity.has_genre("comedy"));
        assert!(!entity.has_genre("Com"));
    }

    #[test]
    fn test_genre_encoding() {
        let genres = vec!["Action".to_string(), " Science Fiction ".to_string(), "".to_string()];
        let raw = encode_genres(&genres);
        assert_eq!(raw, "Action,Science Fiction");
        assert_eq!(decode_genres(&raw), vec!["Action", "Science Fiction"]);
        assert!(decode_genres("").is_empty());
    }

    #[test]
    fn test_user_hash_not_serialized() {
        let user = User {
            id: UserId::new(1),
            username: "ana".into(),
            password_hash: "secret".into(),
            created_at: "2024-01-01 00:00:00".into(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
    }
}
