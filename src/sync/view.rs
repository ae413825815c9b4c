//! The visible list: which rows, in which order, for which user.

use cinesync_common::{SortSpec, UserId};
use cinesync_db::models::CatalogEntity;
use cinesync_db::store::CatalogStore;
use serde::{Deserialize, Serialize};

/// Filter applied on every rebuild of the visible list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "filter", content = "value", rename_all = "snake_case")]
pub enum ViewFilter {
    #[default]
    All,
    Genre(String),
    Search(String),
}

impl ViewFilter {
    pub fn is_filtered(&self) -> bool {
        !matches!(self, Self::All)
    }
}

impl std::fmt::Display for ViewFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Genre(genre) => write!(f, "genre:{}", genre),
            Self::Search(text) => write!(f, "search:{}", text),
        }
    }
}

/// Filter, sort, and user together describe one rendering of the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSpec {
    pub filter: ViewFilter,
    pub sort: SortSpec,
    pub user: Option<UserId>,
}

impl ViewSpec {
    /// Query the store for the rows this view shows.
    ///
    /// Genre views keep only rows that list the genre verbatim; the store
    /// match is looser.
    pub fn rebuild(&self, store: &CatalogStore) -> cinesync_common::Result<Vec<CatalogEntity>> {
        match &self.filter {
            ViewFilter::All => store.query_all(self.sort, self.user),
            ViewFilter::Genre(genre) => {
                let mut rows = store.query_by_genre(genre, self.sort, self.user)?;
                rows.retain(|row| row.has_genre(genre));
                Ok(rows)
            }
            ViewFilter::Search(text) => store.query_by_search_text(text, self.sort, self.user),
        }
    }
}
