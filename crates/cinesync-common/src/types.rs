//! Core type definitions shared by the store and the sync engine.
//!
//! Sort orders are a closed set so that no caller-supplied text ever reaches
//! an `ORDER BY` clause.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column a catalog listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    /// Alphabetical by title.
    Title,
    /// Newest release first.
    #[default]
    Year,
    /// Highest rated first.
    Rating,
    /// Shortest runtime first.
    Runtime,
}

impl SortField {
    /// SQL ordering expression for this field, relative to the `movies` alias `m`.
    pub fn order_clause(self) -> &'static str {
        match self {
            Self::Title => "m.title COLLATE NOCASE ASC",
            Self::Year => "m.release_year DESC, m.title COLLATE NOCASE ASC",
            Self::Rating => "m.rating_average DESC, m.title COLLATE NOCASE ASC",
            Self::Runtime => "m.runtime_minutes ASC, m.title COLLATE NOCASE ASC",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title => write!(f, "title"),
            Self::Year => write!(f, "year"),
            Self::Rating => write!(f, "rating"),
            Self::Runtime => write!(f, "runtime"),
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "year" => Ok(Self::Year),
            "rating" => Ok(Self::Rating),
            "runtime" | "duration" => Ok(Self::Runtime),
            _ => Err(format!("Invalid sort field: {}", s)),
        }
    }
}

/// Sort specification for catalog reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
}

impl SortSpec {
    pub fn by(field: SortField) -> Self {
        Self { field }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field)
    }
}

/// Kind of paginated listing being pulled from the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "query", rename_all = "lowercase")]
pub enum QueryKind {
    /// The popular-movies listing.
    Browse,
    /// Free-text title search.
    Search(String),
}

impl QueryKind {
    /// Build a query kind from user text; blank text means browse.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Self::Browse
        } else {
            Self::Search(trimmed.to_string())
        }
    }

    /// The recorded query text (empty for browse).
    pub fn query_text(&self) -> &str {
        match self {
            Self::Browse => "",
            Self::Search(text) => text,
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(self, Self::Search(_))
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Browse => write!(f, "browse"),
            Self::Search(text) => write!(f, "search({})", text),
        }
    }
}
