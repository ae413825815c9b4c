//! Remote catalog access: the [`CatalogSource`] seam and its TMDb client.

mod client;
mod error;
mod source;
mod types;

pub use client::TmdbClient;
pub use error::FetchError;
pub use source::CatalogSource;
pub use types::{
    parse_year, CastMember, Credits, GenreEntry, ListPage, MovieRecord, PageQuery,
};
