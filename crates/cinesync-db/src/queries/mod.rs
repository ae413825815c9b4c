//! Database query modules.
//!
//! - movies: catalog upserts, runtime backfill, filtered listings, ratings
//! - relations: per-user favorites and watchlist
//! - users: local accounts and credential checks

pub mod movies;
pub mod relations;
pub mod users;
