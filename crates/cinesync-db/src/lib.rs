//! Cinesync-DB: Catalog schema, migrations, and query operations
//!
//! This crate provides the local movie catalog for cinesync using SQLite
//! with rusqlite and r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//! - `store` - The `CatalogStore` facade consumed by the sync engine
//!
//! # Example
//!
//! ```no_run
//! use cinesync_common::{ExternalId, SortSpec};
//! use cinesync_db::models::CatalogEntity;
//! use cinesync_db::pool::init_pool;
//! use cinesync_db::store::CatalogStore;
//!
//! let pool = init_pool("/var/lib/cinesync/catalog.db").unwrap();
//! let store = CatalogStore::new(pool);
//!
//! let movie = CatalogEntity::new(ExternalId::new(550), "Fight Club");
//! store.upsert_by_external_id(&movie).unwrap();
//! let rows = store.query_all(SortSpec::default(), None).unwrap();
//! println!("{} movies", rows.len());
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
pub mod store;
