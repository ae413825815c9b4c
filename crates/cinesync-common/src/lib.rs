//! Cinesync-Common: Shared types, identifiers, and errors.
//!
//! This crate provides common functionality used across cinesync:
//!
//! - **Typed IDs**: Integer newtypes for remote (TMDb) ids, local row ids and users
//! - **Core Types**: Sort specifications and query kinds
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use cinesync_common::{Error, ExternalId, QueryKind, Result, SortSpec};
//!
//! let id = ExternalId::new(550);
//! assert_eq!(id.get(), 550);
//!
//! let kind = QueryKind::from_text("  ");
//! assert_eq!(kind, QueryKind::Browse);
//!
//! let sort = SortSpec::default();
//! assert_eq!(sort.to_string(), "year");
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("movie"))
//! }
//! assert!(example().is_err());
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
