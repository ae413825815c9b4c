//! Cinesync - Movie catalog synchronization
//!
//! This library crate exposes the sync engine, its TMDb client, and
//! configuration for the binary and for integration testing.

pub mod config;
pub mod sync;
pub mod tmdb;
