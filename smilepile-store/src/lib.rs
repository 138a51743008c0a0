//! SQLite store for SmilePile.
//!
//! Implements the `smilepile-backup` collaborator traits over a pooled
//! SQLite database holding categories, photos and key/value settings.

pub mod db;
pub mod models;
pub mod store;

pub use db::connection::{create_memory_pool, create_pool, DbPool};
pub use store::SqliteStore;
