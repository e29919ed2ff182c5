//! Local entity store: the persistent workplace cache.
//!
//! This module is split into three submodules:
//! - `repo`: SQL-only functions that map rows into `WorkPlace` values.
//! - `writer`: the single-writer task every mutation is funnelled through.
//! - `store`: `EntityStore`, the handle the repository talks to.
//!
//! Reads go straight to the pool; writes are serialized by the writer so a
//! bulk replace and a single-row flag update can never interleave.

pub mod repo;
pub mod store;
pub mod writer;

use thiserror::Error;

pub use repo::{init_pool, run_migrations, Pool};
pub use store::EntityStore;
pub use writer::WriteHandle;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("work place has no key")]
    MissingKey,
    #[error("entity store writer is no longer running")]
    WriterClosed,
}
