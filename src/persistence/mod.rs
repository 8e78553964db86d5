//! Event Persistence
//!
//! Best-effort storage of every decoded event. The bridge only ever writes
//! through [`EventStore::save`]; it never reads back.
//!
//! - [`SqliteStore`]: SQLite-backed store
//! - [`DiscardStore`]: accepts and drops everything (persistence disabled)
//! - [`PersistenceWorker`]: bounded background queue in front of a store

mod sqlite;
mod worker;

pub use sqlite::SqliteStore;
pub use worker::{PersistenceStats, PersistenceWorker, WorkerConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::events::EventRecord;

/// Storage collaborator for decoded events
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one record
    async fn save(&self, record: &EventRecord) -> Result<(), PersistenceError>;
}

/// Store that drops every record
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardStore;

#[async_trait]
impl EventStore for DiscardStore {
    async fn save(&self, record: &EventRecord) -> Result<(), PersistenceError> {
        tracing::trace!(record = record.label(), "Persistence disabled, record discarded");
        Ok(())
    }
}

/// Errors raised by event stores
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store task failed: {0}")]
    Task(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;
