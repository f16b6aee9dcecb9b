//! Record store for coldvault
//!
//! The services only see the repository contracts in [`repository`]. Two stores implement
//! them: [`InMemoryRecordStore`] for development and tests, and [`PgRecordStore`] backed by
//! PostgreSQL through sqlx.

pub mod memory;
pub mod postgres;
pub mod repository;
mod rows;
pub mod setup;

pub use memory::InMemoryRecordStore;
pub use postgres::PgRecordStore;
pub use repository::{
    ChangeSet, FileRecordRepository, FileSearch, Page, PageRequest, RecordChange, RecordStore,
    UploadSessionRepository,
};
pub use setup::{connect, run_migrations};
