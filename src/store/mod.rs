//! Storage Layer - repository records and their analysis history
//!
//! One document per repository, keyed by its canonical URL, with the
//! full analysis history embedded. Backed by SQLite:
//! - repositories(url, language, document)

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::models::RepositoryRecord;

/// Persistent record of repositories, addressable by canonical URL.
pub trait RepositoryStore: Send + Sync {
    /// Point lookup by URL.
    fn find(&self, url: &str) -> Result<Option<RepositoryRecord>>;

    /// Store a new record. Fails with `Error::Duplicate` if the URL exists.
    fn insert(&self, record: &RepositoryRecord) -> Result<()>;

    /// Replace the whole stored document for `record.url`.
    ///
    /// Callers read-modify-write the full history; fails with
    /// `Error::Persistence` when no record exists for the URL.
    fn replace(&self, record: &RepositoryRecord) -> Result<()>;

    /// A page of records ordered by URL: `skip` omitted, at most `limit` returned.
    fn list(&self, skip: u32, limit: u32) -> Result<Vec<RepositoryRecord>>;

    /// Number of stored records.
    fn count(&self) -> Result<u64>;
}
