//! SQLite storage implementation

use super::{schema, RepositoryStore};
use crate::error::{Error, Result};
use crate::models::RepositoryRecord;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed repository store.
///
/// The connection is shared; every operation holds it for a single
/// statement only.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Persistence(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Persistence("connection lock poisoned".to_string()))
    }
}

impl RepositoryStore for SqliteStore {
    fn find(&self, url: &str) -> Result<Option<RepositoryRecord>> {
        let document: Option<String> = self
            .conn()?
            .query_row(
                "SELECT document FROM repositories WHERE url = ?1",
                [url],
                |row| row.get(0),
            )
            .optional()?;

        match document {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    fn insert(&self, record: &RepositoryRecord) -> Result<()> {
        let document = serde_json::to_string(record)?;
        let result = self.conn()?.execute(
            "INSERT INTO repositories (url, language, document) VALUES (?1, ?2, ?3)",
            params![record.url, record.language, document],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::Duplicate(record.url.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn replace(&self, record: &RepositoryRecord) -> Result<()> {
        let document = serde_json::to_string(record)?;
        let updated = self.conn()?.execute(
            "UPDATE repositories SET language = ?2, document = ?3 WHERE url = ?1",
            params![record.url, record.language, document],
        )?;

        if updated == 0 {
            return Err(Error::Persistence(format!(
                "no stored repository for {}",
                record.url
            )));
        }
        Ok(())
    }

    fn list(&self, skip: u32, limit: u32) -> Result<Vec<RepositoryRecord>> {
        let documents: Vec<String> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT document FROM repositories ORDER BY url LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit, skip], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()?
        };

        documents
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(Error::from))
            .collect()
    }

    fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM repositories", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisRecord, Finding};

    fn record(url: &str) -> RepositoryRecord {
        RepositoryRecord::new(url.to_string(), Some("GO".to_string()))
    }

    #[test]
    fn test_insert_and_find() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record("github.com/octo/sample")).unwrap();

        let found = store.find("github.com/octo/sample").unwrap().unwrap();
        assert_eq!(found.url, "github.com/octo/sample");
        assert!(found.analysis.is_empty());
        assert_eq!(found.language.as_deref(), Some("GO"));

        assert!(store.find("github.com/octo/other").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record("github.com/octo/sample")).unwrap();

        let err = store.insert(&record("github.com/octo/sample")).unwrap_err();
        assert!(matches!(err, Error::Duplicate(url) if url == "github.com/octo/sample"));
    }

    #[test]
    fn test_replace_whole_document() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut repo = record("github.com/octo/sample");
        store.insert(&repo).unwrap();

        repo.push_analysis(AnalysisRecord::completed_now(
            "abc123".to_string(),
            vec![Finding {
                message: "unused import".to_string(),
                file: "main.go".to_string(),
                line: 4,
                column: 2,
            }],
        ));
        repo.language = None;
        store.replace(&repo).unwrap();

        let found = store.find("github.com/octo/sample").unwrap().unwrap();
        assert_eq!(found, repo);
    }

    #[test]
    fn test_replace_missing_fails() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.replace(&record("github.com/octo/ghost")).unwrap_err();
        assert_eq!(err.kind(), "persistence");
    }

    #[test]
    fn test_list_pages_in_url_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        for name in ["e", "c", "a", "d", "b"] {
            store.insert(&record(&format!("github.com/octo/{}", name))).unwrap();
        }

        let page = store.list(0, 2).unwrap();
        let urls: Vec<&str> = page.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["github.com/octo/a", "github.com/octo/b"]);

        let page = store.list(3, 10).unwrap();
        let urls: Vec<&str> = page.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["github.com/octo/d", "github.com/octo/e"]);

        assert!(store.list(5, 10).unwrap().is_empty());
        assert!(store.list(0, 0).unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 5);
    }

    #[test]
    fn test_schema_indexes_only_the_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.conn().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND sql IS NOT NULL")
            .unwrap();
        let explicit: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert!(explicit.is_empty(), "{:?}", explicit);
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("leakwatch.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert(&record("github.com/octo/sample")).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.find("github.com/octo/sample").unwrap().is_some());
    }
}
