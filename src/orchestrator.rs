//! The analysis pipeline.
//!
//! [`Orchestrator::analyse`] resolves a repository's head revision,
//! returns the stored report when it was computed for that revision, and
//! otherwise stages the repository, runs the analyzer and appends the
//! new result to the stored history.

use crate::analysis::Analyzer;
use crate::error::{Error, Result};
use crate::models::{AnalysisRecord, RepoId, RepositoryRecord};
use crate::repo::{CommitResolver, WorkspaceGuard, WorkspaceManager};
use crate::store::RepositoryStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Values stamped onto records the orchestrator creates.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Host prefix of canonical URLs, e.g. `github.com`.
    pub host: String,
    /// Language tag for newly created records.
    pub language: Option<String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            host: "github.com".to_string(),
            language: Some("GO".to_string()),
        }
    }
}

type InFlight = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Composes resolver, workspace, analyzer and store into the service operations.
pub struct Orchestrator {
    resolver: Arc<dyn CommitResolver>,
    workspace: Arc<dyn WorkspaceManager>,
    analyzer: Arc<dyn Analyzer>,
    store: Arc<dyn RepositoryStore>,
    settings: OrchestratorSettings,
    in_flight: Arc<InFlight>,
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<dyn CommitResolver>,
        workspace: Arc<dyn WorkspaceManager>,
        analyzer: Arc<dyn Analyzer>,
        store: Arc<dyn RepositoryStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            resolver,
            workspace,
            analyzer,
            store,
            settings,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return an up-to-date report for `repo`, computing it if needed.
    pub async fn analyse(&self, repo: &RepoId) -> Result<RepositoryRecord> {
        let url = repo.canonical_url(&self.settings.host);
        let revision = self.resolver.resolve_head(repo).await?;
        debug!("{} is at {}", url, revision);

        // Concurrent requests for one repository run one after another;
        // later ones usually find the fresh result and hit the cache.
        let _in_flight = InFlightGuard::acquire(&self.in_flight, &url).await;

        let mut record = match self.store.find(&url)? {
            Some(record) => record,
            None => self.create_record(&url)?,
        };

        if record.is_current_for(&revision) {
            info!("Cache hit for {} at {}", url, revision);
            return Ok(record);
        }

        info!(
            "Analyzing {} at {} ({} previous runs)",
            url,
            revision,
            record.analysis.len()
        );
        let start = Instant::now();

        let findings = {
            let workspace = WorkspaceGuard::stage(self.workspace.as_ref(), repo).await?;
            let findings = self.analyzer.analyze(workspace.path()).await;
            if let Err(e) = workspace.release() {
                warn!("Failed to clean up workspace for {}: {}", repo, e);
            }
            findings?
        };

        info!(
            "Analysis of {} finished in {:.1}s with {} findings",
            url,
            start.elapsed().as_secs_f64(),
            findings.len()
        );

        record.push_analysis(AnalysisRecord::completed_now(revision, findings));
        self.store.replace(&record)?;
        Ok(record)
    }

    /// A page of stored repositories.
    ///
    /// Bounds are validated here, before the store is touched.
    pub fn list(&self, skip: i64, limit: i64) -> Result<Vec<RepositoryRecord>> {
        let skip = u32::try_from(skip).map_err(|_| {
            Error::InvalidArgument(format!("skip must be a non-negative integer, got {}", skip))
        })?;
        let limit = u32::try_from(limit).map_err(|_| {
            Error::InvalidArgument(format!("limit must be a non-negative integer, got {}", limit))
        })?;

        self.store.list(skip, limit)
    }

    /// Insert an empty record for a repository seen for the first time.
    ///
    /// Losing the insert race to another request is not an error: the
    /// record that won is read back and used instead.
    fn create_record(&self, url: &str) -> Result<RepositoryRecord> {
        let record = RepositoryRecord::new(url.to_string(), self.settings.language.clone());

        match self.store.insert(&record) {
            Ok(()) => {
                info!("Tracking new repository {}", url);
                Ok(record)
            }
            Err(Error::Duplicate(_)) => {
                debug!("{} was inserted concurrently, re-reading", url);
                self.store.find(url)?.ok_or_else(|| {
                    Error::Persistence(format!("{} vanished after duplicate insert", url))
                })
            }
            Err(e) => Err(e),
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

/// Holds the per-repository lock and drops the map entry once unused.
struct InFlightGuard {
    map: Arc<InFlight>,
    url: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InFlightGuard {
    async fn acquire(map: &Arc<InFlight>, url: &str) -> Self {
        let lock = {
            let mut entries = map.lock().unwrap_or_else(|e| e.into_inner());
            entries
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        Self {
            map: Arc::clone(map),
            url: url.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut entries = self.map.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map itself still references the lock.
        let unused = entries
            .get(&self.url)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            entries.remove(&self.url);
        }
    }
}
