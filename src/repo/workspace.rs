//! Staging repositories onto local storage.
//!
//! A repository is shallow-cloned with git2 into
//! `{root}/{owner}/{name}` for the duration of one analysis run and
//! removed afterwards. [`WorkspaceGuard`] ties the removal to scope so
//! every exit path after a successful stage cleans up; a stage that is
//! dropped mid-clone removes its partial tree once the clone stops.

use crate::config::WorkspaceConfig;
use crate::error::{Error, Result};
use crate::models::RepoId;
use async_trait::async_trait;
use git2::{FetchOptions, Progress, RemoteCallbacks};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Materializes repositories for analysis and removes them again.
#[async_trait]
pub trait WorkspaceManager: Send + Sync {
    /// Fetch the repository's tracked branch into a fresh local directory.
    async fn stage(&self, repo: &RepoId) -> Result<PathBuf>;

    /// Remove the directory created by [`stage`](Self::stage).
    ///
    /// Removing a workspace that does not exist succeeds.
    fn unstage(&self, repo: &RepoId) -> Result<()>;
}

/// Scoped handle on a staged workspace.
///
/// Dropping the guard unstages best-effort; [`release`](Self::release)
/// does the same but hands the outcome back to the caller.
pub struct WorkspaceGuard<'a> {
    manager: &'a dyn WorkspaceManager,
    repo: RepoId,
    path: PathBuf,
    released: bool,
}

impl<'a> WorkspaceGuard<'a> {
    /// Stage `repo` and wrap the result in a guard.
    pub async fn stage(manager: &'a dyn WorkspaceManager, repo: &RepoId) -> Result<Self> {
        let path = manager.stage(repo).await?;
        Ok(Self {
            manager,
            repo: repo.clone(),
            path,
            released: false,
        })
    }

    /// Root of the staged tree.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unstage now and report the outcome.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.manager.unstage(&self.repo)
    }
}

impl Drop for WorkspaceGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.manager.unstage(&self.repo) {
            warn!("Failed to clean up workspace for {}: {}", self.repo, e);
        }
    }
}

/// Workspace manager that clones over git.
pub struct GitWorkspace {
    root: PathBuf,
    clone_url: String,
    branch: Option<String>,
    depth: i32,
}

impl GitWorkspace {
    /// Create a manager staging under `config.root`, cloning from
    /// `{clone_url}/{owner}/{name}`.
    pub fn new(config: &WorkspaceConfig, clone_url: &str, branch: Option<String>) -> Self {
        Self {
            root: config.root.clone(),
            clone_url: clone_url.trim_end_matches('/').to_string(),
            branch,
            depth: config.depth,
        }
    }

    /// Directory a repository is staged into.
    pub fn path_for(&self, repo: &RepoId) -> PathBuf {
        self.root.join(repo.owner()).join(repo.name())
    }

    fn remote_url(&self, repo: &RepoId) -> String {
        format!("{}/{}/{}", self.clone_url, repo.owner(), repo.name())
    }
}

#[async_trait]
impl WorkspaceManager for GitWorkspace {
    async fn stage(&self, repo: &RepoId) -> Result<PathBuf> {
        let path = self.path_for(repo);

        // Left behind by a crashed run.
        if path.exists() {
            debug!("Removing stale workspace: {}", path.display());
            self.unstage(repo)?;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::staging(repo, format!("cannot create directory: {}", e)))?;
        }

        let url = self.remote_url(repo);
        let options = CloneOptions {
            branch: self.branch.clone(),
            depth: self.depth,
        };
        let target = path.clone();

        // The blocking clone outlives this future when the caller is
        // dropped mid-clone; whichever side finishes last removes the tree.
        let state = Arc::new(Mutex::new(CloneState::default()));
        let mut pending = PendingClone {
            path: path.clone(),
            state: Arc::clone(&state),
            armed: true,
        };

        info!("Cloning {} into {}", url, path.display());
        let joined = tokio::task::spawn_blocking(move || {
            let result = clone_repository(&url, &target, &options, &state);
            let mut shared = lock_state(&state);
            if shared.cancelled {
                debug!("Clone of {} was abandoned, removing {}", url, target.display());
                if let Err(e) = remove_tree(&target) {
                    warn!("Failed to remove abandoned clone {}: {}", target.display(), e);
                }
            } else {
                shared.finished = true;
            }
            result
        })
        .await;
        pending.armed = false;

        let cloned = match joined {
            Ok(cloned) => cloned,
            Err(e) => Err(format!("clone task failed: {}", e)),
        };

        if let Err(e) = cloned {
            if let Err(cleanup) = self.unstage(repo) {
                warn!("Failed to remove partial clone of {}: {}", repo, cleanup);
            }
            return Err(Error::staging(repo, e));
        }

        Ok(path)
    }

    fn unstage(&self, repo: &RepoId) -> Result<()> {
        let path = self.path_for(repo);
        remove_tree(&path).map_err(|e| {
            Error::staging(repo, format!("cannot remove {}: {}", path.display(), e))
        })
    }
}

/// Remove a staged tree and, when it was the last one, its owner directory.
fn remove_tree(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!("Removed workspace: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    // Only succeeds when no sibling repository of the same owner is staged.
    if let Some(owner_dir) = path.parent() {
        let _ = std::fs::remove_dir(owner_dir);
    }

    Ok(())
}

/// Hand-off between a clone task and the future awaiting it.
#[derive(Debug, Default)]
struct CloneState {
    /// The awaiting future was dropped before the clone finished.
    cancelled: bool,
    /// The clone task is done and left its tree to the awaiting future.
    finished: bool,
}

fn lock_state(state: &Mutex<CloneState>) -> MutexGuard<'_, CloneState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cleans up after a clone whose caller went away.
struct PendingClone {
    path: PathBuf,
    state: Arc<Mutex<CloneState>>,
    armed: bool,
}

impl Drop for PendingClone {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut state = lock_state(&self.state);
        if state.finished {
            // The task already returned; nobody else will remove the tree.
            if let Err(e) = remove_tree(&self.path) {
                warn!("Failed to remove abandoned clone {}: {}", self.path.display(), e);
            }
        } else {
            // The task removes the tree once the clone stops.
            state.cancelled = true;
        }
    }
}

/// Options for cloning a repository.
#[derive(Debug, Clone)]
struct CloneOptions {
    /// Branch to checkout (None for the remote's default branch).
    branch: Option<String>,
    /// Clone depth; zero or less means full history.
    depth: i32,
}

/// Clone `url` into `path`.
///
/// The transfer is aborted once `state` is marked cancelled.
fn clone_repository(
    url: &str,
    path: &Path,
    options: &CloneOptions,
    state: &Mutex<CloneState>,
) -> std::result::Result<(), String> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(|progress: Progress<'_>| {
        if progress.received_objects() == progress.total_objects() {
            debug!("Received {} objects", progress.total_objects());
        }
        !lock_state(state).cancelled
    });

    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(callbacks);
    if options.depth > 0 {
        fetch_opts.depth(options.depth);
    }

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_opts);

    if let Some(ref branch) = options.branch {
        builder.branch(branch);
    }

    builder
        .clone(url, path)
        .map_err(|e| format!("failed to clone {}: {}", url, e.message()))?;

    debug!("Cloned {} to {}", url, path.display());
    Ok(())
}
