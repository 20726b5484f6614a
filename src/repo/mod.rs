//! Hosting-service collaborators.
//!
//! Head-revision resolution and local staging of repositories.

pub mod resolver;
pub mod workspace;

pub use resolver::{CommitResolver, GithubResolver};
pub use workspace::{GitWorkspace, WorkspaceGuard, WorkspaceManager};
