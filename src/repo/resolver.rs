//! Head-revision lookups against the GitHub REST API.

use crate::config::GithubConfig;
use crate::error::{Error, Result};
use crate::models::RepoId;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolves the revision a repository's tracked branch currently points at.
#[async_trait]
pub trait CommitResolver: Send + Sync {
    /// Returns the head revision identifier, never an empty string.
    async fn resolve_head(&self, repo: &RepoId) -> Result<String>;
}

/// `GET /repos/{owner}/{name}/git/refs/heads/{branch}` response.
/// Only `object.sha` is consumed.
#[derive(Debug, Deserialize)]
struct RefResponse {
    object: Option<RefObject>,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: Option<String>,
}

/// Resolver backed by the GitHub refs endpoint.
pub struct GithubResolver {
    http_client: reqwest::Client,
    api_url: String,
    branch: String,
    token: Option<String>,
}

impl GithubResolver {
    /// Create a resolver with the configured timeouts.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("leakwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::resolution("*", format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            branch: config.branch.clone(),
            token: config.token.clone(),
        })
    }

    fn ref_url(&self, repo: &RepoId) -> String {
        format!(
            "{}/repos/{}/{}/git/refs/heads/{}",
            self.api_url,
            repo.owner(),
            repo.name(),
            self.branch
        )
    }
}

#[async_trait]
impl CommitResolver for GithubResolver {
    async fn resolve_head(&self, repo: &RepoId) -> Result<String> {
        let url = self.ref_url(repo);
        debug!("Resolving head of {} via {}", repo, url);

        let mut request = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::resolution(repo, "request timed out")
            } else if e.is_connect() {
                Error::resolution(repo, format!("cannot connect to {}", self.api_url))
            } else {
                Error::resolution(repo, format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("GitHub answered {} for {}: {}", status, repo, body.trim());
            return Err(Error::resolution(repo, format!("unexpected status {}", status)));
        }

        let parsed: RefResponse = response
            .json()
            .await
            .map_err(|e| Error::resolution(repo, format!("cannot decode response: {}", e)))?;

        let sha = head_sha(parsed).map_err(|reason| Error::resolution(repo, reason))?;
        debug!("Head of {} is {}", repo, sha);
        Ok(sha)
    }
}

/// Extract `object.sha` from a decoded refs response.
fn head_sha(parsed: RefResponse) -> std::result::Result<String, String> {
    match parsed.object.and_then(|o| o.sha) {
        Some(sha) if !sha.trim().is_empty() => Ok(sha),
        Some(_) => Err("empty revision in response".to_string()),
        None => Err("response has no object.sha".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_head_sha() {
        let body = r#"{
            "ref": "refs/heads/master",
            "url": "https://api.github.com/repos/octo/sample/git/refs/heads/master",
            "object": {"sha": "abc123", "type": "commit", "url": "https://example"}
        }"#;
        let parsed: RefResponse = serde_json::from_str(body).unwrap();
        assert_eq!(head_sha(parsed).unwrap(), "abc123");
    }

    #[test]
    fn test_head_sha_rejects_empty_and_missing() {
        for body in [r#"{"object": {"sha": ""}}"#, r#"{"object": {}}"#, r#"{"message": "Not Found"}"#] {
            let parsed: RefResponse = serde_json::from_str(body).unwrap();
            assert!(head_sha(parsed).is_err(), "{}", body);
        }
    }

    /// Serves exactly one HTTP response and returns the base URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn resolver_for(api_url: String) -> GithubResolver {
        let config = GithubConfig {
            api_url,
            ..GithubConfig::default()
        };
        GithubResolver::new(&config).unwrap()
    }

    #[test]
    fn test_ref_url() {
        let resolver = resolver_for("https://api.github.com/".to_string());
        let repo = RepoId::parse("octo/sample").unwrap();
        assert_eq!(
            resolver.ref_url(&repo),
            "https://api.github.com/repos/octo/sample/git/refs/heads/master"
        );
    }

    #[tokio::test]
    async fn test_resolve_head_success() {
        let base = serve_once("200 OK", r#"{"object":{"sha":"deadbeef"}}"#).await;
        let repo = RepoId::parse("octo/sample").unwrap();

        let sha = resolver_for(base).resolve_head(&repo).await.unwrap();
        assert_eq!(sha, "deadbeef");
    }

    #[tokio::test]
    async fn test_resolve_head_not_found_is_error() {
        let base = serve_once("404 Not Found", r#"{"message":"Not Found"}"#).await;
        let repo = RepoId::parse("octo/missing").unwrap();

        let err = resolver_for(base).resolve_head(&repo).await.unwrap_err();
        assert_eq!(err.kind(), "resolution");
    }

    #[tokio::test]
    async fn test_resolve_head_empty_sha_is_error() {
        let base = serve_once("200 OK", r#"{"object":{"sha":""}}"#).await;
        let repo = RepoId::parse("octo/sample").unwrap();

        let result = resolver_for(base).resolve_head(&repo).await;
        tokio_test::assert_err!(result);
    }

    #[tokio::test]
    async fn test_resolve_head_undecodable_body_is_error() {
        let base = serve_once("200 OK", "not json").await;
        let repo = RepoId::parse("octo/sample").unwrap();

        let err = resolver_for(base).resolve_head(&repo).await.unwrap_err();
        assert_eq!(err.kind(), "resolution");
    }
}
