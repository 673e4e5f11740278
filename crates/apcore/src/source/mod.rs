//! Remote repository metadata.
//!
//! The update engine only needs two questions answered: does a repository
//! exist, and what has it released. [`SourceClient`] is that seam;
//! [`github::GitHubClient`] answers it against the GitHub REST API.

pub mod github;

use serde::Deserialize;

pub use github::GitHubClient;

/// A resolved upstream repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    /// Canonical `owner/repo` (case as GitHub reports it).
    pub full_name: String,
    /// HTTPS clone URL.
    pub clone_url: String,
    #[serde(default)]
    pub default_branch: String,
}

/// A file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("repository '{0}' does not exist")]
    NotFound(String),
    #[error("no releases have been published")]
    NoReleases,
    #[error("GitHub API rate limit exceeded (set github_token to raise it)")]
    RateLimited,
    #[error("request failed: {0}")]
    Request(String),
}

/// Read access to an upstream source host.
pub trait SourceClient {
    /// Resolve `owner/repo`. Fails with [`SourceError::NotFound`] when it does not exist.
    fn repository(&self, slug: &str) -> Result<Repository, SourceError>;

    /// Published releases, newest first.
    ///
    /// Callers rely on this order: the first qualifying release is taken as the
    /// latest. Fails with [`SourceError::NoReleases`] when there are none.
    fn releases(&self, repo: &Repository) -> Result<Vec<Release>, SourceError>;
}
