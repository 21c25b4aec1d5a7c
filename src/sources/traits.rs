//! Collaborator ports and the entity types they exchange.
//!
//! The comparison engine performs no I/O of its own. Everything it needs
//! from the outside world (reports, commits, provider diffs, file source,
//! cached values) comes through the traits in this module, so callers can
//! back them with a database, an HTTP client, or the in-memory versions in
//! `sources::memory`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::CompareResponse;
use crate::report::Report;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A repository, identified by hosting service, owner and name. `yaml` is
/// the parsed form of the repository's committed configuration, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub service: String,
    pub owner: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaml: Option<serde_json::Value>,
}

impl Repository {
    pub fn new(
        service: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            owner: owner.into(),
            name: name.into(),
            yaml: None,
        }
    }
}

/// A commit record as stored by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub commitid: String,
    pub repository: Repository,
    #[serde(default)]
    pub deleted: bool,
}

impl Commit {
    pub fn new(commitid: impl Into<String>, repository: Repository) -> Self {
        Self {
            commitid: commitid.into(),
            repository,
            deleted: false,
        }
    }
}

/// A pull request record. `compared_to` names the alternate base commit a
/// pseudo-comparison substitutes for `base` when configuration permits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pull {
    pub pullid: u64,
    pub repository: Repository,
    pub base: String,
    pub head: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compared_to: Option<String>,
}

/// Full file content at a ref, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub content: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Version-control provider
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response parse error: {0}")]
    Parse(String),
}

/// Abstraction over the hosting provider's compare and source endpoints.
/// Both calls are asynchronous; the engine joins the forward and reverse
/// compare fetches and otherwise awaits at the comparison boundary.
#[async_trait]
pub trait RepoProvider: Send + Sync {
    /// Compare two refs: the commits between them and the diff.
    async fn get_compare(
        &self,
        base_id: &str,
        head_id: &str,
    ) -> Result<CompareResponse, ProviderError>;

    /// Fetch the full content of a file at a ref.
    async fn get_source(&self, path: &str, reference: &str)
        -> Result<SourceFile, ProviderError>;
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ReportStoreError {
    #[error("report not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Builds the coverage report for a commit from wherever reports live.
pub trait ReportStore: Send + Sync {
    fn build_report(&self, commit: &Commit) -> Result<Report, ReportStoreError>;
}

/// Looks up commit records.
pub trait CommitStore: Send + Sync {
    /// Find one commit by id within a repository.
    fn find_commit(
        &self,
        repository: &Repository,
        commitid: &str,
    ) -> anyhow::Result<Option<Commit>>;

    /// Find all commits in a repository whose ids appear in `commitids`.
    /// Deleted commits are included; callers filter.
    fn find_commits(
        &self,
        repository: &Repository,
        commitids: &[String],
    ) -> anyhow::Result<Vec<Commit>>;
}

// ---------------------------------------------------------------------------
// Cache and archive
// ---------------------------------------------------------------------------

/// Whole-value external cache with per-key TTLs. Read failures are treated
/// by the engine as "no cached value", never as fatal.
pub trait ChangeCache: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;
}

/// Read-only access to previously archived documents (impacted-file data).
pub trait ArchiveStore: Send + Sync {
    fn read_file(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}
