//! In-memory implementations of the collaborator ports.
//!
//! Useful for tests and for embedding the engine where reports and diffs
//! are already in hand.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{
    ArchiveStore, ChangeCache, Commit, CommitStore, ProviderError, RepoProvider, Repository,
    ReportStore, ReportStoreError, SourceFile,
};
use crate::diff::CompareResponse;
use crate::report::Report;

/// [`RepoProvider`] backed by pre-loaded compare responses and sources.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    compares: HashMap<(String, String), CompareResponse>,
    sources: HashMap<(String, String), Vec<u8>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the response for `get_compare(base_id, head_id)`.
    pub fn add_compare(
        &mut self,
        base_id: impl Into<String>,
        head_id: impl Into<String>,
        response: CompareResponse,
    ) {
        self.compares
            .insert((base_id.into(), head_id.into()), response);
    }

    /// Register the content for `get_source(path, reference)`.
    pub fn add_source(
        &mut self,
        path: impl Into<String>,
        reference: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) {
        self.sources
            .insert((path.into(), reference.into()), content.into());
    }
}

#[async_trait]
impl RepoProvider for MemoryProvider {
    async fn get_compare(
        &self,
        base_id: &str,
        head_id: &str,
    ) -> Result<CompareResponse, ProviderError> {
        self.compares
            .get(&(base_id.to_owned(), head_id.to_owned()))
            .cloned()
            .ok_or_else(|| ProviderError::Request(format!("no compare for {base_id}..{head_id}")))
    }

    async fn get_source(
        &self,
        path: &str,
        reference: &str,
    ) -> Result<SourceFile, ProviderError> {
        self.sources
            .get(&(path.to_owned(), reference.to_owned()))
            .map(|content| SourceFile {
                content: content.clone(),
            })
            .ok_or_else(|| ProviderError::Request(format!("no source for {path}@{reference}")))
    }
}

/// [`ReportStore`] keyed by commit id.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: HashMap<String, Report>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_report(&mut self, commitid: impl Into<String>, report: Report) {
        self.reports.insert(commitid.into(), report);
    }
}

impl ReportStore for MemoryReportStore {
    fn build_report(&self, commit: &Commit) -> Result<Report, ReportStoreError> {
        self.reports
            .get(&commit.commitid)
            .cloned()
            .ok_or(ReportStoreError::NotFound)
    }
}

/// [`CommitStore`] over a flat list of commits.
#[derive(Debug, Default)]
pub struct MemoryCommitStore {
    commits: Vec<Commit>,
}

impl MemoryCommitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_commit(&mut self, commit: Commit) {
        self.commits.push(commit);
    }
}

impl CommitStore for MemoryCommitStore {
    fn find_commit(
        &self,
        repository: &Repository,
        commitid: &str,
    ) -> anyhow::Result<Option<Commit>> {
        Ok(self
            .commits
            .iter()
            .find(|c| {
                c.commitid == commitid
                    && c.repository.service == repository.service
                    && c.repository.owner == repository.owner
                    && c.repository.name == repository.name
            })
            .cloned())
    }

    fn find_commits(
        &self,
        repository: &Repository,
        commitids: &[String],
    ) -> anyhow::Result<Vec<Commit>> {
        Ok(self
            .commits
            .iter()
            .filter(|c| {
                commitids.contains(&c.commitid)
                    && c.repository.service == repository.service
                    && c.repository.owner == repository.owner
                    && c.repository.name == repository.name
            })
            .cloned()
            .collect())
    }
}

/// [`ChangeCache`] over a mutex-guarded map. TTLs are recorded but never
/// expire; tests can inspect them through [`MemoryCache::entry`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Duration)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored value and TTL for a key, if present.
    pub fn entry(&self, key: &str) -> Option<(String, Duration)> {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .get(key)
            .cloned()
    }
}

impl ChangeCache for MemoryCache {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("cache mutex poisoned")
            .get(key)
            .map(|(value, _)| value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .insert(key.to_owned(), (value.to_owned(), ttl));
        Ok(())
    }
}

/// [`ArchiveStore`] over pre-loaded documents.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }
}

impl ArchiveStore for MemoryArchive {
    fn read_file(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no archived file at {path}"))
    }
}
