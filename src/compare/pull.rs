//! Pull-request comparisons.
//!
//! A [`PullRequestComparison`] resolves its base and head commits from a
//! pull record, supports "pseudo-comparisons" (substituting the pull's
//! configured `compared_to` commit for the true base when the repository
//! or site configuration allows it), and remembers which files had
//! unexpected coverage changes in an external cache, so later requests can
//! skip traversing files known to be unchanged.

use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::OnceCell;

use super::{CompareContext, Comparison, FileComparison, FileComparisons};
use crate::config;
use crate::diff::CompareDiff;
use crate::error::{CompareError, CompareSide};
use crate::sources::traits::{Commit, Pull};

/// Lifetime of the changed-files cache entry.
const CHANGED_FILES_TTL: Duration = Duration::from_secs(86_400);

/// A [`Comparison`] resolved from a pull request.
pub struct PullRequestComparison<'a> {
    ctx: CompareContext<'a>,
    pull: Pull,
    inner: OnceLock<Comparison<'a>>,
    pseudo_diff: OnceCell<CompareDiff>,
    files_with_changes: OnceLock<Option<Vec<String>>>,
}

impl<'a> PullRequestComparison<'a> {
    pub fn new(ctx: CompareContext<'a>, pull: Pull) -> Self {
        Self {
            ctx,
            pull,
            inner: OnceLock::new(),
            pseudo_diff: OnceCell::new(),
            files_with_changes: OnceLock::new(),
        }
    }

    pub fn pull(&self) -> &Pull {
        &self.pull
    }

    /// True when configuration permits pseudo-comparisons and the pull has
    /// a `compared_to` commit to substitute. Configuration alone is never
    /// enough: without `compared_to` this is always false.
    pub fn is_pseudo_comparison(&self) -> bool {
        config::repo_bool(
            &self.pull.repository,
            &["covcompare", "allow_pseudo_compare"],
            self.ctx.settings.allow_pseudo_compare,
        ) && self.pull.compared_to.is_some()
    }

    /// Whether base reports may be line-shifted to compensate for a pseudo
    /// diff that moves tracked lines.
    pub fn allow_coverage_offsets(&self) -> bool {
        config::repo_bool(
            &self.pull.repository,
            &["covcompare", "allow_coverage_offsets"],
            self.ctx.settings.allow_coverage_offsets,
        )
    }

    /// The commit id the base side resolves to: `compared_to` in pseudo
    /// mode, the pull's true base otherwise.
    fn base_commitid(&self) -> &str {
        match (self.is_pseudo_comparison(), &self.pull.compared_to) {
            (true, Some(compared_to)) => compared_to,
            _ => &self.pull.base,
        }
    }

    fn resolve_commit(&self, commitid: &str, side: CompareSide) -> Result<Commit, CompareError> {
        self.ctx
            .commits
            .find_commit(&self.pull.repository, commitid)
            .map_err(CompareError::Store)?
            .ok_or(CompareError::MissingCommit(side))
    }

    /// The underlying commit comparison, resolving both commits on first
    /// use. Fails with [`CompareError::MissingCommit`] when the pull refers
    /// to a commit the store does not know.
    pub fn comparison(&self) -> Result<&Comparison<'a>, CompareError> {
        if let Some(comparison) = self.inner.get() {
            return Ok(comparison);
        }
        let base = self.resolve_commit(self.base_commitid(), CompareSide::Base)?;
        let head = self.resolve_commit(&self.pull.head, CompareSide::Head)?;
        Ok(self
            .inner
            .get_or_init(|| Comparison::new(self.ctx, base, head)))
    }

    pub async fn validate(&self) -> Result<(), CompareError> {
        self.comparison()?.validate().await
    }

    /// The diff between the pull's `compared_to` and `base` commits. Only
    /// meaningful for pseudo-comparisons.
    pub async fn pseudo_diff(&self) -> Result<&CompareDiff, CompareError> {
        self.pseudo_diff
            .get_or_try_init(|| async {
                let compared_to = self
                    .pull
                    .compared_to
                    .as_deref()
                    .ok_or(CompareError::MissingCommit(CompareSide::Base))?;
                let response = self
                    .ctx
                    .provider
                    .get_compare(compared_to, &self.pull.base)
                    .await?;
                Ok(response.diff)
            })
            .await
    }

    /// True when this is a pseudo-comparison whose substituted base report
    /// cannot be trusted as-is: tracked lines moved between `compared_to`
    /// and `base`. Callers should then either reject the comparison or,
    /// when [`Self::allow_coverage_offsets`] permits, repair the base
    /// report with [`Self::update_base_report_with_pseudo_diff`].
    pub async fn pseudo_diff_adjusts_tracked_lines(&self) -> Result<bool, CompareError> {
        if !self.is_pseudo_comparison() || self.pull.compared_to.as_deref() == Some(&self.pull.base)
        {
            return Ok(false);
        }

        let comparison = self.comparison()?;
        let head_report = comparison.head_report().await?;
        let base_report = comparison.base_report()?;

        let pseudo_diff = self.pseudo_diff().await?;
        if pseudo_diff.files.is_empty() {
            return Ok(false);
        }

        let future_diff = &comparison.git_comparison().await?.diff;
        Ok(base_report.does_diff_adjust_tracked_lines(pseudo_diff, head_report, future_diff))
    }

    /// Shift the base report's line numbers forward along the pseudo diff.
    /// Not invoked automatically: the caller decides, after checking
    /// [`Self::pseudo_diff_adjusts_tracked_lines`], whether to repair.
    pub async fn update_base_report_with_pseudo_diff(&mut self) -> Result<(), CompareError> {
        self.comparison()?.base_report()?;
        let pseudo_diff = self.pseudo_diff().await?.clone();

        let report = self
            .inner
            .get_mut()
            .and_then(Comparison::base_report_mut)
            .expect("base report was just built");
        report.shift_lines_by_diff(&pseudo_diff, true);
        Ok(())
    }

    /// Cache key for this pull's changed-files set.
    fn changed_files_key(&self) -> String {
        format!(
            "compare-changed-files/{}/{}/{}/{}",
            self.pull.repository.service,
            self.pull.repository.owner,
            self.pull.repository.name,
            self.pull.pullid,
        )
    }

    /// The cached set of files with unexpected coverage changes. `None`
    /// when the cache has no value or cannot be reached; the engine then
    /// falls back to traversing every file.
    fn files_with_changes(&self) -> Option<&[String]> {
        self.files_with_changes
            .get_or_init(|| match self.ctx.cache.get(&self.changed_files_key()) {
                Ok(Some(raw)) => match serde_json::from_str::<Option<Vec<String>>>(&raw) {
                    Ok(changes) => {
                        log::info!(
                            "found {} files with changes in cache",
                            changes.as_ref().map_or(0, Vec::len)
                        );
                        changes
                    }
                    Err(e) => {
                        log::warn!("discarding unreadable changed-files cache entry: {e}");
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    log::warn!("error reading changed-files cache: {e}");
                    None
                }
            })
            .as_deref()
    }

    fn store_files_with_changes(&self, changed: &[String]) {
        let value = match serde_json::to_string(changed) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("failed to serialize changed-files set: {e}");
                return;
            }
        };
        match self
            .ctx
            .cache
            .set(&self.changed_files_key(), &value, CHANGED_FILES_TTL)
        {
            Ok(()) => log::info!("stored {} files with changes in cache", changed.len()),
            Err(e) => log::warn!("error writing changed-files cache: {e}"),
        }
    }

    /// Iterate per-file comparisons like [`Comparison::files`], feeding
    /// each file the cached changed-files hint, recording which files turn
    /// out to have changes, and pushing that set to the external cache once
    /// the sequence is exhausted.
    pub async fn files(&self) -> Result<PullFileComparisons<'_, 'a>, CompareError> {
        let inner = self.comparison()?.files().await?;
        Ok(PullFileComparisons {
            pull_comparison: self,
            inner,
            changed: Vec::new(),
            done: false,
        })
    }

    /// Like [`Comparison::get_file_comparison`], with the cached
    /// changed-files hint applied.
    pub async fn get_file_comparison(
        &self,
        file_name: &str,
        with_src: bool,
        bypass_max_diff: bool,
    ) -> Result<FileComparison, CompareError> {
        let comparison = self
            .comparison()?
            .get_file_comparison(file_name, with_src, bypass_max_diff)
            .await?;
        Ok(comparison.with_should_search_for_changes(self.search_hint(file_name)))
    }

    fn search_hint(&self, file_name: &str) -> Option<bool> {
        self.files_with_changes()
            .map(|changed| changed.iter().any(|name| name == file_name))
    }
}

/// [`FileComparisons`] wrapper that records files with changes and writes
/// the set to the external cache when the sequence ends.
pub struct PullFileComparisons<'c, 'a> {
    pull_comparison: &'c PullRequestComparison<'a>,
    inner: FileComparisons<'c>,
    changed: Vec<String>,
    done: bool,
}

impl Iterator for PullFileComparisons<'_, '_> {
    type Item = Result<FileComparison, CompareError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(comparison) => {
                let name = comparison.name().head;
                let comparison = comparison.with_should_search_for_changes(
                    name.as_deref()
                        .and_then(|name| self.pull_comparison.search_hint(name)),
                );
                match comparison.has_changes() {
                    Ok(true) => {
                        if let Some(name) = name {
                            self.changed.push(name);
                        }
                    }
                    Ok(false) => {}
                    Err(e) => return Some(Err(e)),
                }
                Some(Ok(comparison))
            }
            None => {
                if !self.done {
                    self.done = true;
                    self.pull_comparison.store_files_with_changes(&self.changed);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteSettings;
    use crate::sources::memory::{
        MemoryCache, MemoryCommitStore, MemoryProvider, MemoryReportStore,
    };
    use crate::sources::traits::{ChangeCache, Repository};
    use serde_json::json;

    struct Stubs {
        provider: MemoryProvider,
        reports: MemoryReportStore,
        commits: MemoryCommitStore,
        cache: MemoryCache,
        settings: SiteSettings,
    }

    impl Stubs {
        fn new() -> Self {
            Self {
                provider: MemoryProvider::new(),
                reports: MemoryReportStore::new(),
                commits: MemoryCommitStore::new(),
                cache: MemoryCache::new(),
                settings: SiteSettings::default(),
            }
        }

        fn ctx(&self) -> CompareContext<'_> {
            CompareContext {
                provider: &self.provider,
                reports: &self.reports,
                commits: &self.commits,
                cache: &self.cache,
                settings: &self.settings,
            }
        }
    }

    fn pull(repository: Repository, compared_to: Option<&str>) -> Pull {
        Pull {
            pullid: 7,
            repository,
            base: "base-sha".to_owned(),
            head: "head-sha".to_owned(),
            compared_to: compared_to.map(str::to_owned),
        }
    }

    #[test]
    fn test_pseudo_comparison_requires_compared_to() {
        let stubs = Stubs::new();
        let repo = Repository::new("github", "acme", "widget");

        // Site default allows pseudo-compare, but no compared_to
        let comparison = PullRequestComparison::new(stubs.ctx(), pull(repo.clone(), None));
        assert!(!comparison.is_pseudo_comparison());

        // compared_to present: enabled
        let comparison =
            PullRequestComparison::new(stubs.ctx(), pull(repo, Some("older-sha")));
        assert!(comparison.is_pseudo_comparison());
    }

    #[test]
    fn test_pseudo_comparison_respects_repo_yaml() {
        let stubs = Stubs::new();
        let mut repo = Repository::new("github", "acme", "widget");
        repo.yaml = Some(json!({"covcompare": {"allow_pseudo_compare": false}}));

        let comparison =
            PullRequestComparison::new(stubs.ctx(), pull(repo, Some("older-sha")));
        assert!(!comparison.is_pseudo_comparison());
    }

    #[test]
    fn test_base_resolves_to_compared_to_in_pseudo_mode() {
        let stubs = Stubs::new();
        let repo = Repository::new("github", "acme", "widget");

        let comparison =
            PullRequestComparison::new(stubs.ctx(), pull(repo.clone(), Some("older-sha")));
        assert_eq!(comparison.base_commitid(), "older-sha");

        let comparison = PullRequestComparison::new(stubs.ctx(), pull(repo, None));
        assert_eq!(comparison.base_commitid(), "base-sha");
    }

    #[test]
    fn test_missing_commit_error() {
        let stubs = Stubs::new();
        let repo = Repository::new("github", "acme", "widget");
        let comparison = PullRequestComparison::new(stubs.ctx(), pull(repo, None));
        let err = comparison.comparison().unwrap_err();
        assert!(matches!(err, CompareError::MissingCommit(CompareSide::Base)));
    }

    #[test]
    fn test_changed_files_key_format() {
        let stubs = Stubs::new();
        let repo = Repository::new("github", "acme", "widget");
        let comparison = PullRequestComparison::new(stubs.ctx(), pull(repo, None));
        assert_eq!(
            comparison.changed_files_key(),
            "compare-changed-files/github/acme/widget/7"
        );
    }

    #[test]
    fn test_search_hint_from_cache() {
        let stubs = Stubs::new();
        let repo = Repository::new("github", "acme", "widget");
        stubs
            .cache
            .set(
                "compare-changed-files/github/acme/widget/7",
                r#"["changed.py"]"#,
                CHANGED_FILES_TTL,
            )
            .unwrap();

        let comparison = PullRequestComparison::new(stubs.ctx(), pull(repo, None));
        assert_eq!(comparison.search_hint("changed.py"), Some(true));
        assert_eq!(comparison.search_hint("other.py"), Some(false));
    }

    #[test]
    fn test_search_hint_unknown_without_cache_value() {
        let stubs = Stubs::new();
        let repo = Repository::new("github", "acme", "widget");
        let comparison = PullRequestComparison::new(stubs.ctx(), pull(repo, None));
        assert_eq!(comparison.search_hint("anything.py"), None);
    }
}
