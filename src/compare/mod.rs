//! The comparison engine.
//!
//! [`Comparison`] owns a base/head commit pair and lazily pulls everything
//! else through the collaborator ports: both reports from the report store,
//! and the forward and reverse diffs from the provider (fetched together,
//! joined, first error wins). Per-file work is delegated to
//! [`FileComparison`]; [`PullRequestComparison`] layers pull-request
//! resolution and pseudo-comparison handling on top.

pub mod file;
pub mod impacted;
pub mod line;
pub mod pull;
pub mod segments;
pub mod traverse;
pub mod visitors;

use std::sync::OnceLock;

use futures::future::try_join;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::config::SiteSettings;
use crate::diff::{CommitRef, CompareDiff, CompareResponse};
use crate::error::{CompareError, CompareSide};
use crate::report::{CoverageTotals, Report};
use crate::sources::traits::{
    ChangeCache, Commit, CommitStore, RepoProvider, ReportStore, ReportStoreError,
};

pub use file::{FileComparison, FileComparisonTotals, FileName, MAX_DIFF_SIZE};
pub use impacted::{ComparisonReport, ImpactedFile};
pub use line::{ChangeSummary, LineComparison};
pub use pull::PullRequestComparison;
pub use segments::CodeSegment;

/// The collaborators a comparison works against. Cheap to copy; one context
/// is typically shared by every comparison in a request.
#[derive(Clone, Copy)]
pub struct CompareContext<'a> {
    pub provider: &'a dyn RepoProvider,
    pub reports: &'a dyn ReportStore,
    pub commits: &'a dyn CommitStore,
    pub cache: &'a dyn ChangeCache,
    pub settings: &'a SiteSettings,
}

/// Report totals on each side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComparisonTotals {
    pub base: CoverageTotals,
    pub head: CoverageTotals,
}

/// Everything that depends on the provider fetch: both compare responses
/// and the head report (which has the forward diff applied to it).
struct State {
    forward: CompareResponse,
    reverse: CompareResponse,
    head_report: Report,
}

/// A lazily-evaluated comparison between two commits.
///
/// All derived data is memoized per instance; an instance is not meant to
/// be shared across concurrent requests.
pub struct Comparison<'a> {
    ctx: CompareContext<'a>,
    base_commit: Commit,
    head_commit: Commit,
    state: OnceCell<State>,
    base_report: OnceLock<Report>,
}

impl std::fmt::Debug for Comparison<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparison")
            .field("base_commit", &self.base_commit)
            .field("head_commit", &self.head_commit)
            .finish_non_exhaustive()
    }
}

impl<'a> Comparison<'a> {
    pub fn new(ctx: CompareContext<'a>, base_commit: Commit, head_commit: Commit) -> Self {
        Self {
            ctx,
            base_commit,
            head_commit,
            state: OnceCell::new(),
            base_report: OnceLock::new(),
        }
    }

    pub fn base_commit(&self) -> &Commit {
        &self.base_commit
    }

    pub fn head_commit(&self) -> &Commit {
        &self.head_commit
    }

    /// Force evaluation of both reports, surfacing missing-report errors
    /// before any per-file work begins.
    pub async fn validate(&self) -> Result<(), CompareError> {
        self.state().await?;
        self.base_report()?;
        Ok(())
    }

    /// Fetch the forward and reverse compare responses concurrently, build
    /// the head report, and apply the forward diff to it. Runs once.
    async fn state(&self) -> Result<&State, CompareError> {
        self.state
            .get_or_try_init(|| async {
                let forward = self.ctx.provider.get_compare(
                    &self.base_commit.commitid,
                    &self.head_commit.commitid,
                );
                let reverse = self.ctx.provider.get_compare(
                    &self.head_commit.commitid,
                    &self.base_commit.commitid,
                );
                let (mut forward, reverse) = try_join(forward, reverse).await?;

                let head_report = match self.ctx.reports.build_report(&self.head_commit) {
                    Ok(report) => report,
                    Err(ReportStoreError::NotFound) => {
                        return Err(CompareError::MissingReport(CompareSide::Head))
                    }
                    Err(ReportStoreError::Other(e)) => return Err(CompareError::Store(e)),
                };
                head_report.apply_diff(&mut forward.diff);

                Ok(State {
                    forward,
                    reverse,
                    head_report,
                })
            })
            .await
    }

    /// The base commit's report, unmodified.
    pub fn base_report(&self) -> Result<&Report, CompareError> {
        if let Some(report) = self.base_report.get() {
            return Ok(report);
        }
        let report = match self.ctx.reports.build_report(&self.base_commit) {
            Ok(report) => report,
            Err(ReportStoreError::NotFound) => {
                return Err(CompareError::MissingReport(CompareSide::Base))
            }
            Err(ReportStoreError::Other(e)) => return Err(CompareError::Store(e)),
        };
        Ok(self.base_report.get_or_init(|| report))
    }

    /// Mutable access to the memoized base report (line shifting for
    /// pseudo-comparisons). The report must have been built already.
    pub(crate) fn base_report_mut(&mut self) -> Option<&mut Report> {
        self.base_report.get_mut()
    }

    /// The head commit's report, with the forward diff's patch totals
    /// applied.
    pub async fn head_report(&self) -> Result<&Report, CompareError> {
        Ok(&self.state().await?.head_report)
    }

    /// The forward provider comparison (base → head).
    pub async fn git_comparison(&self) -> Result<&CompareResponse, CompareError> {
        Ok(&self.state().await?.forward)
    }

    /// Commits between base and head, as reported by the provider.
    pub async fn git_commits(&self) -> Result<&[CommitRef], CompareError> {
        Ok(&self.state().await?.forward.commits)
    }

    /// Commits between base and head that exist in the commit store for the
    /// base commit's repository and are not marked deleted.
    pub async fn upload_commits(&self) -> Result<Vec<Commit>, CompareError> {
        let state = self.state().await?;
        let ids: Vec<String> = state
            .forward
            .commits
            .iter()
            .map(|c| c.commitid.clone())
            .collect();
        let commits = self
            .ctx
            .commits
            .find_commits(&self.base_commit.repository, &ids)
            .map_err(CompareError::Store)?;
        Ok(commits.into_iter().filter(|c| !c.deleted).collect())
    }

    /// True when commits exist in base that are absent from head. The
    /// provider always injects the base commit itself into the reverse
    /// commit list, hence the comparison with one.
    pub async fn has_unmerged_base_commits(&self) -> Result<bool, CompareError> {
        Ok(self.state().await?.reverse.commits.len() > 1)
    }

    pub async fn totals(&self) -> Result<ComparisonTotals, CompareError> {
        let head = self.head_report().await?.totals();
        let base = self.base_report()?.totals();
        Ok(ComparisonTotals { base, head })
    }

    /// Iterate a freshly built [`FileComparison`] for every file in the
    /// head report. Each call restarts from the first file.
    pub async fn files(&self) -> Result<FileComparisons<'_>, CompareError> {
        let state = self.state().await?;
        let base_report = self.base_report()?;
        Ok(FileComparisons {
            state,
            base_report,
            names: state.head_report.file_names(),
            next: 0,
        })
    }

    /// Build the comparison for one file. `with_src` additionally fetches
    /// the file's full head-side source through the provider;
    /// `bypass_max_diff` disables large-diff truncation.
    pub async fn get_file_comparison(
        &self,
        file_name: &str,
        with_src: bool,
        bypass_max_diff: bool,
    ) -> Result<FileComparison, CompareError> {
        let state = self.state().await?;
        let base_report = self.base_report()?;

        let src = if with_src {
            let source = self
                .ctx
                .provider
                .get_source(file_name, &self.head_commit.commitid)
                .await?;
            String::from_utf8_lossy(&source.content)
                .lines()
                .map(str::to_owned)
                .collect()
        } else {
            Vec::new()
        };

        Ok(build_file_comparison(state, base_report, file_name)
            .with_src(src)
            .with_bypass_max_diff(bypass_max_diff))
    }

    /// Scope this comparison to a single coverage flag.
    pub fn flag_comparison(&self, flag_name: impl Into<String>) -> FlagComparison<'_, 'a> {
        FlagComparison {
            comparison: self,
            flag_name: flag_name.into(),
            head_report: OnceLock::new(),
            base_report: OnceLock::new(),
            diff_totals: OnceLock::new(),
        }
    }

    /// Flags in the head report that were freshly uploaded rather than
    /// carried forward from an earlier commit.
    pub async fn non_carried_forward_flags(&self) -> Result<Vec<String>, CompareError> {
        let report = self.head_report().await?;
        Ok(report
            .flags()
            .into_iter()
            .filter(|(_, info)| !info.carried_forward)
            .map(|(name, _)| name)
            .collect())
    }
}

/// Resolve one file's pieces out of the comparison state: head file by
/// name, base file by the same name with a rename fallback through the
/// diff's `before` field.
fn build_file_comparison(
    state: &State,
    base_report: &Report,
    file_name: &str,
) -> FileComparison {
    let head_file = state.head_report.get(file_name).cloned();
    let diff = state.forward.diff.files.get(file_name).cloned();
    let base_file = base_report
        .get(file_name)
        .or_else(|| {
            diff.as_ref()
                .and_then(|d| d.before.as_deref())
                .and_then(|before| base_report.get(before))
        })
        .cloned();
    FileComparison::new(base_file, head_file, diff)
}

/// Lazy sequence of per-file comparisons, in head-report order.
pub struct FileComparisons<'c> {
    state: &'c State,
    base_report: &'c Report,
    names: Vec<String>,
    next: usize,
}

impl Iterator for FileComparisons<'_> {
    type Item = FileComparison;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.get(self.next)?;
        self.next += 1;
        Some(build_file_comparison(self.state, self.base_report, name))
    }
}

/// A comparison narrowed to one coverage flag: sub-reports re-derived for
/// the flag on both sides, and the flag's own patch totals.
pub struct FlagComparison<'c, 'a> {
    comparison: &'c Comparison<'a>,
    flag_name: String,
    head_report: OnceLock<Option<Report>>,
    base_report: OnceLock<Option<Report>>,
    diff_totals: OnceLock<Option<CoverageTotals>>,
}

impl FlagComparison<'_, '_> {
    pub fn flag_name(&self) -> &str {
        &self.flag_name
    }

    pub async fn head_report(&self) -> Result<Option<&Report>, CompareError> {
        if let Some(report) = self.head_report.get() {
            return Ok(report.as_ref());
        }
        let scoped = self.comparison.head_report().await?.flag(&self.flag_name);
        Ok(self.head_report.get_or_init(|| scoped).as_ref())
    }

    pub fn base_report(&self) -> Result<Option<&Report>, CompareError> {
        if let Some(report) = self.base_report.get() {
            return Ok(report.as_ref());
        }
        let scoped = self.comparison.base_report()?.flag(&self.flag_name);
        Ok(self.base_report.get_or_init(|| scoped).as_ref())
    }

    /// Patch totals of the forward diff, computed over the flag's head
    /// sub-report. `None` when the head report has no such flag.
    pub async fn diff_totals(&self) -> Result<Option<CoverageTotals>, CompareError> {
        if let Some(totals) = self.diff_totals.get() {
            return Ok(*totals);
        }
        let totals = match self.head_report().await? {
            Some(report) => {
                let diff: &CompareDiff = &self.comparison.git_comparison().await?.diff;
                report.diff_totals(diff)
            }
            None => None,
        };
        Ok(*self.diff_totals.get_or_init(|| totals))
    }
}
