//! Per-file comparison façade.
//!
//! A [`FileComparison`] combines a base report file, a head report file,
//! the file's diff metadata and (optionally) its full head-side source,
//! and lazily derives everything the caller wants to know: totals, the
//! per-line comparison records, the change summary, and display segments.
//! Lines and change summary come out of one shared traversal pass, and
//! every derived value is computed at most once per instance.

use std::sync::OnceLock;

use serde::Serialize;

use super::line::{ChangeSummary, LineComparison};
use super::segments::CodeSegment;
use super::traverse::TraverseManager;
use super::visitors::{ChangeSummaryBuilder, LineComparisonBuilder};
use crate::diff::{DiffFile, DiffStats};
use crate::error::CompareError;
use crate::report::{CoverageTotals, ReportFile};

/// Diffs larger than this many lines have their per-line payload withheld
/// unless the caller explicitly bypasses truncation. Display-only: the
/// change summary is still computed from the full traversal.
pub const MAX_DIFF_SIZE: usize = 170;

/// File names on each side of the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileName {
    pub base: Option<String>,
    pub head: Option<String>,
}

/// Coverage totals on each side, plus the patch totals of this file's diff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FileComparisonTotals {
    pub base: Option<CoverageTotals>,
    pub head: Option<CoverageTotals>,
    /// Present whenever the file has diff metadata; zero totals when the
    /// diff carries none (e.g. no added line is tracked).
    pub diff: Option<CoverageTotals>,
}

struct Computed {
    summary: ChangeSummary,
    lines: Vec<LineComparison>,
}

/// Comparison of a single file between the base and head reports.
pub struct FileComparison {
    pub base_file: Option<ReportFile>,
    pub head_file: Option<ReportFile>,
    pub diff: Option<DiffFile>,
    pub src: Vec<String>,
    /// Ignore the max-diff truncation (used when serving one file in full).
    pub bypass_max_diff: bool,
    /// Externally cached hint: `Some(false)` means this file is known to
    /// have no unexpected coverage changes, so the expensive traversal can
    /// be skipped entirely; `None` means unknown.
    pub should_search_for_changes: Option<bool>,
    computed: OnceLock<Computed>,
    segments: OnceLock<Vec<CodeSegment>>,
}

impl FileComparison {
    pub fn new(
        base_file: Option<ReportFile>,
        head_file: Option<ReportFile>,
        diff: Option<DiffFile>,
    ) -> Self {
        Self {
            base_file,
            head_file,
            diff,
            src: Vec::new(),
            bypass_max_diff: false,
            should_search_for_changes: None,
            computed: OnceLock::new(),
            segments: OnceLock::new(),
        }
    }

    /// Attach the full head-side source, split into lines.
    pub fn with_src(mut self, src: Vec<String>) -> Self {
        self.src = src;
        self
    }

    pub fn with_bypass_max_diff(mut self, bypass: bool) -> Self {
        self.bypass_max_diff = bypass;
        self
    }

    pub fn with_should_search_for_changes(mut self, hint: Option<bool>) -> Self {
        self.should_search_for_changes = hint;
        self
    }

    pub fn name(&self) -> FileName {
        FileName {
            base: self.base_file.as_ref().map(|f| f.name.clone()),
            head: self.head_file.as_ref().map(|f| f.name.clone()),
        }
    }

    pub fn has_diff(&self) -> bool {
        self.diff.is_some()
    }

    pub fn stats(&self) -> Option<&DiffStats> {
        self.diff.as_ref().map(|d| &d.stats)
    }

    /// Total number of diff lines across this file's segments.
    pub fn total_diff_length(&self) -> usize {
        self.diff.as_ref().map_or(0, DiffFile::total_lines)
    }

    pub fn totals(&self) -> FileComparisonTotals {
        FileComparisonTotals {
            base: self.base_file.as_ref().map(ReportFile::totals),
            head: self.head_file.as_ref().map(ReportFile::totals),
            diff: self
                .diff
                .as_ref()
                .map(|d| d.totals.unwrap_or_default()),
        }
    }

    /// The per-line comparison records, or `None` when the diff exceeds
    /// [`MAX_DIFF_SIZE`] and truncation was not bypassed.
    pub fn lines(&self) -> Result<Option<&[LineComparison]>, CompareError> {
        if self.total_diff_length() > MAX_DIFF_SIZE && !self.bypass_max_diff {
            return Ok(None);
        }
        Ok(Some(&self.computed()?.lines))
    }

    /// Aggregate of the coverage changes not explained by the code diff.
    pub fn change_summary(&self) -> Result<ChangeSummary, CompareError> {
        Ok(self.computed()?.summary)
    }

    pub fn has_changes(&self) -> Result<bool, CompareError> {
        Ok(!self.change_summary()?.is_empty())
    }

    /// Display segments clustered around the interesting lines.
    pub fn segments(&self) -> Result<&[CodeSegment], CompareError> {
        if let Some(segments) = self.segments.get() {
            return Ok(segments);
        }
        let segments = CodeSegment::group(&self.computed()?.lines);
        Ok(self.segments.get_or_init(|| segments))
    }

    /// Run the shared traversal once, or return the memoized result.
    ///
    /// The traversal is skipped (yielding empty results) only when the file
    /// has no diff, no source was supplied, and the external hint says there
    /// is nothing to find.
    fn computed(&self) -> Result<&Computed, CompareError> {
        if let Some(computed) = self.computed.get() {
            return Ok(computed);
        }

        let mut summary_builder =
            ChangeSummaryBuilder::new(self.base_file.as_ref(), self.head_file.as_ref());
        let mut lines_builder =
            LineComparisonBuilder::new(self.base_file.as_ref(), self.head_file.as_ref());

        if self.diff.is_some() || !self.src.is_empty() || self.should_search_for_changes != Some(false)
        {
            let segments: &[_] = self.diff.as_ref().map_or(&[], |d| &d.segments);
            let mut manager = TraverseManager::new(
                self.head_file.as_ref().map_or(0, ReportFile::eof),
                self.base_file.as_ref().map_or(0, ReportFile::eof),
                segments,
                self.src.clone(),
            );
            manager
                .apply(&mut [&mut summary_builder, &mut lines_builder])
                .map_err(|e| {
                    let name = self
                        .head_file
                        .as_ref()
                        .or(self.base_file.as_ref())
                        .map_or_else(String::new, |f| f.name.clone());
                    CompareError::malformed(name, e.to_string())
                })?;
        }

        Ok(self.computed.get_or_init(|| Computed {
            summary: summary_builder.summary,
            lines: lines_builder.lines,
        }))
    }
}
