//! Per-line comparison records and the aggregate change summary.

use serde::Serialize;

use crate::report::{CoverageClass, ReportLine};

/// Coverage classification on each side of one compared line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineCoverage {
    pub base: Option<CoverageClass>,
    pub head: Option<CoverageClass>,
}

/// One traversed line position with the report data found on each side.
///
/// `base_ln` is `None` exactly when the line was added, `head_ln` exactly
/// when it was removed. At most one of `added`/`removed` is true.
#[derive(Debug, Clone, Serialize)]
pub struct LineComparison {
    pub base_line: Option<ReportLine>,
    pub head_line: Option<ReportLine>,
    pub base_ln: Option<u32>,
    pub head_ln: Option<u32>,
    pub value: String,
    pub is_diff: bool,
    pub added: bool,
    pub removed: bool,
}

impl LineComparison {
    /// Coverage class on each side. A side with no line number (added or
    /// removed line) or no report data classifies as `None`.
    pub fn coverage(&self) -> LineCoverage {
        LineCoverage {
            base: if self.added {
                None
            } else {
                self.base_line.as_ref().map(ReportLine::class)
            },
            head: if self.removed {
                None
            } else {
                self.head_line.as_ref().map(ReportLine::class)
            },
        }
    }

    /// Number of head sessions that fully hit this line; `None` when the
    /// head side has no report data or no session hit it.
    pub fn hit_sessions(&self) -> Option<usize> {
        let count = self.head_line.as_ref()?.hit_session_count();
        (count > 0).then_some(count)
    }
}

/// Signed per-class deltas of "unexpected" coverage changes: head counts
/// minus base counts over all non-diff lines whose class changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub hits: i64,
    pub misses: i64,
    pub partials: i64,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.hits == 0 && self.misses == 0 && self.partials == 0
    }

    /// Record one line whose class changed from `base` to `head`.
    pub fn record(&mut self, base: CoverageClass, head: CoverageClass) {
        *self.bucket_mut(base) -= 1;
        *self.bucket_mut(head) += 1;
    }

    fn bucket_mut(&mut self, class: CoverageClass) -> &mut i64 {
        match class {
            CoverageClass::Hit => &mut self.hits,
            CoverageClass::Miss => &mut self.misses,
            CoverageClass::Partial => &mut self.partials,
        }
    }
}
