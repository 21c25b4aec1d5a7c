//! Concrete traversal visitors: one builds per-line comparison records,
//! one accumulates the aggregate change summary.

use super::line::{ChangeSummary, LineComparison};
use super::traverse::LineVisitor;
use crate::diff::LineType;
use crate::report::{ReportFile, ReportLine};

/// Look up a report line by optional file and optional 1-indexed number.
fn get_line(file: Option<&ReportFile>, ln: Option<u32>) -> Option<ReportLine> {
    file?.get(ln?).cloned()
}

/// Builds a [`LineComparison`] for every traversed position that carries a
/// line value (positions with no value have nothing to display).
pub struct LineComparisonBuilder<'r> {
    base_file: Option<&'r ReportFile>,
    head_file: Option<&'r ReportFile>,
    pub lines: Vec<LineComparison>,
}

impl<'r> LineComparisonBuilder<'r> {
    pub fn new(base_file: Option<&'r ReportFile>, head_file: Option<&'r ReportFile>) -> Self {
        Self {
            base_file,
            head_file,
            lines: Vec::new(),
        }
    }
}

impl LineVisitor for LineComparisonBuilder<'_> {
    fn observe(
        &mut self,
        base_ln: Option<u32>,
        head_ln: Option<u32>,
        value: Option<&str>,
        in_diff: bool,
    ) {
        let Some(value) = value else { return };
        let kind = LineType::of(Some(value));

        self.lines.push(LineComparison {
            base_line: get_line(self.base_file, base_ln),
            head_line: get_line(self.head_file, head_ln),
            base_ln,
            head_ln,
            value: value.to_owned(),
            is_diff: in_diff,
            added: kind == LineType::Added,
            removed: kind == LineType::Removed,
        });
    }
}

/// Accumulates the "unexpected coverage changes" summary for a file.
///
/// Lines that are part of the textual diff are changed code, not changed
/// coverage, so added and removed lines are skipped outright. For the rest,
/// a position counts only when both sides have report data and the classes
/// differ: the base class bucket goes down one, the head class bucket up.
pub struct ChangeSummaryBuilder<'r> {
    base_file: Option<&'r ReportFile>,
    head_file: Option<&'r ReportFile>,
    pub summary: ChangeSummary,
}

impl<'r> ChangeSummaryBuilder<'r> {
    pub fn new(base_file: Option<&'r ReportFile>, head_file: Option<&'r ReportFile>) -> Self {
        Self {
            base_file,
            head_file,
            summary: ChangeSummary::default(),
        }
    }
}

impl LineVisitor for ChangeSummaryBuilder<'_> {
    fn observe(
        &mut self,
        base_ln: Option<u32>,
        head_ln: Option<u32>,
        value: Option<&str>,
        _in_diff: bool,
    ) {
        if LineType::of(value) != LineType::Context {
            return;
        }

        let (Some(base_line), Some(head_line)) = (
            get_line(self.base_file, base_ln),
            get_line(self.head_file, head_ln),
        ) else {
            return;
        };

        let (base_class, head_class) = (base_line.class(), head_line.class());
        if base_class != head_class {
            self.summary.record(base_class, head_class);
        }
    }
}
