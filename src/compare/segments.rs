//! Group a file's line comparisons into human-reviewable display segments.
//!
//! A display segment is a contiguous run of line comparisons clustered
//! around "lines of interest": positions where the coverage class changed
//! between base and head, or where the code itself changed, expanded by a
//! few lines of context on each side.

use serde::Serialize;

use super::line::LineComparison;
use crate::diff::SegmentHeader;

/// Context lines included before and after each segment.
pub const PADDING_LINES: usize = 3;

/// Maximum gap between lines of interest sharing one segment.
pub const LINE_DISTANCE: usize = 6;

/// A contiguous display hunk over a file's line comparisons.
#[derive(Debug, Clone, Serialize)]
pub struct CodeSegment {
    lines: Vec<LineComparison>,
}

impl CodeSegment {
    /// Cluster the interesting lines of a file into display segments.
    pub fn group(lines: &[LineComparison]) -> Vec<CodeSegment> {
        let interesting: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| {
                let coverage = line.coverage();
                coverage.base != coverage.head || line.added || line.removed
            })
            .map(|(idx, _)| idx)
            .collect();

        // Cluster indices of interest: a new cluster starts whenever the
        // gap to the previous index exceeds LINE_DISTANCE.
        let mut clusters: Vec<(usize, usize)> = Vec::new();
        for idx in interesting {
            match clusters.last_mut() {
                Some((_, last)) if idx - *last <= LINE_DISTANCE => *last = idx,
                _ => clusters.push((idx, idx)),
            }
        }

        clusters
            .into_iter()
            .map(|(first, last)| {
                let start = first.saturating_sub(PADDING_LINES);
                let end = (last + PADDING_LINES).min(lines.len() - 1);
                CodeSegment {
                    lines: lines[start..=end].to_vec(),
                }
            })
            .collect()
    }

    pub fn lines(&self) -> &[LineComparison] {
        &self.lines
    }

    /// The classic unified-diff hunk header for this segment: first line
    /// number seen on each side, and the line count each side spans.
    pub fn header(&self) -> SegmentHeader {
        let mut base_start = None;
        let mut head_start = None;
        let mut num_added = 0;
        let mut num_removed = 0;
        let mut num_context = 0;

        for line in &self.lines {
            if base_start.is_none() {
                base_start = line.base_ln;
            }
            if head_start.is_none() {
                head_start = line.head_ln;
            }
            if line.added {
                num_added += 1;
            } else if line.removed {
                num_removed += 1;
            } else {
                num_context += 1;
            }
        }

        SegmentHeader::new(
            base_start.unwrap_or(0),
            num_context + num_removed,
            head_start.unwrap_or(0),
            num_context + num_added,
        )
    }

    /// Whether any unchanged line in this segment has a coverage class that
    /// differs between base and head.
    pub fn has_unintended_changes(&self) -> bool {
        self.lines.iter().any(|line| {
            let coverage = line.coverage();
            !(line.added || line.removed) && coverage.base != coverage.head
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Coverage, LineSession, ReportLine};

    fn report_line(coverage: Coverage) -> ReportLine {
        ReportLine::new(coverage.clone(), vec![LineSession::new(0, coverage)])
    }

    /// A context line with the given coverage on each side.
    fn context(ln: u32, base: i64, head: i64) -> LineComparison {
        LineComparison {
            base_line: Some(report_line(Coverage::Count(base))),
            head_line: Some(report_line(Coverage::Count(head))),
            base_ln: Some(ln),
            head_ln: Some(ln),
            value: " line".to_owned(),
            is_diff: false,
            added: false,
            removed: false,
        }
    }

    fn added(ln: u32) -> LineComparison {
        LineComparison {
            base_line: None,
            head_line: Some(report_line(Coverage::Count(1))),
            base_ln: None,
            head_ln: Some(ln),
            value: "+new".to_owned(),
            is_diff: true,
            added: true,
            removed: false,
        }
    }

    /// A plain file of unchanged hit lines, numbered 1..=n.
    fn unchanged_lines(n: u32) -> Vec<LineComparison> {
        (1..=n).map(|ln| context(ln, 1, 1)).collect()
    }

    #[test]
    fn test_no_lines_of_interest_yields_no_segments() {
        let lines = unchanged_lines(20);
        assert!(CodeSegment::group(&lines).is_empty());
    }

    #[test]
    fn test_distant_changes_split_into_two_segments() {
        // Coverage changes at indices 5 and 40: distance 35 > 6
        let mut lines = unchanged_lines(50);
        lines[5] = context(6, 1, 0);
        lines[40] = context(41, 0, 1);

        let segments = CodeSegment::group(&lines);
        assert_eq!(segments.len(), 2);

        // Each segment is the line of interest padded by 3 on both sides
        assert_eq!(segments[0].lines().len(), 7);
        assert_eq!(segments[0].lines()[0].base_ln, Some(3));
        assert_eq!(segments[1].lines().len(), 7);
        assert_eq!(segments[1].lines()[0].base_ln, Some(38));
        assert!(segments[0].has_unintended_changes());
    }

    #[test]
    fn test_nearby_changes_share_a_segment() {
        let mut lines = unchanged_lines(30);
        lines[10] = context(11, 1, 0);
        lines[16] = context(17, 0, 1); // gap of 6: same cluster

        let segments = CodeSegment::group(&lines);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].lines().len(), 13); // 10-3 ..= 16+3
    }

    #[test]
    fn test_padding_clamps_to_file_bounds() {
        let mut lines = unchanged_lines(4);
        lines[0] = context(1, 1, 0);
        lines[3] = context(4, 0, 1);

        let segments = CodeSegment::group(&lines);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].lines().len(), 4);
    }

    #[test]
    fn test_header_counts_and_starts() {
        let lines = vec![
            context(5, 1, 1),
            added(6),
            added(7),
            context(6, 1, 1),
        ];
        let segment = &CodeSegment::group(&lines)[0];
        let header = segment.header();
        assert_eq!(header.base_start, 5);
        assert_eq!(header.base_len, 2); // context + removed
        assert_eq!(header.head_start, 5);
        assert_eq!(header.head_len, 4); // context + added
        assert!(!segment.has_unintended_changes());
    }

    #[test]
    fn test_added_lines_are_lines_of_interest() {
        let mut lines = unchanged_lines(10);
        lines[4] = added(5);
        let segments = CodeSegment::group(&lines);
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].has_unintended_changes());
    }
}
