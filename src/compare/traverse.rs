//! Line traversal over a file comparison.
//!
//! [`TraverseManager`] walks a file's logical line positions while consuming
//! the file's diff hunks in order, invoking every registered visitor once
//! per position with the base/head line numbers, the raw line value, and
//! whether the position sits inside a diff hunk. It supports three modes
//! transparently: diff-only (no source, stops when the hunks run out),
//! full source with the diff overlaid, and full source with no diff at all.

use std::collections::VecDeque;

use thiserror::Error;

use crate::diff::{DiffSegment, LineType, SegmentHeader};

/// Observer invoked once per traversed line position.
///
/// `base_ln` is `None` when the line only exists on the head side (added);
/// `head_ln` is `None` when it only exists on the base side (removed).
/// `value` is `None` when the traversal has no line text for the position
/// (no hunk covers it and no full source was supplied).
pub trait LineVisitor {
    fn observe(
        &mut self,
        base_ln: Option<u32>,
        head_ln: Option<u32>,
        value: Option<&str>,
        in_diff: bool,
    );
}

/// Structural violations in the supplied diff or source data. These indicate
/// an upstream contract breach and are never recovered from.
#[derive(Debug, Error)]
pub enum TraverseError {
    #[error("diff segment lines exhausted before the end of the stated hunk range")]
    SegmentExhausted,
    #[error("source text ends at line {len} but the traversal reached line {ln}")]
    SourceOutOfBounds { ln: u32, len: usize },
}

struct SegmentCursor {
    header: SegmentHeader,
    lines: VecDeque<String>,
}

/// Stateful walk over one file's line positions.
///
/// Hunks are consumed front to back; the provider guarantees they arrive
/// sorted ascending by position. The segments are copied into an owned
/// queue at construction, so the caller's diff data is never mutated.
pub struct TraverseManager {
    segments: VecDeque<SegmentCursor>,
    src: Vec<String>,
    base_ln: u32,
    head_ln: u32,
    base_eof: u32,
    head_eof: u32,
}

impl TraverseManager {
    /// `head_eof`/`base_eof` are one past each file's last line slot, zero
    /// when that side does not exist (newly tracked or deleted files).
    /// `src` is the full head-side source split into lines, empty when only
    /// the diff should be walked.
    pub fn new(head_eof: u32, base_eof: u32, segments: &[DiffSegment], src: Vec<String>) -> Self {
        let segments: VecDeque<SegmentCursor> = segments
            .iter()
            .map(|s| SegmentCursor {
                header: s.header,
                lines: s.lines.iter().cloned().collect(),
            })
            .collect();

        // Hunk offsets are 0 for added and removed files; cursors are
        // 1-based, so clamp up.
        let (base_ln, head_ln) = match segments.front() {
            Some(front) => (
                front.header.base_start.max(1),
                front.header.head_start.max(1),
            ),
            None => (1, 1),
        };

        Self {
            segments,
            src,
            base_ln,
            head_ln,
            base_eof,
            head_eof,
        }
    }

    fn finished(&self) -> bool {
        if !self.segments.is_empty() {
            return false;
        }
        if !self.src.is_empty() {
            return self.head_ln as usize > self.src.len();
        }
        self.head_ln >= self.head_eof && self.base_ln >= self.base_eof
    }

    /// Whether either cursor sits inside the front hunk's stated range.
    fn in_diff(&self) -> bool {
        let Some(front) = self.segments.front() else {
            return false;
        };
        front.header.base_range().contains(&self.base_ln)
            || front.header.head_range().contains(&self.head_ln)
    }

    /// Walk every remaining position, feeding each one to all visitors.
    pub fn apply(&mut self, visitors: &mut [&mut dyn LineVisitor]) -> Result<(), TraverseError> {
        while !self.finished() {
            let in_diff = self.in_diff();

            let value: Option<String> = if in_diff {
                let front = self
                    .segments
                    .front_mut()
                    .expect("in_diff implies a front segment");
                Some(front.lines.pop_front().ok_or(TraverseError::SegmentExhausted)?)
            } else if !self.src.is_empty() {
                let line = self.src.get(self.head_ln as usize - 1).ok_or(
                    TraverseError::SourceOutOfBounds {
                        ln: self.head_ln,
                        len: self.src.len(),
                    },
                )?;
                Some(line.clone())
            } else {
                None
            };

            let kind = LineType::of(value.as_deref());
            for visitor in visitors.iter_mut() {
                visitor.observe(
                    (kind != LineType::Added).then_some(self.base_ln),
                    (kind != LineType::Removed).then_some(self.head_ln),
                    value.as_deref(),
                    in_diff,
                );
            }

            match kind {
                LineType::Added => self.head_ln += 1,
                LineType::Removed => self.base_ln += 1,
                LineType::Context => {
                    self.base_ln += 1;
                    self.head_ln += 1;
                }
            }

            // All of the front segment's lines have been visited
            if self
                .segments
                .front()
                .is_some_and(|front| front.lines.is_empty())
            {
                self.segments.pop_front();
            }
        }
        Ok(())
    }
}
