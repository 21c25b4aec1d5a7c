//! Provider diff data model.
//!
//! A comparison between two refs comes back from the version-control
//! provider as a set of per-file diffs, each made of hunks ("segments")
//! in the classic unified format: a four-number header plus an ordered
//! list of prefixed line strings (`+` added, `-` removed, otherwise
//! context). Header numbers may arrive as integers or as strings
//! depending on the provider, so the header deserializer accepts both.

pub mod parser;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::report::CoverageTotals;

/// Classification of a diff line by its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    Added,
    Removed,
    Context,
}

impl LineType {
    /// Classify a raw diff line. Absent or empty input is context.
    pub fn of(value: Option<&str>) -> Self {
        match value.and_then(|v| v.as_bytes().first()) {
            Some(b'+') => Self::Added,
            Some(b'-') => Self::Removed,
            _ => Self::Context,
        }
    }
}

/// A unified-diff hunk header: start offset and stated length on each side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentHeader {
    pub base_start: u32,
    pub base_len: u32,
    pub head_start: u32,
    pub head_len: u32,
}

impl SegmentHeader {
    pub fn new(base_start: u32, base_len: u32, head_start: u32, head_len: u32) -> Self {
        Self {
            base_start,
            base_len,
            head_start,
            head_len,
        }
    }

    /// Base-side line range covered by this hunk, half-open. A stated zero
    /// length counts as one line so the range is never degenerate.
    pub fn base_range(&self) -> Range<u32> {
        self.base_start..self.base_start + self.base_len.max(1)
    }

    /// Head-side line range covered by this hunk, half-open, with the same
    /// zero-length rule as `base_range`.
    pub fn head_range(&self) -> Range<u32> {
        self.head_start..self.head_start + self.head_len.max(1)
    }
}

impl Serialize for SegmentHeader {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(4))?;
        seq.serialize_element(&self.base_start)?;
        seq.serialize_element(&self.base_len)?;
        seq.serialize_element(&self.head_start)?;
        seq.serialize_element(&self.head_len)?;
        seq.end()
    }
}

/// A header element as providers actually send it: a number, a numeric
/// string, or an empty string standing in for zero.
#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderValue {
    Number(u32),
    Text(String),
}

impl HeaderValue {
    fn into_u32<E: serde::de::Error>(self) -> Result<u32, E> {
        match self {
            Self::Number(n) => Ok(n),
            Self::Text(s) if s.is_empty() => Ok(0),
            Self::Text(s) => s
                .parse()
                .map_err(|_| E::custom(format!("invalid hunk header value: {s:?}"))),
        }
    }
}

impl<'de> Deserialize<'de> for SegmentHeader {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeaderVisitor;

        impl<'de> Visitor<'de> for HeaderVisitor {
            type Value = SegmentHeader;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 4-element hunk header array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut next = |idx: usize| -> Result<u32, A::Error> {
                    seq.next_element::<HeaderValue>()?
                        .ok_or_else(|| {
                            serde::de::Error::invalid_length(idx, &"4 hunk header values")
                        })?
                        .into_u32()
                };
                let header = SegmentHeader {
                    base_start: next(0)?,
                    base_len: next(1)?,
                    head_start: next(2)?,
                    head_len: next(3)?,
                };
                // Tolerate (and drop) trailing elements
                while seq.next_element::<serde::de::IgnoredAny>()?.is_some() {}
                Ok(header)
            }
        }

        deserializer.deserialize_seq(HeaderVisitor)
    }
}

/// One hunk of a file's diff: header plus prefixed line values, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSegment {
    pub header: SegmentHeader,
    #[serde(default)]
    pub lines: Vec<String>,
}

impl DiffSegment {
    pub fn new(header: SegmentHeader, lines: Vec<String>) -> Self {
        Self { header, lines }
    }
}

/// Added/removed line counts for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    #[serde(default)]
    pub added: u32,
    #[serde(default)]
    pub removed: u32,
}

/// How a file changed between the two refs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffFileType {
    New,
    Deleted,
    #[default]
    Modified,
    Binary,
}

/// The diff of a single file, keyed by its head-side name in [`CompareDiff`].
///
/// `before` records the base-side name when the file was renamed. `totals`
/// starts out empty and is filled in by `Report::apply_diff` with the
/// coverage totals of the lines this diff adds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffFile {
    #[serde(rename = "type", default)]
    pub diff_type: DiffFileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default)]
    pub stats: DiffStats,
    #[serde(default)]
    pub segments: Vec<DiffSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<CoverageTotals>,
}

impl DiffFile {
    /// Total number of diff lines across all segments. Used to decide when
    /// a file's line-by-line payload is too large to serialize.
    pub fn total_lines(&self) -> usize {
        self.segments.iter().map(|s| s.lines.len()).sum()
    }
}

/// The full diff between two refs: per-file diffs plus overall patch totals
/// (filled in by `Report::apply_diff`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareDiff {
    #[serde(default)]
    pub files: BTreeMap<String, DiffFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<CoverageTotals>,
}

/// A commit reference as returned by the provider's compare endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub commitid: String,
}

/// The provider's response to a compare request: the commits between the two
/// refs (the base commit itself is always included) and the diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareResponse {
    #[serde(default)]
    pub commits: Vec<CommitRef>,
    #[serde(default)]
    pub diff: CompareDiff,
}
