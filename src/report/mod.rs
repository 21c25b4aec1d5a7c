//! Coverage report data model and report-level diff operations.
//!
//! A report is a per-file, 1-indexed sparse array of line records, exactly
//! as produced by upstream report processing. Line records arrive in a
//! compact list-like form `[coverage, coverage_type, sessions, ...]` where
//! each session is itself a `[session_id, coverage, ...]` pair; the serde
//! implementations below read that form directly and tolerate trailing
//! elements.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::diff::{CompareDiff, DiffFileType, DiffSegment, LineType};

/// Tri-state classification of a covered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageClass {
    Hit,
    Miss,
    Partial,
}

impl CoverageClass {
    /// Ordering used when merging session coverages: a hit beats a partial
    /// beats a miss.
    fn rank(self) -> u8 {
        match self {
            Self::Hit => 2,
            Self::Partial => 1,
            Self::Miss => 0,
        }
    }
}

/// A raw per-line (or per-session) coverage value as uploaded: either an
/// execution count or a branch fraction serialized as a string ("1/2").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coverage {
    Count(i64),
    Fraction(String),
}

impl Coverage {
    /// Classify this value. Counts are hits unless zero; fraction strings
    /// are partial unless the fraction is exactly zero.
    pub fn class(&self) -> CoverageClass {
        match self {
            Coverage::Count(0) => CoverageClass::Miss,
            Coverage::Count(_) => CoverageClass::Hit,
            Coverage::Fraction(raw) => {
                if fraction_value(raw) == 0.0 {
                    CoverageClass::Miss
                } else {
                    CoverageClass::Partial
                }
            }
        }
    }

    /// Whether this value counts as a full hit.
    pub fn is_hit(&self) -> bool {
        self.class() == CoverageClass::Hit
    }
}

/// Numeric value of a fraction string; malformed input counts as zero.
fn fraction_value(raw: &str) -> f64 {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den == 0.0 {
                num
            } else {
                num / den
            }
        }
        None => raw.trim().parse().unwrap_or(0.0),
    }
}

/// One session's contribution to a line, stored as `[session_id, coverage]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSession {
    pub session_id: u32,
    pub coverage: Coverage,
}

impl LineSession {
    pub fn new(session_id: u32, coverage: Coverage) -> Self {
        Self {
            session_id,
            coverage,
        }
    }
}

impl Serialize for LineSession {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.session_id)?;
        seq.serialize_element(&self.coverage)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for LineSession {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SessionVisitor;

        impl<'de> Visitor<'de> for SessionVisitor {
            type Value = LineSession;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [session_id, coverage] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let session_id = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let coverage = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                while seq.next_element::<serde::de::IgnoredAny>()?.is_some() {}
                Ok(LineSession {
                    session_id,
                    coverage,
                })
            }
        }

        deserializer.deserialize_seq(SessionVisitor)
    }
}

/// One tracked line: merged coverage, optional coverage type marker ("b"
/// for branch lines), and the per-session values behind the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
    pub coverage: Coverage,
    pub coverage_type: Option<String>,
    pub sessions: Vec<LineSession>,
}

impl ReportLine {
    pub fn new(coverage: Coverage, sessions: Vec<LineSession>) -> Self {
        Self {
            coverage,
            coverage_type: None,
            sessions,
        }
    }

    pub fn class(&self) -> CoverageClass {
        self.coverage.class()
    }

    /// Number of sessions that recorded a full hit on this line.
    pub fn hit_session_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.coverage.is_hit()).count()
    }
}

impl Serialize for ReportLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.coverage)?;
        seq.serialize_element(&self.coverage_type)?;
        seq.serialize_element(&self.sessions)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ReportLine {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LineVisitor;

        impl<'de> Visitor<'de> for LineVisitor {
            type Value = ReportLine;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [coverage, type, sessions, ...] line record")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let coverage = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let coverage_type: Option<String> = seq.next_element()?.unwrap_or(None);
                let sessions: Vec<LineSession> = seq
                    .next_element::<Option<Vec<LineSession>>>()?
                    .flatten()
                    .unwrap_or_default();
                while seq.next_element::<serde::de::IgnoredAny>()?.is_some() {}
                Ok(ReportLine {
                    coverage,
                    coverage_type,
                    sessions,
                })
            }
        }

        deserializer.deserialize_seq(LineVisitor)
    }
}

/// Aggregate coverage numbers, used for whole reports, single files, and
/// diff patches alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageTotals {
    #[serde(default)]
    pub files: u32,
    #[serde(default)]
    pub lines: u32,
    #[serde(default)]
    pub hits: u32,
    #[serde(default)]
    pub misses: u32,
    #[serde(default)]
    pub partials: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

impl CoverageTotals {
    /// Tally one classified line.
    pub fn add_class(&mut self, class: CoverageClass) {
        self.lines += 1;
        match class {
            CoverageClass::Hit => self.hits += 1,
            CoverageClass::Miss => self.misses += 1,
            CoverageClass::Partial => self.partials += 1,
        }
    }

    /// Fold another totals value into this one.
    pub fn merge(&mut self, other: &CoverageTotals) {
        self.files += other.files;
        self.lines += other.lines;
        self.hits += other.hits;
        self.misses += other.misses;
        self.partials += other.partials;
        self.recompute_coverage();
    }

    /// Recompute the coverage percentage from the counters. `None` when no
    /// lines are tracked.
    pub fn recompute_coverage(&mut self) {
        self.coverage = if self.lines > 0 {
            Some(100.0 * f64::from(self.hits) / f64::from(self.lines))
        } else {
            None
        };
    }
}

/// Coverage data for one file: a 1-indexed sparse array of line records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFile {
    pub name: String,
    #[serde(default)]
    pub lines: Vec<Option<ReportLine>>,
}

impl ReportFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    pub fn with_lines(name: impl Into<String>, lines: Vec<Option<ReportLine>>) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }

    /// Look up a line record by 1-indexed line number.
    pub fn get(&self, ln: u32) -> Option<&ReportLine> {
        if ln == 0 {
            return None;
        }
        self.lines.get(ln as usize - 1)?.as_ref()
    }

    /// Store a line record at a 1-indexed line number, growing the array.
    pub fn set(&mut self, ln: u32, line: ReportLine) {
        assert!(ln >= 1, "line numbers are 1-indexed");
        let idx = ln as usize - 1;
        if self.lines.len() <= idx {
            self.lines.resize(idx + 1, None);
        }
        self.lines[idx] = Some(line);
    }

    /// One past the last line slot, matching the traversal termination
    /// contract: a file with 4 line slots has eof 5.
    pub fn eof(&self) -> u32 {
        self.lines.len() as u32 + 1
    }

    /// 1-indexed numbers of all tracked lines.
    pub fn tracked_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.is_some())
            .map(|(idx, _)| idx as u32 + 1)
    }

    pub fn totals(&self) -> CoverageTotals {
        let mut totals = CoverageTotals::default();
        for line in self.lines.iter().flatten() {
            totals.add_class(line.class());
        }
        totals.recompute_coverage();
        totals
    }
}

/// One coverage upload contributing sessions to a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: u32,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub carried_forward: bool,
}

/// Per-flag metadata derived from a report's sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagInfo {
    pub carried_forward: bool,
}

/// A full coverage report for one commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    files: BTreeMap<String, ReportFile>,
    #[serde(default)]
    sessions: BTreeMap<u32, Session>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file: ReportFile) {
        self.files.insert(file.name.clone(), file);
    }

    pub fn add_session(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    pub fn get(&self, name: &str) -> Option<&ReportFile> {
        self.files.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ReportFile> {
        self.files.get_mut(name)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Names of all files tracked by this report, in stable order.
    pub fn file_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn totals(&self) -> CoverageTotals {
        let mut totals = CoverageTotals::default();
        for file in self.files.values() {
            let mut file_totals = file.totals();
            file_totals.files = 1;
            totals.merge(&file_totals);
        }
        totals
    }

    /// Flags carried by this report's sessions. A flag is carried-forward
    /// only if every session contributing it is.
    pub fn flags(&self) -> BTreeMap<String, FlagInfo> {
        let mut flags: BTreeMap<String, FlagInfo> = BTreeMap::new();
        for session in self.sessions.values() {
            for flag in &session.flags {
                flags
                    .entry(flag.clone())
                    .and_modify(|info| info.carried_forward &= session.carried_forward)
                    .or_insert(FlagInfo {
                        carried_forward: session.carried_forward,
                    });
            }
        }
        flags
    }

    /// Derive the sub-report scoped to one flag: lines re-merged from only
    /// that flag's sessions. `None` if no session carries the flag.
    pub fn flag(&self, flag_name: &str) -> Option<Report> {
        let session_ids: BTreeSet<u32> = self
            .sessions
            .values()
            .filter(|s| s.flags.iter().any(|f| f == flag_name))
            .map(|s| s.id)
            .collect();
        if session_ids.is_empty() {
            return None;
        }

        let mut report = Report::new();
        for session in self.sessions.values() {
            if session_ids.contains(&session.id) {
                report.add_session(session.clone());
            }
        }

        for file in self.files.values() {
            let mut scoped = ReportFile::new(file.name.clone());
            for (idx, line) in file.lines.iter().enumerate() {
                let Some(line) = line else { continue };
                let kept: Vec<LineSession> = line
                    .sessions
                    .iter()
                    .filter(|s| session_ids.contains(&s.session_id))
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    continue;
                }
                let coverage = merge_session_coverage(&kept);
                scoped.set(
                    idx as u32 + 1,
                    ReportLine {
                        coverage,
                        coverage_type: line.coverage_type.clone(),
                        sessions: kept,
                    },
                );
            }
            if !scoped.lines.is_empty() {
                report.add_file(scoped);
            }
        }
        Some(report)
    }

    /// Compute the coverage totals of the lines a diff adds, per file and
    /// overall, and store them into the diff (`DiffFile::totals` and
    /// `CompareDiff::totals`). Returns the overall patch totals.
    pub fn apply_diff(&self, diff: &mut CompareDiff) -> Option<CoverageTotals> {
        let mut network = CoverageTotals::default();
        let mut any = false;

        for (name, file) in diff.files.iter_mut() {
            if file.diff_type == DiffFileType::Deleted {
                continue;
            }
            let totals = self
                .files
                .get(name)
                .and_then(|report_file| patch_totals(report_file, &file.segments));
            if let Some(totals) = totals {
                let mut with_file = totals;
                with_file.files = 1;
                network.merge(&with_file);
                any = true;
            }
            file.totals = totals;
        }

        if any {
            diff.totals = Some(network);
            Some(network)
        } else {
            diff.totals = None;
            None
        }
    }

    /// Non-mutating variant of [`Report::apply_diff`]: just the overall
    /// patch totals. Used for flag-scoped patch coverage.
    pub fn diff_totals(&self, diff: &CompareDiff) -> Option<CoverageTotals> {
        let mut network = CoverageTotals::default();
        let mut any = false;
        for (name, file) in &diff.files {
            if file.diff_type == DiffFileType::Deleted {
                continue;
            }
            if let Some(totals) = self
                .files
                .get(name)
                .and_then(|report_file| patch_totals(report_file, &file.segments))
            {
                let mut with_file = totals;
                with_file.files = 1;
                network.merge(&with_file);
                any = true;
            }
        }
        any.then_some(network)
    }

    /// Whether applying `diff` to this report would move or drop tracked
    /// lines, making it unusable as a substitute for the report on the other
    /// side of the diff.
    ///
    /// `future_report` and `future_diff` describe the head side of the
    /// enclosing comparison; they matter when a file flips between added and
    /// deleted across the two diffs.
    pub fn does_diff_adjust_tracked_lines(
        &self,
        diff: &CompareDiff,
        future_report: &Report,
        future_diff: &CompareDiff,
    ) -> bool {
        for (path, dfile) in &diff.files {
            let future_state = future_diff.files.get(path).map(|f| f.diff_type);
            match dfile.diff_type {
                DiffFileType::New => {
                    if future_state == Some(DiffFileType::Deleted) && self.files.contains_key(path)
                    {
                        return true;
                    }
                }
                DiffFileType::Deleted => {
                    if future_state == Some(DiffFileType::New)
                        && future_report.files.contains_key(path)
                    {
                        return true;
                    }
                }
                DiffFileType::Modified => {
                    if let Some(file) = self.files.get(path) {
                        if segments_adjust_tracked_lines(file, &dfile.segments) {
                            return true;
                        }
                    }
                }
                DiffFileType::Binary => {}
            }
        }
        false
    }

    /// Shift this report's line numbers according to a diff. `forward` maps
    /// base-side positions to head-side positions; `false` maps the other
    /// way. Tracked lines removed by the diff are dropped.
    pub fn shift_lines_by_diff(&mut self, diff: &CompareDiff, forward: bool) {
        for (path, dfile) in &diff.files {
            if dfile.segments.is_empty() {
                continue;
            }
            let Some(file) = self.files.get_mut(path) else {
                continue;
            };

            let mut shifted: Vec<Option<ReportLine>> = Vec::new();
            for (idx, line) in file.lines.iter().enumerate() {
                if line.is_none() {
                    continue;
                }
                let ln = idx as u32 + 1;
                if let Some(new_ln) = map_line(ln, &dfile.segments, forward) {
                    let slot = new_ln as usize - 1;
                    if shifted.len() <= slot {
                        shifted.resize(slot + 1, None);
                    }
                    shifted[slot] = line.clone();
                }
            }
            file.lines = shifted;
        }
    }
}

/// Merged coverage over a set of sessions: the best class wins, and the
/// first session value achieving it is taken.
fn merge_session_coverage(sessions: &[LineSession]) -> Coverage {
    let mut best = &sessions[0].coverage;
    for session in &sessions[1..] {
        if session.coverage.class().rank() > best.class().rank() {
            best = &session.coverage;
        }
    }
    best.clone()
}

/// Coverage totals of the lines these segments add, looked up in the report
/// file at their head-side positions. `None` when no added line is tracked.
fn patch_totals(file: &ReportFile, segments: &[DiffSegment]) -> Option<CoverageTotals> {
    let mut totals = CoverageTotals::default();
    let mut any = false;
    for segment in segments {
        let mut head_ln = segment.header.head_start.max(1);
        for raw in &segment.lines {
            match LineType::of(Some(raw)) {
                LineType::Added => {
                    if let Some(line) = file.get(head_ln) {
                        totals.add_class(line.class());
                        any = true;
                    }
                    head_ln += 1;
                }
                LineType::Removed => {}
                LineType::Context => head_ln += 1,
            }
        }
    }
    totals.recompute_coverage();
    any.then_some(totals)
}

/// Whether any segment removes a tracked line or shifts tracked lines that
/// sit at or after its start position.
fn segments_adjust_tracked_lines(file: &ReportFile, segments: &[DiffSegment]) -> bool {
    for segment in segments {
        let mut base_ln = segment.header.base_start.max(1);
        let mut added = 0i64;
        let mut removed = 0i64;
        for raw in &segment.lines {
            match LineType::of(Some(raw)) {
                LineType::Added => added += 1,
                LineType::Removed => {
                    if file.get(base_ln).is_some() {
                        return true;
                    }
                    base_ln += 1;
                    removed += 1;
                }
                LineType::Context => base_ln += 1,
            }
        }
        if added != removed {
            let start = segment.header.base_start.max(1);
            if file.tracked_lines().any(|ln| ln >= start) {
                return true;
            }
        }
    }
    false
}

/// Map a 1-indexed line number through a file's diff segments. Returns
/// `None` when the diff removes the line. Segments are pre-sorted ascending.
fn map_line(ln: u32, segments: &[DiffSegment], forward: bool) -> Option<u32> {
    let mut delta: i64 = 0;

    for segment in segments {
        let header = &segment.header;
        let (from_start, to_start, dropped_kind) = if forward {
            (
                header.base_start.max(1),
                header.head_start.max(1),
                LineType::Removed,
            )
        } else {
            (
                header.head_start.max(1),
                header.base_start.max(1),
                LineType::Added,
            )
        };

        if ln < from_start {
            break;
        }

        let mut from_ln = from_start;
        let mut to_ln = to_start;
        let mut from_count = 0i64;
        let mut to_count = 0i64;
        for raw in &segment.lines {
            let kind = LineType::of(Some(raw));
            let consumes_from = kind == LineType::Context || kind == dropped_kind;
            let consumes_to = kind == LineType::Context || kind != dropped_kind;
            if consumes_from && from_ln == ln {
                return if kind == dropped_kind {
                    None
                } else {
                    Some(to_ln)
                };
            }
            if consumes_from {
                from_ln += 1;
                from_count += 1;
            }
            if consumes_to {
                to_ln += 1;
                to_count += 1;
            }
        }
        delta += to_count - from_count;
    }

    let shifted = i64::from(ln) + delta;
    (shifted >= 1).then_some(shifted as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffFile, SegmentHeader};

    fn hit() -> ReportLine {
        ReportLine::new(Coverage::Count(1), vec![LineSession::new(0, Coverage::Count(1))])
    }

    fn miss() -> ReportLine {
        ReportLine::new(Coverage::Count(0), vec![LineSession::new(0, Coverage::Count(0))])
    }

    fn partial() -> ReportLine {
        ReportLine::new(
            Coverage::Fraction("1/2".to_owned()),
            vec![LineSession::new(0, Coverage::Fraction("1/2".to_owned()))],
        )
    }

    #[test]
    fn test_coverage_class() {
        assert_eq!(Coverage::Count(1).class(), CoverageClass::Hit);
        assert_eq!(Coverage::Count(3).class(), CoverageClass::Hit);
        assert_eq!(Coverage::Count(0).class(), CoverageClass::Miss);
        assert_eq!(
            Coverage::Fraction("1/2".to_owned()).class(),
            CoverageClass::Partial
        );
        assert_eq!(
            Coverage::Fraction("2/2".to_owned()).class(),
            CoverageClass::Partial
        );
        assert_eq!(
            Coverage::Fraction("0/2".to_owned()).class(),
            CoverageClass::Miss
        );
        assert_eq!(Coverage::Fraction("0".to_owned()).class(), CoverageClass::Miss);
    }

    #[test]
    fn test_report_line_deserializes_compact_form() {
        let line: ReportLine = serde_json::from_str(r#"[1, null, [[0, 1], [1, 0]]]"#).unwrap();
        assert_eq!(line.coverage, Coverage::Count(1));
        assert!(line.coverage_type.is_none());
        assert_eq!(line.sessions.len(), 2);
        assert_eq!(line.sessions[1], LineSession::new(1, Coverage::Count(0)));

        // Branch line with a fraction and trailing extras
        let line: ReportLine =
            serde_json::from_str(r#"["1/2", "b", [[0, "1/2", null]], null, null]"#).unwrap();
        assert_eq!(line.class(), CoverageClass::Partial);
        assert_eq!(line.coverage_type.as_deref(), Some("b"));
    }

    #[test]
    fn test_report_line_minimal_form() {
        let line: ReportLine = serde_json::from_str(r#"[0]"#).unwrap();
        assert_eq!(line.class(), CoverageClass::Miss);
        assert!(line.sessions.is_empty());
    }

    #[test]
    fn test_report_file_get_is_one_indexed() {
        let file = ReportFile::with_lines("a.py", vec![Some(hit()), None, Some(miss())]);
        assert_eq!(file.get(1).map(ReportLine::class), Some(CoverageClass::Hit));
        assert!(file.get(2).is_none());
        assert_eq!(file.get(3).map(ReportLine::class), Some(CoverageClass::Miss));
        assert!(file.get(0).is_none());
        assert!(file.get(4).is_none());
        assert_eq!(file.eof(), 4);
    }

    #[test]
    fn test_file_totals() {
        let file = ReportFile::with_lines(
            "a.py",
            vec![Some(hit()), Some(miss()), Some(partial()), None, Some(hit())],
        );
        let totals = file.totals();
        assert_eq!(totals.lines, 4);
        assert_eq!(totals.hits, 2);
        assert_eq!(totals.misses, 1);
        assert_eq!(totals.partials, 1);
        assert_eq!(totals.coverage, Some(50.0));
    }

    #[test]
    fn test_flag_scoped_report() {
        let mut report = Report::new();
        report.add_session(Session {
            id: 0,
            flags: vec!["unit".to_owned()],
            carried_forward: false,
        });
        report.add_session(Session {
            id: 1,
            flags: vec!["integration".to_owned()],
            carried_forward: true,
        });

        let mut file = ReportFile::new("a.py");
        // Hit overall, but only the integration session covered it
        file.set(
            1,
            ReportLine::new(
                Coverage::Count(1),
                vec![
                    LineSession::new(0, Coverage::Count(0)),
                    LineSession::new(1, Coverage::Count(1)),
                ],
            ),
        );
        // Only tracked by the unit session
        file.set(
            2,
            ReportLine::new(Coverage::Count(1), vec![LineSession::new(0, Coverage::Count(1))]),
        );
        report.add_file(file);

        let unit = report.flag("unit").unwrap();
        let unit_file = unit.get("a.py").unwrap();
        assert_eq!(unit_file.get(1).unwrap().class(), CoverageClass::Miss);
        assert_eq!(unit_file.get(2).unwrap().class(), CoverageClass::Hit);

        let integration = report.flag("integration").unwrap();
        let integration_file = integration.get("a.py").unwrap();
        assert_eq!(integration_file.get(1).unwrap().class(), CoverageClass::Hit);
        assert!(integration_file.get(2).is_none());

        assert!(report.flag("nope").is_none());

        let flags = report.flags();
        assert!(!flags["unit"].carried_forward);
        assert!(flags["integration"].carried_forward);
    }

    #[test]
    fn test_apply_diff_fills_patch_totals() {
        let mut report = Report::new();
        report.add_file(ReportFile::with_lines(
            "a.py",
            vec![Some(hit()), Some(miss()), Some(hit())],
        ));

        let mut diff = CompareDiff::default();
        diff.files.insert(
            "a.py".to_owned(),
            DiffFile {
                segments: vec![DiffSegment::new(
                    SegmentHeader::new(1, 1, 1, 3),
                    vec![" ctx".into(), "+new".into(), "+new2".into()],
                )],
                ..Default::default()
            },
        );

        // Added lines land at head positions 2 and 3: one miss, one hit
        let totals = report.apply_diff(&mut diff).unwrap();
        assert_eq!(totals.lines, 2);
        assert_eq!(totals.hits, 1);
        assert_eq!(totals.misses, 1);
        assert_eq!(totals.files, 1);
        assert_eq!(diff.files["a.py"].totals.unwrap().lines, 2);
        assert_eq!(diff.totals.unwrap().hits, 1);
    }

    #[test]
    fn test_apply_diff_skips_untracked_and_deleted_files() {
        let report = Report::new();
        let mut diff = CompareDiff::default();
        diff.files.insert(
            "gone.py".to_owned(),
            DiffFile {
                diff_type: DiffFileType::Deleted,
                ..Default::default()
            },
        );
        diff.files.insert(
            "untracked.py".to_owned(),
            DiffFile {
                segments: vec![DiffSegment::new(
                    SegmentHeader::new(0, 0, 1, 1),
                    vec!["+x".into()],
                )],
                ..Default::default()
            },
        );
        assert!(report.apply_diff(&mut diff).is_none());
        assert!(diff.totals.is_none());
    }

    #[test]
    fn test_shift_lines_by_diff_forward() {
        let mut report = Report::new();
        report.add_file(ReportFile::with_lines(
            "a.py",
            vec![Some(hit()), Some(miss()), Some(hit())],
        ));

        // One line inserted before line 2
        let mut diff = CompareDiff::default();
        diff.files.insert(
            "a.py".to_owned(),
            DiffFile {
                segments: vec![DiffSegment::new(
                    SegmentHeader::new(2, 1, 2, 2),
                    vec!["+inserted".into(), " old2".into()],
                )],
                ..Default::default()
            },
        );

        report.shift_lines_by_diff(&diff, true);
        let file = report.get("a.py").unwrap();
        assert_eq!(file.get(1).unwrap().class(), CoverageClass::Hit);
        assert!(file.get(2).is_none());
        assert_eq!(file.get(3).unwrap().class(), CoverageClass::Miss);
        assert_eq!(file.get(4).unwrap().class(), CoverageClass::Hit);
    }

    #[test]
    fn test_shift_lines_by_diff_drops_removed_lines() {
        let mut report = Report::new();
        report.add_file(ReportFile::with_lines(
            "a.py",
            vec![Some(hit()), Some(miss()), Some(hit())],
        ));

        // Line 2 removed
        let mut diff = CompareDiff::default();
        diff.files.insert(
            "a.py".to_owned(),
            DiffFile {
                segments: vec![DiffSegment::new(
                    SegmentHeader::new(2, 1, 2, 0),
                    vec!["-old2".into()],
                )],
                ..Default::default()
            },
        );

        report.shift_lines_by_diff(&diff, true);
        let file = report.get("a.py").unwrap();
        assert_eq!(file.get(1).unwrap().class(), CoverageClass::Hit);
        assert_eq!(file.get(2).unwrap().class(), CoverageClass::Hit);
        assert_eq!(file.lines.len(), 2);
    }

    #[test]
    fn test_does_diff_adjust_tracked_lines() {
        let mut report = Report::new();
        report.add_file(ReportFile::with_lines(
            "a.py",
            vec![Some(hit()), Some(miss())],
        ));
        let future = Report::new();
        let future_diff = CompareDiff::default();

        // Removing a tracked line adjusts
        let mut diff = CompareDiff::default();
        diff.files.insert(
            "a.py".to_owned(),
            DiffFile {
                segments: vec![DiffSegment::new(
                    SegmentHeader::new(1, 1, 1, 0),
                    vec!["-gone".into()],
                )],
                ..Default::default()
            },
        );
        assert!(report.does_diff_adjust_tracked_lines(&diff, &future, &future_diff));

        // A pure insertion after every tracked line does not
        let mut diff = CompareDiff::default();
        diff.files.insert(
            "a.py".to_owned(),
            DiffFile {
                segments: vec![DiffSegment::new(
                    SegmentHeader::new(10, 0, 10, 1),
                    vec!["+appended".into()],
                )],
                ..Default::default()
            },
        );
        assert!(!report.does_diff_adjust_tracked_lines(&diff, &future, &future_diff));

        // An untracked file never adjusts
        let mut diff = CompareDiff::default();
        diff.files.insert(
            "other.py".to_owned(),
            DiffFile {
                segments: vec![DiffSegment::new(
                    SegmentHeader::new(1, 1, 1, 0),
                    vec!["-x".into()],
                )],
                ..Default::default()
            },
        );
        assert!(!report.does_diff_adjust_tracked_lines(&diff, &future, &future_diff));
    }
}
