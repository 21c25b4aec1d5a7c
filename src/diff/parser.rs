//! Parse raw unified-diff text into the provider diff model.
//!
//! Provider adapters that receive a textual diff (rather than structured
//! JSON) can run it through [`parse_compare_diff`] to obtain a
//! [`CompareDiff`]. Line prefixes are preserved: added lines keep their
//! `+`, removed lines their `-`, and context lines their leading space,
//! which is the form the traversal engine expects.

use std::collections::BTreeMap;

use super::{CompareDiff, DiffFile, DiffFileType, DiffSegment, SegmentHeader};

/// Parse a combined multi-file unified diff into a [`CompareDiff`].
///
/// Splits on `diff --git` boundaries, resolves each file's names from the
/// `---`/`+++` header pair (recording `before` on renames and handling
/// `/dev/null` for added and deleted files), and collects hunks verbatim.
pub fn parse_compare_diff(diff_output: &str) -> CompareDiff {
    let mut files = BTreeMap::new();
    let mut current: Option<FileBuilder> = None;

    for line in diff_output.lines() {
        if line.starts_with("diff --git ") {
            if let Some(builder) = current.take() {
                builder.finish(&mut files);
            }
            current = Some(FileBuilder::default());
            continue;
        }

        let Some(ref mut builder) = current else {
            continue;
        };

        if let Some(path) = line.strip_prefix("--- ") {
            builder.old_name = strip_path_prefix(path, "a/");
        } else if let Some(path) = line.strip_prefix("+++ ") {
            builder.new_name = strip_path_prefix(path, "b/");
        } else if line.starts_with("@@") {
            if let Some(header) = parse_hunk_header(line) {
                builder.segments.push(DiffSegment::new(header, Vec::new()));
            }
        } else if let Some(segment) = builder.segments.last_mut() {
            // Hunk body: keep the prefix so downstream classification works.
            // The "\ No newline at end of file" marker is dropped.
            if line.starts_with('+') {
                segment.lines.push(line.to_owned());
                builder.added += 1;
            } else if line.starts_with('-') {
                segment.lines.push(line.to_owned());
                builder.removed += 1;
            } else if line.starts_with(' ') || line.is_empty() {
                segment.lines.push(line.to_owned());
            }
        }
    }

    if let Some(builder) = current {
        builder.finish(&mut files);
    }

    CompareDiff {
        files,
        totals: None,
    }
}

/// `--- a/path` / `+++ b/path` → `path`; `/dev/null` → `None`.
fn strip_path_prefix(path: &str, prefix: &str) -> Option<String> {
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_owned())
}

#[derive(Default)]
struct FileBuilder {
    old_name: Option<String>,
    new_name: Option<String>,
    segments: Vec<DiffSegment>,
    added: u32,
    removed: u32,
}

impl FileBuilder {
    fn finish(self, files: &mut BTreeMap<String, DiffFile>) {
        let (name, diff_type, before) = match (self.old_name, self.new_name) {
            (Some(old), Some(new)) => {
                let before = (old != new).then_some(old);
                (new, DiffFileType::Modified, before)
            }
            (None, Some(new)) => (new, DiffFileType::New, None),
            (Some(old), None) => (old, DiffFileType::Deleted, None),
            // No file header at all (e.g. a mode-only change)
            (None, None) => return,
        };

        let mut file = DiffFile {
            diff_type,
            before,
            segments: self.segments,
            ..Default::default()
        };
        file.stats.added = self.added;
        file.stats.removed = self.removed;
        files.insert(name, file);
    }
}

/// Parse `@@ -base_start,base_len +head_start,head_len @@ context`.
fn parse_hunk_header(line: &str) -> Option<SegmentHeader> {
    let line = line.trim_start_matches("@@ ");
    let mut parts = line.split(' ');

    let base = parts.next()?.trim_start_matches('-');
    let head = parts.next()?.trim_start_matches('+');

    let (base_start, base_len) = parse_range(base)?;
    let (head_start, head_len) = parse_range(head)?;

    Some(SegmentHeader::new(base_start, base_len, head_start, head_len))
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    if let Some((start, len)) = range.split_once(',') {
        Some((start.parse().ok()?, len.parse().ok()?))
    } else {
        // Single line: "5" means line 5, length 1
        Some((range.parse().ok()?, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hunk_header() {
        assert_eq!(
            parse_hunk_header("@@ -1,5 +1,7 @@"),
            Some(SegmentHeader::new(1, 5, 1, 7))
        );
        assert_eq!(
            parse_hunk_header("@@ -10,3 +12,5 @@ def foo():"),
            Some(SegmentHeader::new(10, 3, 12, 5))
        );
    }

    #[test]
    fn test_parse_hunk_header_single_line() {
        assert_eq!(
            parse_hunk_header("@@ -5 +5 @@"),
            Some(SegmentHeader::new(5, 1, 5, 1))
        );
        assert_eq!(
            parse_hunk_header("@@ -1,0 +1,5 @@"),
            Some(SegmentHeader::new(1, 0, 1, 5))
        );
    }

    #[test]
    fn test_parse_empty_diff() {
        let diff = parse_compare_diff("");
        assert!(diff.files.is_empty());
    }

    #[test]
    fn test_parse_single_file_keeps_prefixes() {
        let raw = "\
diff --git a/foo.py b/foo.py
--- a/foo.py
+++ b/foo.py
@@ -1,2 +1,3 @@
 context
+added
 context2";
        let diff = parse_compare_diff(raw);
        let file = &diff.files["foo.py"];
        assert_eq!(file.diff_type, DiffFileType::Modified);
        assert!(file.before.is_none());
        assert_eq!(file.stats.added, 1);
        assert_eq!(file.stats.removed, 0);
        assert_eq!(
            file.segments[0].lines,
            vec![" context", "+added", " context2"]
        );
    }

    #[test]
    fn test_parse_multiple_files() {
        let raw = "\
diff --git a/foo.py b/foo.py
--- a/foo.py
+++ b/foo.py
@@ -1,2 +1,2 @@
-old
+new
 context
diff --git a/bar.py b/bar.py
--- a/bar.py
+++ b/bar.py
@@ -5,1 +5,1 @@
-x
+y";
        let diff = parse_compare_diff(raw);
        assert_eq!(diff.files.len(), 2);
        assert_eq!(diff.files["bar.py"].segments[0].header.base_start, 5);
    }

    #[test]
    fn test_parse_new_and_deleted_files() {
        let raw = "\
diff --git a/gone.py b/gone.py
--- a/gone.py
+++ /dev/null
@@ -1,2 +0,0 @@
-line1
-line2
diff --git a/fresh.py b/fresh.py
--- /dev/null
+++ b/fresh.py
@@ -0,0 +1,1 @@
+hello";
        let diff = parse_compare_diff(raw);
        assert_eq!(diff.files["gone.py"].diff_type, DiffFileType::Deleted);
        assert_eq!(diff.files["gone.py"].stats.removed, 2);
        assert_eq!(diff.files["fresh.py"].diff_type, DiffFileType::New);
        assert_eq!(diff.files["fresh.py"].segments[0].header.base_start, 0);
    }

    #[test]
    fn test_parse_rename_records_before() {
        let raw = "\
diff --git a/old_name.py b/new_name.py
--- a/old_name.py
+++ b/new_name.py
@@ -1,1 +1,1 @@
-a
+b";
        let diff = parse_compare_diff(raw);
        let file = &diff.files["new_name.py"];
        assert_eq!(file.before.as_deref(), Some("old_name.py"));
    }

    #[test]
    fn test_parse_drops_no_newline_marker() {
        let raw = "\
diff --git a/f.py b/f.py
--- a/f.py
+++ b/f.py
@@ -1,1 +1,1 @@
-old
+new
\\ No newline at end of file";
        let diff = parse_compare_diff(raw);
        assert_eq!(diff.files["f.py"].segments[0].lines.len(), 2);
    }
}
