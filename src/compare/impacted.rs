//! Previously-persisted impacted-file data.
//!
//! Background processing persists a per-comparison document listing the
//! files a comparison impacts, with their coverage numbers and the
//! coverage markers of the lines the diff added. [`ComparisonReport`]
//! reads that document back from the archive store and derives the
//! user-facing [`ImpactedFile`] records, with optional ordering. Archive
//! failures degrade to an empty result set: impacted files are an
//! enhancement, not a prerequisite for the comparison itself.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::report::CoverageTotals;
use crate::sources::traits::ArchiveStore;

/// One file impacted by a comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactedFile {
    pub base_name: Option<String>,
    pub head_name: String,
    pub base_coverage: Option<CoverageTotals>,
    pub head_coverage: Option<CoverageTotals>,
    /// Coverage of the lines the diff added to this file.
    pub patch_coverage: Option<CoverageTotals>,
    /// Head coverage percentage minus base coverage percentage.
    pub change_coverage: Option<f64>,
}

/// Sort key for [`ComparisonReport::impacted_files`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingParameter {
    HeadCoverage,
    ChangeCoverage,
    PatchCoverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingDirection {
    Ascending,
    Descending,
}

/// Optional ordering applied to the impacted-file list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpactedFileFilters {
    pub ordering: Option<(OrderingParameter, OrderingDirection)>,
}

/// The archived document's per-file shape.
#[derive(Debug, Clone, Deserialize)]
struct StoredImpactedFile {
    #[serde(default)]
    base_name: Option<String>,
    head_name: String,
    #[serde(default)]
    base_coverage: Option<StoredTotals>,
    #[serde(default)]
    head_coverage: Option<StoredTotals>,
    /// `[line, marker]` pairs where the marker is "h", "m" or "p".
    #[serde(default)]
    added_diff_coverage: Option<Vec<(u32, String)>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct StoredTotals {
    #[serde(default)]
    hits: u32,
    #[serde(default)]
    misses: u32,
    #[serde(default)]
    partials: u32,
}

impl StoredTotals {
    fn into_totals(self) -> CoverageTotals {
        let mut totals = CoverageTotals {
            files: 0,
            lines: self.hits + self.misses + self.partials,
            hits: self.hits,
            misses: self.misses,
            partials: self.partials,
            coverage: None,
        };
        totals.recompute_coverage();
        totals
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoredDocument {
    #[serde(default)]
    files: Vec<StoredImpactedFile>,
}

/// Reader over one comparison's archived impacted-file document.
pub struct ComparisonReport<'a> {
    archive: &'a dyn ArchiveStore,
    storage_path: Option<String>,
    files: OnceLock<Vec<StoredImpactedFile>>,
}

impl<'a> ComparisonReport<'a> {
    /// `storage_path` is the archive location recorded for the comparison,
    /// `None` when nothing was ever persisted.
    pub fn new(archive: &'a dyn ArchiveStore, storage_path: Option<String>) -> Self {
        Self {
            archive,
            storage_path,
            files: OnceLock::new(),
        }
    }

    fn stored_files(&self) -> &[StoredImpactedFile] {
        self.files.get_or_init(|| {
            let Some(path) = self.storage_path.as_deref() else {
                return Vec::new();
            };
            let raw = match self.archive.read_file(path) {
                Ok(raw) => raw,
                Err(e) => {
                    log::error!("couldn't fetch impacted-file data from storage: {e}");
                    return Vec::new();
                }
            };
            match serde_json::from_slice::<StoredDocument>(&raw) {
                Ok(document) => document.files,
                Err(e) => {
                    log::error!("couldn't parse impacted-file data: {e}");
                    Vec::new()
                }
            }
        })
    }

    /// Head-side names of every impacted file, in stored order.
    pub fn files(&self) -> Vec<String> {
        self.stored_files()
            .iter()
            .map(|f| f.head_name.clone())
            .collect()
    }

    /// The impacted file with the given head-side name.
    pub fn impacted_file(&self, path: &str) -> Option<ImpactedFile> {
        self.stored_files()
            .iter()
            .find(|f| f.head_name == path)
            .map(deserialize_file)
    }

    /// All impacted files, optionally ordered. Files without a value for
    /// the ordering parameter go last regardless of direction.
    pub fn impacted_files(&self, filters: ImpactedFileFilters) -> Vec<ImpactedFile> {
        let mut files: Vec<ImpactedFile> = self.stored_files().iter().map(deserialize_file).collect();

        if let Some((parameter, direction)) = filters.ordering {
            let (mut with_value, without_value): (Vec<_>, Vec<_>) = files
                .drain(..)
                .partition(|f| sort_value(f, parameter).is_some());

            with_value.sort_by(|a, b| {
                let a = sort_value(a, parameter).unwrap_or_default();
                let b = sort_value(b, parameter).unwrap_or_default();
                let ordering = a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal);
                match direction {
                    OrderingDirection::Ascending => ordering,
                    OrderingDirection::Descending => ordering.reverse(),
                }
            });

            with_value.extend(without_value);
            files = with_value;
        }

        files
    }
}

fn sort_value(file: &ImpactedFile, parameter: OrderingParameter) -> Option<f64> {
    match parameter {
        OrderingParameter::HeadCoverage => file.head_coverage.and_then(|t| t.coverage),
        OrderingParameter::ChangeCoverage => file.change_coverage,
        OrderingParameter::PatchCoverage => file.patch_coverage.and_then(|t| t.coverage),
    }
}

/// Tally the h/m/p markers of the diff-added lines into patch totals.
fn patch_coverage(file: &StoredImpactedFile) -> Option<CoverageTotals> {
    let added = file.added_diff_coverage.as_ref()?;
    if added.is_empty() {
        return None;
    }
    let mut totals = StoredTotals::default();
    for (_, marker) in added {
        match marker.as_str() {
            "h" => totals.hits += 1,
            "m" => totals.misses += 1,
            "p" => totals.partials += 1,
            _ => {}
        }
    }
    Some(totals.into_totals())
}

fn deserialize_file(file: &StoredImpactedFile) -> ImpactedFile {
    let base_coverage = file.base_coverage.map(StoredTotals::into_totals);
    let head_coverage = file.head_coverage.map(StoredTotals::into_totals);
    let change_coverage = match (
        head_coverage.and_then(|t| t.coverage),
        base_coverage.and_then(|t| t.coverage),
    ) {
        (Some(head), Some(base)) => Some(head - base),
        _ => None,
    };

    ImpactedFile {
        base_name: file.base_name.clone(),
        head_name: file.head_name.clone(),
        base_coverage,
        head_coverage,
        patch_coverage: patch_coverage(file),
        change_coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::memory::MemoryArchive;

    fn document() -> &'static str {
        r#"{
            "files": [
                {
                    "base_name": "a.py",
                    "head_name": "a.py",
                    "base_coverage": {"hits": 1, "misses": 1, "partials": 0},
                    "head_coverage": {"hits": 2, "misses": 0, "partials": 0},
                    "added_diff_coverage": [[3, "h"], [4, "m"], [5, "p"]]
                },
                {
                    "base_name": null,
                    "head_name": "new.py",
                    "head_coverage": {"hits": 1, "misses": 0, "partials": 0}
                }
            ]
        }"#
    }

    #[test]
    fn test_reads_archived_document() {
        let mut archive = MemoryArchive::new();
        archive.add_file("v4/comparisons/abc.json", document());
        let report = ComparisonReport::new(&archive, Some("v4/comparisons/abc.json".to_owned()));

        assert_eq!(report.files(), vec!["a.py", "new.py"]);

        let file = report.impacted_file("a.py").unwrap();
        assert_eq!(file.base_coverage.unwrap().coverage, Some(50.0));
        assert_eq!(file.head_coverage.unwrap().coverage, Some(100.0));
        assert_eq!(file.change_coverage, Some(50.0));

        let patch = file.patch_coverage.unwrap();
        assert_eq!(patch.hits, 1);
        assert_eq!(patch.misses, 1);
        assert_eq!(patch.partials, 1);

        let new_file = report.impacted_file("new.py").unwrap();
        assert!(new_file.base_name.is_none());
        assert!(new_file.base_coverage.is_none());
        assert!(new_file.change_coverage.is_none());
        assert!(new_file.patch_coverage.is_none());
    }

    #[test]
    fn test_missing_archive_degrades_to_empty() {
        let archive = MemoryArchive::new();
        let report = ComparisonReport::new(&archive, Some("nope.json".to_owned()));
        assert!(report.files().is_empty());
        assert!(report.impacted_file("a.py").is_none());
    }

    #[test]
    fn test_no_storage_path_is_empty() {
        let archive = MemoryArchive::new();
        let report = ComparisonReport::new(&archive, None);
        assert!(report.files().is_empty());
    }

    #[test]
    fn test_unparseable_document_degrades_to_empty() {
        let mut archive = MemoryArchive::new();
        archive.add_file("bad.json", "not json");
        let report = ComparisonReport::new(&archive, Some("bad.json".to_owned()));
        assert!(report.files().is_empty());
    }

    #[test]
    fn test_ordering_puts_missing_values_last() {
        let mut archive = MemoryArchive::new();
        archive.add_file("doc.json", document());
        let report = ComparisonReport::new(&archive, Some("doc.json".to_owned()));

        let files = report.impacted_files(ImpactedFileFilters {
            ordering: Some((
                OrderingParameter::ChangeCoverage,
                OrderingDirection::Descending,
            )),
        });
        // new.py has no change coverage, so it sorts after a.py
        assert_eq!(files[0].head_name, "a.py");
        assert_eq!(files[1].head_name, "new.py");
    }

    #[test]
    fn test_head_coverage_ordering() {
        let mut archive = MemoryArchive::new();
        archive.add_file("doc.json", document());
        let report = ComparisonReport::new(&archive, Some("doc.json".to_owned()));

        let files = report.impacted_files(ImpactedFileFilters {
            ordering: Some((
                OrderingParameter::HeadCoverage,
                OrderingDirection::Ascending,
            )),
        });
        // Both have head coverage 100.0; stored order is kept by the stable sort
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].head_name, "a.py");
    }
}
