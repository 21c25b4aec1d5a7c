//! Covcompare library - core functionality for coverage comparison.
//!
//! This crate provides:
//! - Coverage report data model and report-level diff operations (`report`)
//! - Provider diff model and unified-diff parsing (`diff`)
//! - Collaborator ports and in-memory implementations (`sources`)
//! - The comparison engine: line traversal, per-file comparison, segment
//!   grouping, commit and pull-request comparisons (`compare`)
//!
//! The engine never performs network or storage I/O itself. Reports, diffs
//! and cached values are reached through the traits in `sources::traits`,
//! so callers decide how commits, reports and diffs are actually fetched.

pub mod compare;
pub mod config;
pub mod diff;
pub mod error;
pub mod report;
pub mod sources;

// Re-export commonly used types
pub use compare::{Comparison, FileComparison, PullRequestComparison};
pub use error::{CompareError, CompareSide};
pub use report::{CoverageClass, Report, ReportFile};
