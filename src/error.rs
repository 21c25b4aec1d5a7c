use std::fmt;

use thiserror::Error;

use crate::sources::traits::ProviderError;

/// Which side of a comparison an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareSide {
    Base,
    Head,
}

impl fmt::Display for CompareSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Head => write!(f, "head"),
        }
    }
}

/// Unified error type for the comparison engine.
///
/// Missing commits and reports mean the comparison cannot be computed at all
/// and are surfaced to the caller as-is. Structural problems in diff data are
/// never swallowed: they indicate an upstream contract violation.
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("missing {0} commit")]
    MissingCommit(CompareSide),

    #[error("missing {0} report")]
    MissingReport(CompareSide),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("malformed diff for {path}: {detail}")]
    MalformedDiff { path: String, detail: String },
}

impl CompareError {
    /// Create a MalformedDiff error with file context.
    pub fn malformed(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedDiff {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Check if retrying the comparison could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Provider and store calls can hit transient failures
            Self::Provider(_) | Self::Store(_) => true,
            // The referenced data genuinely doesn't exist, or is broken
            Self::MissingCommit(_) | Self::MissingReport(_) | Self::MalformedDiff { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CompareError::MissingCommit(CompareSide::Base);
        assert_eq!(err.to_string(), "missing base commit");

        let err = CompareError::MissingReport(CompareSide::Head);
        assert_eq!(err.to_string(), "missing head report");

        let err = CompareError::malformed("a.py", "segment line list exhausted");
        assert_eq!(
            err.to_string(),
            "malformed diff for a.py: segment line list exhausted"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(CompareError::Store(anyhow::anyhow!("timeout")).is_retryable());
        assert!(!CompareError::MissingCommit(CompareSide::Head).is_retryable());
        assert!(!CompareError::malformed("a.py", "bad header").is_retryable());
    }
}
