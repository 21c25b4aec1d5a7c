//! Site-level settings and per-repository configuration lookup.
//!
//! Repositories carry an optional stored configuration document (the parsed
//! form of their committed yaml). A repository value wins over the site-wide
//! default when both are present.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sources::traits::Repository;

/// Site-wide settings consulted when a repository has no explicit value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SiteSettings {
    /// Whether pull requests may substitute their `compared_to` commit for
    /// the true base when building a comparison.
    pub allow_pseudo_compare: bool,
    /// Whether base reports may be line-shifted to compensate for a pseudo
    /// diff that moves tracked lines.
    pub allow_coverage_offsets: bool,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            allow_pseudo_compare: true,
            allow_coverage_offsets: false,
        }
    }
}

/// Walk a nested configuration document by key path.
///
/// Returns `None` if the document is absent or any path element is missing.
pub fn walk<'a>(root: Option<&'a Value>, path: &[&str]) -> Option<&'a Value> {
    let mut current = root?;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

/// Look up a boolean in a repository's stored configuration, falling back to
/// the given default when the path is missing or not a boolean.
pub fn repo_bool(repository: &Repository, path: &[&str], default: bool) -> bool {
    walk(repository.yaml.as_ref(), path)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo_with_yaml(yaml: Option<Value>) -> Repository {
        Repository {
            service: "github".to_owned(),
            owner: "acme".to_owned(),
            name: "widget".to_owned(),
            yaml,
        }
    }

    #[test]
    fn test_walk_nested_path() {
        let doc = json!({"covcompare": {"allow_pseudo_compare": false}});
        let value = walk(Some(&doc), &["covcompare", "allow_pseudo_compare"]);
        assert_eq!(value, Some(&json!(false)));
    }

    #[test]
    fn test_walk_missing_path() {
        let doc = json!({"covcompare": {}});
        assert!(walk(Some(&doc), &["covcompare", "allow_pseudo_compare"]).is_none());
        assert!(walk(None, &["covcompare"]).is_none());
    }

    #[test]
    fn test_repo_bool_prefers_repo_value() {
        let repo = repo_with_yaml(Some(json!({"covcompare": {"allow_pseudo_compare": false}})));
        assert!(!repo_bool(&repo, &["covcompare", "allow_pseudo_compare"], true));
    }

    #[test]
    fn test_repo_bool_falls_back_to_default() {
        let repo = repo_with_yaml(None);
        assert!(repo_bool(&repo, &["covcompare", "allow_pseudo_compare"], true));
        assert!(!repo_bool(&repo, &["covcompare", "allow_coverage_offsets"], false));

        // Non-boolean values fall back too
        let repo = repo_with_yaml(Some(json!({"covcompare": {"allow_pseudo_compare": "yes"}})));
        assert!(repo_bool(&repo, &["covcompare", "allow_pseudo_compare"], true));
    }
}
