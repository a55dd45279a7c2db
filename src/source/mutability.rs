use regex::Regex;
use std::sync::LazyLock;

use super::SourceSpec;

static COMMIT_HASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-f0-9]{40}$").unwrap());

static SEMVER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^v?\d+\.\d+\.\d+").unwrap());

/// Whether a source always resolves to the same content.
///
/// Immutable sources may be served from cache without refetching; everything
/// else (branches, unpinned packages, local paths) is refreshed and reinstalled
/// with the force flag.
pub fn is_immutable(spec: &SourceSpec) -> bool {
    match spec {
        SourceSpec::Package { version, .. } => version.is_some(),
        SourceSpec::Github {
            version: Some(v), ..
        } => COMMIT_HASH.is_match(v) || SEMVER_TAG.is_match(v),
        SourceSpec::Github { version: None, .. } | SourceSpec::Local { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::parse_source;
    use proptest::prelude::*;

    fn immutable(raw: &str) -> bool {
        is_immutable(&parse_source(raw).unwrap())
    }

    #[test]
    fn test_pinned_package_is_immutable() {
        assert!(immutable("toolbelt@1.0.0"));
        assert!(immutable("toolbelt@latest"));
        assert!(!immutable("toolbelt"));
    }

    #[test]
    fn test_github_tags_and_hashes() {
        assert!(immutable("github:acme/toolbelt@v1.2.3"));
        assert!(immutable("github:acme/toolbelt@1.2.3"));
        assert!(immutable("github:acme/toolbelt@v1.2.3-rc.1"));
        assert!(immutable(
            "github:acme/toolbelt@0123456789abcdef0123456789abcdef01234567"
        ));
    }

    #[test]
    fn test_github_branches_are_mutable() {
        assert!(!immutable("github:acme/toolbelt"));
        assert!(!immutable("github:acme/toolbelt@main"));
        assert!(!immutable("github:acme/toolbelt@v1.2"));
        // uppercase hex and short hashes are not treated as commits
        assert!(!immutable(
            "github:acme/toolbelt@0123456789ABCDEF0123456789ABCDEF01234567"
        ));
        assert!(!immutable("github:acme/toolbelt@0123456"));
    }

    #[test]
    fn test_local_is_always_mutable() {
        assert!(!immutable("./toolbelt"));
        assert!(!immutable("~/src/toolbelt"));
    }

    proptest! {
        #[test]
        fn prop_is_immutable_is_deterministic(version in "[a-zA-Z0-9.]{1,45}") {
            let spec = SourceSpec::Github {
                org: "acme".to_string(),
                name: "toolbelt".to_string(),
                version: Some(version),
            };
            prop_assert_eq!(is_immutable(&spec), is_immutable(&spec.clone()));
        }
    }
}
