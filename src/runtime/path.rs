//! Path helpers that never touch the filesystem.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// Symlinks are not followed.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Keep the `..` when there is nothing left to pop
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Check whether `path` lies under `dir` after lexical normalization of both.
///
/// `/project/.codeguide/../../etc` is NOT under `/project`.
pub fn is_path_under(path: &Path, dir: &Path) -> bool {
    let normalized_path = normalize_path(path);
    let normalized_dir = normalize_path(dir);

    let path_components: Vec<_> = normalized_path.components().collect();
    let dir_components: Vec<_> = normalized_dir.components().collect();

    if path_components.len() < dir_components.len() {
        return false;
    }

    dir_components
        .iter()
        .zip(path_components.iter())
        .all(|(d, p)| d == p)
}

/// Relative path from the directory holding `from_link` to `to_target`.
///
/// Returns `None` when no relative form exists (e.g. different drive letters on Windows).
pub fn relative_symlink_path(from_link: &Path, to_target: &Path) -> Option<PathBuf> {
    let from_dir = from_link.parent()?;
    let result = pathdiff::diff_paths(to_target, from_dir)?;

    if result.is_absolute() {
        return None;
    }

    Some(result)
}

/// Join `relative_path` onto `base_dir` and normalize; absolute inputs pass through.
pub fn resolve_relative_path(base_dir: &Path, relative_path: &Path) -> PathBuf {
    if relative_path.is_absolute() {
        relative_path.to_path_buf()
    } else {
        normalize_path(&base_dir.join(relative_path))
    }
}

/// Expand a leading `~` using `home`. Paths without `~` are returned unchanged.
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(path);
    };
    if path == "~" {
        return home.to_path_buf();
    }
    match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        Some(rest) => home.join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_with_dot_and_parent() {
        assert_eq!(
            normalize_path(Path::new("/project/./.codeguide/../resources")),
            PathBuf::from("/project/resources")
        );
    }

    #[test]
    fn test_normalize_path_relative_keeps_leading_parent() {
        assert_eq!(
            normalize_path(Path::new("../configs/./x")),
            PathBuf::from("../configs/x")
        );
    }

    #[test]
    fn test_normalize_path_only_dots() {
        assert_eq!(normalize_path(Path::new("./.")), PathBuf::from(""));
    }

    #[test]
    fn test_is_path_under_simple() {
        assert!(is_path_under(
            Path::new("/project/.editorconfig"),
            Path::new("/project")
        ));
        assert!(is_path_under(Path::new("/project"), Path::new("/project")));
    }

    #[test]
    fn test_is_path_under_partial_component_match() {
        assert!(!is_path_under(
            Path::new("/project-other/file"),
            Path::new("/project")
        ));
    }

    #[test]
    fn test_is_path_under_traversal_escape() {
        assert!(!is_path_under(
            Path::new("/project/configs/../../etc/passwd"),
            Path::new("/project")
        ));
        assert!(is_path_under(
            Path::new("/project/configs/../other/file"),
            Path::new("/project")
        ));
    }

    #[test]
    fn test_relative_symlink_path_same_parent() {
        let result = relative_symlink_path(
            Path::new("/project/.editorconfig"),
            Path::new("/project/.codeguide/configs/.editorconfig"),
        );
        assert_eq!(
            result,
            Some(PathBuf::from(".codeguide/configs/.editorconfig"))
        );
    }

    #[test]
    fn test_relative_symlink_path_nested_link() {
        let result = relative_symlink_path(
            Path::new("/project/.github/workflows/ci.yml"),
            Path::new("/project/.codeguide/ci.yml"),
        );
        assert_eq!(result, Some(PathBuf::from("../../.codeguide/ci.yml")));
    }

    #[cfg(windows)]
    #[test]
    fn test_relative_symlink_path_windows_different_drives() {
        let result = relative_symlink_path(
            Path::new("C:\\project\\.tool"),
            Path::new("D:\\cache\\tool"),
        );
        assert_eq!(result, None);
    }

    #[test]
    fn test_resolve_relative_path() {
        assert_eq!(
            resolve_relative_path(Path::new("/project"), Path::new("./vendor/../lib")),
            PathBuf::from("/project/lib")
        );
        assert_eq!(
            resolve_relative_path(Path::new("/project"), Path::new("/abs/lib")),
            PathBuf::from("/abs/lib")
        );
    }

    #[test]
    fn test_expand_home() {
        let home = Path::new("/home/user");
        assert_eq!(
            expand_home("~/src/toolbelt", Some(home)),
            PathBuf::from("/home/user/src/toolbelt")
        );
        assert_eq!(expand_home("~", Some(home)), PathBuf::from("/home/user"));
        assert_eq!(
            expand_home("./local", Some(home)),
            PathBuf::from("./local")
        );
        assert_eq!(expand_home("~/x", None), PathBuf::from("~/x"));
    }
}
