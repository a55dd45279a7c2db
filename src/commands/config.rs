use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;

use crate::install::default_cache_root;
use crate::runtime::{Runtime, expand_home, path::normalize_path};

/// Paths every command needs: where packages are cached and which
/// directory links are created in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub cache_root: PathBuf,
    pub base_dir: PathBuf,
}

impl Config {
    /// A relative `cache_dir` is taken from the working directory, so links
    /// into the cache stay valid wherever they are created.
    pub fn new<R: Runtime + ?Sized>(runtime: &R, cache_dir: Option<PathBuf>) -> Result<Self> {
        let base_dir = runtime
            .current_dir()
            .context("Failed to determine working directory")?;
        let cache_root = match cache_dir {
            Some(dir) if dir.starts_with("~") => {
                expand_home(&dir.to_string_lossy(), runtime.home_dir().as_deref())
            }
            Some(dir) => dir,
            None => default_cache_root(runtime).context("Failed to determine cache directory")?,
        };
        let cache_root = if cache_root.is_absolute() {
            cache_root
        } else {
            normalize_path(&base_dir.join(cache_root))
        };

        debug!("Cache root {:?}, base dir {:?}", cache_root, base_dir);
        Ok(Self {
            cache_root,
            base_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    #[cfg(unix)]
    #[test]
    fn test_explicit_cache_dir_wins() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_current_dir()
            .returning(|| Ok(PathBuf::from("/work/project")));

        let config = Config::new(&runtime, Some(PathBuf::from("/tmp/pkgcache"))).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/tmp/pkgcache"));
        assert_eq!(config.base_dir, PathBuf::from("/work/project"));
    }

    #[cfg(unix)]
    #[test]
    fn test_cache_dir_expands_home() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_home_dir()
            .returning(|| Some(PathBuf::from("/home/user")));
        runtime
            .expect_current_dir()
            .returning(|| Ok(PathBuf::from("/work")));

        let config = Config::new(&runtime, Some(PathBuf::from("~/pkgcache"))).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/home/user/pkgcache"));
    }

    #[cfg(unix)]
    #[test]
    fn test_default_cache_dir_from_env() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(eq("PKGLINK_CACHE_DIR"))
            .returning(|_| Ok("/var/cache/pkglink".to_string()));
        runtime.expect_home_dir().returning(|| None);
        runtime
            .expect_current_dir()
            .returning(|| Ok(PathBuf::from("/work")));

        let config = Config::new(&runtime, None).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/var/cache/pkglink"));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_cache_dir_is_anchored_at_base_dir() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_current_dir()
            .returning(|| Ok(PathBuf::from("/work/project")));

        let config = Config::new(&runtime, Some(PathBuf::from("./cache"))).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/work/project/cache"));
        assert!(config.cache_root.is_absolute());
    }

    #[test]
    fn test_current_dir_failure_is_reported() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_current_dir()
            .returning(|| Err(anyhow::anyhow!("gone")));

        let err = Config::new(&runtime, Some(PathBuf::from("/tmp/c"))).unwrap_err();
        assert!(format!("{:#}", err).contains("working directory"));
    }
}
