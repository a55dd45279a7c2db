use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use crate::link::LinkManager;
use crate::runtime::Runtime;

use super::config::Config;

/// Print the dot-prefixed links in `dir` (the working directory by default).
#[tracing::instrument(skip(runtime, config))]
pub fn list<R: Runtime>(runtime: R, dir: Option<PathBuf>, config: Config) -> Result<()> {
    let dir = match dir {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => config.base_dir.join(dir),
        None => config.base_dir,
    };
    debug!("Listing managed links in {:?}", dir);

    let links = LinkManager::new(&runtime).list_managed_links(&dir)?;
    if links.is_empty() {
        println!("No links found.");
        return Ok(());
    }

    for link in links {
        let name = link
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if runtime.is_symlink(&link) {
            match runtime.read_link(&link) {
                Ok(target) => println!("{} -> {}", name, target.display()),
                Err(e) => println!("{} -> (unreadable: {})", name, e),
            }
        } else {
            println!("{} (copy)", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    fn config() -> Config {
        Config {
            cache_root: PathBuf::from("/cache"),
            base_dir: PathBuf::from("/project"),
        }
    }

    #[test]
    fn test_list_empty_directory() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_dir()
            .with(eq(PathBuf::from("/project")))
            .returning(|_| Ok(vec![]));

        list(runtime, None, config()).unwrap();
    }

    #[test]
    fn test_list_symlinks_and_copies() {
        let mut runtime = MockRuntime::new();
        let link = PathBuf::from("/project/docs/.toolbelt");
        let copy = PathBuf::from("/project/docs/.guides");
        let plain = PathBuf::from("/project/docs/README.md");

        let (l, c, p) = (link.clone(), copy.clone(), plain.clone());
        runtime
            .expect_read_dir()
            .with(eq(PathBuf::from("/project/docs")))
            .returning(move |_| Ok(vec![c.clone(), p.clone(), l.clone()]));
        runtime
            .expect_is_symlink()
            .with(eq(link.clone()))
            .returning(|_| true);
        runtime
            .expect_is_symlink()
            .with(eq(copy.clone()))
            .returning(|_| false);
        runtime
            .expect_is_dir()
            .with(eq(copy))
            .returning(|_| true);
        runtime
            .expect_read_link()
            .with(eq(link))
            .times(1)
            .returning(|_| Ok(PathBuf::from("/cache/toolbelt/resources")));

        list(runtime, Some(PathBuf::from("docs")), config()).unwrap();
    }

    #[test]
    fn test_list_unreadable_directory() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_dir()
            .returning(|_| Err(anyhow::anyhow!("permission denied")));

        assert!(list(runtime, None, config()).is_err());
    }
}
