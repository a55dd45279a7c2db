//! Projects that `uvx --from` can run.
//!
//! `pkglink tool` turns an installed package into a small hatchling project
//! under `.pkglink/<project>/`:
//!
//! ```text
//! .pkglink/<project>/
//!   pyproject.toml
//!   .pkglink-metadata.yaml
//!   src/<module> -> {cache}/<module>
//! ```
//!
//! Version, console scripts, and dependencies come from the package's
//! `*.dist-info` directory in the install.

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::batch::workflow::METADATA_FILE;
use crate::error::{PkglinkError, Result};
use crate::link::{LinkManager, LinkMode, LinkState};
use crate::runtime::Runtime;

pub const PYPROJECT_FILE: &str = "pyproject.toml";
pub const DEFAULT_REQUIRES_PYTHON: &str = ">=3.11";

const BUILD_REQUIRES: &str = "hatchling";
const BUILD_BACKEND: &str = "hatchling.build";

static EXTRA_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bextra\s*==").unwrap());

/// What the install's `*.dist-info` says about the package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistInfo {
    pub dir: PathBuf,
    /// Distribution name as spelled in the directory name.
    pub name: String,
    pub version: String,
    pub console_scripts: BTreeMap<String, String>,
    pub summary: Option<String>,
    pub requires_python: Option<String>,
    pub dependencies: Vec<String>,
}

/// `Summary`, `Requires-Python` and `Requires-Dist` from a METADATA file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreMetadata {
    pub summary: Option<String>,
    pub requires_python: Option<String>,
    pub requires_dist: Vec<String>,
}

/// Lowercase, with `-` and `.` folded into `_` as in dist-info names.
pub fn normalize_dist_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// The `{name}-{version}.dist-info` directory for `project_name`.
pub fn find_dist_info<R: Runtime + ?Sized>(
    runtime: &R,
    install_dir: &Path,
    project_name: &str,
) -> Result<(PathBuf, String, String)> {
    let wanted = normalize_dist_name(project_name);
    let entries = runtime
        .read_dir(install_dir)
        .map_err(|e| PkglinkError::io(format!("Failed to read {:?}", install_dir), e))?;

    let mut found: Vec<(PathBuf, String, String)> = entries
        .into_iter()
        .filter_map(|path| {
            let file_name = path.file_name()?.to_string_lossy().to_string();
            let stem = file_name.strip_suffix(".dist-info")?;
            let (name, version) = stem.split_once('-')?;
            (normalize_dist_name(name) == wanted)
                .then(|| (path.clone(), name.to_string(), version.to_string()))
        })
        .collect();
    found.sort();

    found
        .into_iter()
        .next()
        .ok_or_else(|| PkglinkError::DistInfoNotFound {
            project_name: project_name.to_string(),
            install_dir: install_dir.to_path_buf(),
        })
}

#[tracing::instrument(skip(runtime))]
pub fn read_dist_info<R: Runtime + ?Sized>(
    runtime: &R,
    install_dir: &Path,
    project_name: &str,
) -> Result<DistInfo> {
    let (dir, name, version) = find_dist_info(runtime, install_dir, project_name)?;
    let read = |file: &str| -> Result<Option<String>> {
        let path = dir.join(file);
        if !runtime.exists(&path) {
            return Ok(None);
        }
        runtime
            .read_to_string(&path)
            .map(Some)
            .map_err(|e| PkglinkError::io(format!("Failed to read {:?}", path), e))
    };

    let console_scripts = read("entry_points.txt")?
        .map(|content| parse_entry_points(&content))
        .unwrap_or_default();
    let metadata = read("METADATA")?
        .map(|content| parse_metadata(&content))
        .unwrap_or_default();
    let dependencies = metadata
        .requires_dist
        .into_iter()
        .filter(|req| !EXTRA_MARKER.is_match(req))
        .collect();

    debug!(
        "{:?}: version {}, scripts {:?}",
        dir,
        version,
        console_scripts.keys().collect::<Vec<_>>()
    );
    Ok(DistInfo {
        dir,
        name,
        version,
        console_scripts,
        summary: metadata.summary,
        requires_python: metadata.requires_python,
        dependencies,
    })
}

/// The `[console_scripts]` section of an `entry_points.txt`.
pub fn parse_entry_points(content: &str) -> BTreeMap<String, String> {
    let mut scripts = BTreeMap::new();
    let mut in_section = false;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = section.trim() == "console_scripts";
            continue;
        }
        if in_section && let Some((name, target)) = line.split_once('=') {
            scripts.insert(name.trim().to_string(), target.trim().to_string());
        }
    }
    scripts
}

/// Header block of a METADATA file; the body after the first blank line is
/// the long description and is ignored.
pub fn parse_metadata(content: &str) -> CoreMetadata {
    let mut metadata = CoreMetadata::default();
    for line in content.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "summary" if !value.is_empty() => metadata.summary = Some(value),
            "requires-python" if !value.is_empty() => metadata.requires_python = Some(value),
            "requires-dist" if !value.is_empty() => metadata.requires_dist.push(value),
            _ => {}
        }
    }
    metadata
}

#[derive(Serialize)]
struct PyProject<'a> {
    #[serde(rename = "build-system")]
    build_system: BuildSystem,
    project: ProjectTable<'a>,
    tool: toml::Table,
}

#[derive(Serialize)]
struct BuildSystem {
    requires: Vec<&'static str>,
    #[serde(rename = "build-backend")]
    build_backend: &'static str,
}

#[derive(Serialize)]
struct ProjectTable<'a> {
    name: String,
    version: &'a str,
    description: String,
    #[serde(rename = "requires-python")]
    requires_python: &'a str,
    dependencies: &'a [String],
    #[serde(skip_serializing_if = "no_scripts")]
    scripts: &'a BTreeMap<String, String>,
}

fn no_scripts(scripts: &&BTreeMap<String, String>) -> bool {
    scripts.is_empty()
}

/// One generated project under `.pkglink/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolProject {
    pub project_dir: PathBuf,
    pub module_name: String,
    /// What `src/<module>` links to.
    pub package_dir: PathBuf,
    pub dist: DistInfo,
}

impl ToolProject {
    pub fn new(
        project_dir: PathBuf,
        module_name: impl Into<String>,
        package_dir: PathBuf,
        dist: DistInfo,
    ) -> Self {
        Self {
            project_dir,
            module_name: module_name.into(),
            package_dir,
            dist,
        }
    }

    /// Name in `pyproject.toml` and for `uvx --refresh-package`.
    pub fn package_name(&self) -> String {
        self.dist.name.replace('_', "-")
    }

    pub fn pyproject_path(&self) -> PathBuf {
        self.project_dir.join(PYPROJECT_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.project_dir.join(METADATA_FILE)
    }

    pub fn package_link(&self) -> PathBuf {
        self.project_dir.join("src").join(&self.module_name)
    }

    pub fn render_pyproject(&self) -> Result<String> {
        let name = self.package_name();
        let pyproject = PyProject {
            build_system: BuildSystem {
                requires: vec![BUILD_REQUIRES],
                build_backend: BUILD_BACKEND,
            },
            project: ProjectTable {
                description: self
                    .dist
                    .summary
                    .clone()
                    .unwrap_or_else(|| format!("{} package", name)),
                name,
                version: &self.dist.version,
                requires_python: self
                    .dist
                    .requires_python
                    .as_deref()
                    .unwrap_or(DEFAULT_REQUIRES_PYTHON),
                dependencies: &self.dist.dependencies,
                scripts: &self.dist.console_scripts,
            },
            tool: wheel_packages(&self.module_name),
        };
        toml::to_string_pretty(&pyproject)
            .map_err(|e| PkglinkError::io("Failed to render pyproject.toml", e.into()))
    }

    /// Create the directory, the package link, and `pyproject.toml`.
    ///
    /// Returns how the package was linked, or `None` when the link was
    /// already correct.
    #[tracing::instrument(skip(self, runtime), fields(project = %self.project_dir.display()))]
    pub fn write<R: Runtime + ?Sized>(&self, runtime: &R) -> Result<Option<LinkMode>> {
        runtime.create_dir_all(&self.project_dir).map_err(|e| {
            PkglinkError::io(format!("Failed to create {:?}", self.project_dir), e)
        })?;
        let mode = link_package(runtime, &self.package_dir, &self.package_link())?;

        let content = self.render_pyproject()?;
        let path = self.pyproject_path();
        runtime
            .write(&path, content.as_bytes())
            .map_err(|e| PkglinkError::io(format!("Failed to write {:?}", path), e))?;
        info!("Wrote {:?}", path);
        Ok(mode)
    }
}

/// What `pkglink tool` produced for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub project_dir: PathBuf,
    pub console_scripts: Vec<String>,
    pub refreshed: bool,
}

/// `[tool.hatch.build.targets.wheel] packages = ["src/<module>"]`
fn wheel_packages(module_name: &str) -> toml::Table {
    let mut table = toml::Table::new();
    table.insert(
        "packages".to_string(),
        toml::Value::Array(vec![toml::Value::String(format!("src/{}", module_name))]),
    );
    for key in ["wheel", "targets", "build", "hatch"] {
        let mut outer = toml::Table::new();
        outer.insert(key.to_string(), toml::Value::Table(table));
        table = outer;
    }
    table
}

/// Point `link` at `package_dir`, replacing whatever is there.
///
/// `link` lives in a directory pkglink generated, so an incorrect entry is
/// replaced without the dot-prefix check used for project links.
fn link_package<R: Runtime + ?Sized>(
    runtime: &R,
    package_dir: &Path,
    link: &Path,
) -> Result<Option<LinkMode>> {
    let manager = LinkManager::new(runtime);
    match manager.inspect(package_dir, link) {
        LinkState::Correct => {
            debug!("{:?} already points to {:?}", link, package_dir);
            return Ok(None);
        }
        LinkState::Absent => {}
        LinkState::Incorrect(reason) => {
            info!("Replacing {:?}: {}", link, reason);
            let removed = if runtime.is_symlink(link) {
                runtime.remove_symlink(link)
            } else if runtime.is_dir(link) {
                runtime.remove_dir_all(link)
            } else {
                runtime.remove_file(link)
            };
            removed.map_err(|e| PkglinkError::io(format!("Failed to remove {:?}", link), e))?;
        }
    }
    manager.create(package_dir, link).map(Some)
}

#[derive(Debug, Deserialize)]
struct RecordedSource {
    source_hash: Option<String>,
    install_spec: Option<String>,
}

/// Whether uvx has to rebuild its environment for this project.
///
/// True when there is no readable metadata yet, or when the recorded source
/// hash or install spec differs from the current one.
pub fn needs_refresh<R: Runtime + ?Sized>(
    runtime: &R,
    metadata_path: &Path,
    source_hash: Option<&str>,
    install_spec: &str,
) -> bool {
    if !runtime.exists(metadata_path) {
        debug!("No {:?} yet; refresh needed", metadata_path);
        return true;
    }

    let recorded = runtime
        .read_to_string(metadata_path)
        .map_err(|e| format!("{:#}", e))
        .and_then(|content| {
            serde_yaml::from_str::<RecordedSource>(&content).map_err(|e| e.to_string())
        });
    match recorded {
        Ok(recorded) => {
            let changed = recorded.source_hash.as_deref() != source_hash
                || recorded.install_spec.as_deref() != Some(install_spec);
            debug!(
                "Recorded {:?}/{:?}, current {:?}/{}: changed={}",
                recorded.source_hash, recorded.install_spec, source_hash, install_spec, changed
            );
            changed
        }
        Err(e) => {
            warn!("Cannot read {:?} ({}); assuming it changed", metadata_path, e);
            true
        }
    }
}

pub fn refresh_args(package: &str, project_dir: &Path) -> Vec<String> {
    vec![
        "--refresh-package".to_string(),
        package.to_string(),
        "--from".to_string(),
        project_dir.to_string_lossy().to_string(),
        "--help".to_string(),
    ]
}

/// Make uvx rebuild its cached environment for the project. A failure is
/// only logged; the project on disk is already complete.
#[tracing::instrument(skip(runtime, project), fields(package = %project.package_name()))]
pub fn refresh<R: Runtime + ?Sized>(runtime: &R, project: &ToolProject) -> bool {
    let package = project.package_name();
    let args = refresh_args(&package, &project.project_dir);
    match runtime.run_command("uvx", &args) {
        Ok(output) if output.success => {
            info!("uvx refreshed {}", package);
            true
        }
        Ok(output) => {
            warn!("uvx refresh of {} failed: {}", package, output.stderr.trim());
            false
        }
        Err(e) => {
            warn!("uvx refresh of {} failed: {:#}", package, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CommandOutput, MockRuntime, RealRuntime};
    use std::fs;
    use tempfile::tempdir;

    const METADATA: &str = "Metadata-Version: 2.1\n\
        Name: toolbelt\n\
        Version: 1.0.0\n\
        Summary: Shared project tooling\n\
        Requires-Python: >=3.10\n\
        Requires-Dist: rich>=13\n\
        Requires-Dist: pyyaml; python_version < \"4\"\n\
        Requires-Dist: pytest; extra == \"test\"\n\
        \n\
        Requires-Dist: not-a-header\n";

    fn site_packages(root: &Path) -> PathBuf {
        let site = root.join("site-packages");
        fs::create_dir_all(site.join("toolbelt")).unwrap();
        let dist = site.join("toolbelt-1.0.0.dist-info");
        fs::create_dir_all(&dist).unwrap();
        fs::write(
            dist.join("entry_points.txt"),
            "[console_scripts]\ntoolbelt = toolbelt.cli:main\n\n[gui_scripts]\ntb-gui = toolbelt.gui:main\n",
        )
        .unwrap();
        fs::write(dist.join("METADATA"), METADATA).unwrap();
        fs::create_dir_all(site.join("toolbelt_extras-0.1.dist-info")).unwrap();
        site
    }

    #[test]
    fn test_normalize_dist_name() {
        assert_eq!(normalize_dist_name("Pkglink-Integration.Pkg"), "pkglink_integration_pkg");
        assert_eq!(normalize_dist_name("toolbelt"), "toolbelt");
    }

    #[test]
    fn test_parse_entry_points_reads_console_scripts_only() {
        let scripts = parse_entry_points(
            "# generated\n[console_scripts]\ntb = toolbelt.cli:main\n tb-lint=toolbelt.lint:run \n\n\
             [gui_scripts]\ntb-gui = toolbelt.gui:main\n",
        );
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts["tb"], "toolbelt.cli:main");
        assert_eq!(scripts["tb-lint"], "toolbelt.lint:run");
    }

    #[test]
    fn test_parse_metadata_stops_at_body() {
        let metadata = parse_metadata(METADATA);
        assert_eq!(metadata.summary.as_deref(), Some("Shared project tooling"));
        assert_eq!(metadata.requires_python.as_deref(), Some(">=3.10"));
        assert_eq!(
            metadata.requires_dist,
            vec![
                "rich>=13",
                "pyyaml; python_version < \"4\"",
                "pytest; extra == \"test\""
            ]
        );
    }

    #[test]
    fn test_read_dist_info_drops_extras() {
        let dir = tempdir().unwrap();
        let site = site_packages(dir.path());

        let info = read_dist_info(&RealRuntime, &site, "toolbelt").unwrap();
        assert_eq!(info.name, "toolbelt");
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.dir, site.join("toolbelt-1.0.0.dist-info"));
        assert_eq!(info.console_scripts.len(), 1);
        assert_eq!(info.dependencies, vec!["rich>=13", "pyyaml; python_version < \"4\""]);
    }

    #[test]
    fn test_dist_info_lookup_normalizes_names() {
        let mut runtime = MockRuntime::new();
        let site = PathBuf::from("/cache/pkg_abc");
        runtime.expect_read_dir().returning(|dir| {
            Ok(vec![
                dir.join("pkglink_integration_pkg"),
                dir.join("pkglink_integration_pkg-0.2.0.dist-info"),
            ])
        });

        let (dir, name, version) =
            find_dist_info(&runtime, &site, "pkglink-integration-pkg").unwrap();
        assert_eq!(dir, site.join("pkglink_integration_pkg-0.2.0.dist-info"));
        assert_eq!(name, "pkglink_integration_pkg");
        assert_eq!(version, "0.2.0");
    }

    #[test]
    fn test_missing_dist_info_suggests_project_name() {
        let dir = tempdir().unwrap();
        let site = site_packages(dir.path());

        let err = read_dist_info(&RealRuntime, &site, "acme-toolbelt").unwrap_err();
        assert!(matches!(err, PkglinkError::DistInfoNotFound { .. }));
        assert!(err.to_string().contains("you may need to provide --project-name"));
    }

    #[test]
    fn test_render_pyproject() {
        let dist = DistInfo {
            name: "toolbelt_core".to_string(),
            version: "1.0.0".to_string(),
            console_scripts: BTreeMap::from([(
                "toolbelt".to_string(),
                "toolbelt.cli:main".to_string(),
            )]),
            dependencies: vec!["rich>=13".to_string()],
            ..Default::default()
        };
        let project = ToolProject::new(
            PathBuf::from("/p/.pkglink/toolbelt"),
            "toolbelt",
            PathBuf::from("/c/toolbelt"),
            dist,
        );

        let rendered = project.render_pyproject().unwrap();
        let value: toml::Value = toml::from_str(&rendered).unwrap();
        assert_eq!(value["build-system"]["build-backend"].as_str(), Some("hatchling.build"));
        assert_eq!(value["project"]["name"].as_str(), Some("toolbelt-core"));
        assert_eq!(value["project"]["version"].as_str(), Some("1.0.0"));
        assert_eq!(value["project"]["description"].as_str(), Some("toolbelt-core package"));
        assert_eq!(value["project"]["requires-python"].as_str(), Some(">=3.11"));
        assert_eq!(value["project"]["dependencies"][0].as_str(), Some("rich>=13"));
        assert_eq!(
            value["project"]["scripts"]["toolbelt"].as_str(),
            Some("toolbelt.cli:main")
        );
        assert_eq!(
            value["tool"]["hatch"]["build"]["targets"]["wheel"]["packages"][0].as_str(),
            Some("src/toolbelt")
        );
    }

    #[cfg_attr(
        pkglink_skip_cross_windows_tests,
        ignore = "cross windows tests disabled; set PKGLINK_RUN_CROSS_WINDOWS_TESTS=1 to enable"
    )]
    #[test]
    fn test_write_builds_project_and_relinks_package() {
        let dir = tempdir().unwrap();
        let site = site_packages(dir.path());
        let dist = read_dist_info(&RealRuntime, &site, "toolbelt").unwrap();
        let project = ToolProject::new(
            dir.path().join("project/.pkglink/toolbelt"),
            "toolbelt",
            site.join("toolbelt"),
            dist,
        );

        assert_eq!(project.write(&RealRuntime).unwrap(), Some(LinkMode::Symlink));
        assert!(project.pyproject_path().exists());
        assert_eq!(
            RealRuntime.canonicalize(&project.package_link()).unwrap(),
            RealRuntime.canonicalize(&site.join("toolbelt")).unwrap()
        );
        assert_eq!(project.write(&RealRuntime).unwrap(), None);

        // a package link pointing elsewhere is replaced
        let moved = ToolProject {
            package_dir: site.join("toolbelt_extras-0.1.dist-info"),
            ..project.clone()
        };
        assert_eq!(moved.write(&RealRuntime).unwrap(), Some(LinkMode::Symlink));
        assert!(site.join("toolbelt").exists());
    }

    #[test]
    fn test_needs_refresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(METADATA_FILE);
        assert!(needs_refresh(&RealRuntime, &path, Some("abcd1234"), "toolbelt@1.0.0"));

        fs::write(
            &path,
            "label: toolbelt\nsource_hash: abcd1234\ninstall_spec: toolbelt@1.0.0\n",
        )
        .unwrap();
        assert!(!needs_refresh(&RealRuntime, &path, Some("abcd1234"), "toolbelt@1.0.0"));
        assert!(needs_refresh(&RealRuntime, &path, Some("ffff0000"), "toolbelt@1.0.0"));
        assert!(needs_refresh(&RealRuntime, &path, Some("abcd1234"), "toolbelt@2.0.0"));

        fs::write(&path, ": not yaml: [").unwrap();
        assert!(needs_refresh(&RealRuntime, &path, Some("abcd1234"), "toolbelt@1.0.0"));
    }

    #[test]
    fn test_refresh_failure_is_not_an_error() {
        let mut runtime = MockRuntime::new();
        let project = ToolProject::new(
            PathBuf::from("/p/.pkglink/toolbelt"),
            "toolbelt",
            PathBuf::from("/c/toolbelt"),
            DistInfo {
                name: "toolbelt".to_string(),
                ..Default::default()
            },
        );
        runtime
            .expect_run_command()
            .withf(|program, args| {
                program == "uvx"
                    && args == refresh_args("toolbelt", Path::new("/p/.pkglink/toolbelt"))
            })
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    success: false,
                    code: Some(2),
                    stdout: String::new(),
                    stderr: "no network".to_string(),
                })
            });

        assert!(!refresh(&runtime, &project));
    }
}
