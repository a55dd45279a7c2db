//! Source specifications: where a package comes from.
//!
//! Three forms are accepted:
//!
//! - `github:org/name[@version]`
//! - `name[@version]` (a published package)
//! - a local path starting with `./`, `../`, `/`, `~` or a drive letter

use std::fmt;
use std::str::FromStr;

use crate::error::{PkglinkError, Result};

pub mod mutability;

pub use mutability::is_immutable;

const GITHUB_PREFIX: &str = "github:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Github,
    Package,
    Local,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Github => write!(f, "github"),
            SourceKind::Package => write!(f, "package"),
            SourceKind::Local => write!(f, "local"),
        }
    }
}

/// A parsed source. Each variant only carries the fields that make sense for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceSpec {
    Github {
        org: String,
        name: String,
        version: Option<String>,
    },
    Package {
        name: String,
        version: Option<String>,
    },
    Local {
        name: String,
        path: String,
    },
}

impl SourceSpec {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceSpec::Github { .. } => SourceKind::Github,
            SourceSpec::Package { .. } => SourceKind::Package,
            SourceSpec::Local { .. } => SourceKind::Local,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SourceSpec::Github { name, .. }
            | SourceSpec::Package { name, .. }
            | SourceSpec::Local { name, .. } => name,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            SourceSpec::Github { version, .. } | SourceSpec::Package { version, .. } => {
                version.as_deref()
            }
            SourceSpec::Local { .. } => None,
        }
    }

    pub fn org(&self) -> Option<&str> {
        match self {
            SourceSpec::Github { org, .. } => Some(org),
            _ => None,
        }
    }

    /// The unexpanded path of a local source.
    pub fn local_path(&self) -> Option<&str> {
        match self {
            SourceSpec::Local { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The string handed to the package tooling.
    ///
    /// ```
    /// use pkglink::source::SourceSpec;
    ///
    /// let spec: SourceSpec = "github:acme/tools@v1.2.0".parse().unwrap();
    /// assert_eq!(spec.install_string(), "git+https://github.com/acme/tools.git@v1.2.0");
    ///
    /// let spec: SourceSpec = "requests@2.31.0".parse().unwrap();
    /// assert_eq!(spec.install_string(), "requests==2.31.0");
    /// ```
    pub fn install_string(&self) -> String {
        match self {
            SourceSpec::Github { org, name, version } => {
                let base = format!("git+https://github.com/{}/{}.git", org, name);
                match version {
                    Some(v) => format!("{}@{}", base, v),
                    None => base,
                }
            }
            SourceSpec::Package { name, version } => match version {
                Some(v) => format!("{}=={}", name, v),
                None => name.clone(),
            },
            SourceSpec::Local { path, .. } => path.clone(),
        }
    }

    /// Name of the module looked up inside the installed package.
    pub fn module_name(&self) -> &str {
        self.name()
    }

    /// Default project name for entries installed from this source.
    pub fn project_name(&self) -> &str {
        self.name()
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Github { org, name, version } => {
                write!(f, "{}{}/{}", GITHUB_PREFIX, org, name)?;
                if let Some(v) = version {
                    write!(f, "@{}", v)?;
                }
                Ok(())
            }
            SourceSpec::Package { name, version } => {
                write!(f, "{}", name)?;
                if let Some(v) = version {
                    write!(f, "@{}", v)?;
                }
                Ok(())
            }
            SourceSpec::Local { path, .. } => write!(f, "{}", path),
        }
    }
}

impl FromStr for SourceSpec {
    type Err = PkglinkError;

    fn from_str(s: &str) -> Result<Self> {
        parse_source(s)
    }
}

/// Parse a raw source string. Pure: `~` is kept as-is and expanded by the installer.
pub fn parse_source(raw: &str) -> Result<SourceSpec> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(PkglinkError::invalid_source(raw, "source is empty"));
    }

    if let Some(rest) = input.strip_prefix(GITHUB_PREFIX) {
        return parse_github(raw, rest);
    }

    if is_local_path(input) {
        return parse_local(raw, input);
    }

    parse_package(raw, input)
}

fn parse_github(raw: &str, rest: &str) -> Result<SourceSpec> {
    let (repo, version) = split_version(raw, rest)?;

    let parts: Vec<&str> = repo.split('/').map(str::trim).collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(PkglinkError::invalid_source(
            raw,
            "expected github:org/name[@version]",
        ));
    }

    Ok(SourceSpec::Github {
        org: parts[0].to_string(),
        name: parts[1].to_string(),
        version,
    })
}

fn parse_package(raw: &str, input: &str) -> Result<SourceSpec> {
    if input.starts_with('@') {
        return Err(PkglinkError::invalid_source(
            raw,
            "package name must not start with '@'",
        ));
    }

    let (name, version) = split_version(raw, input)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(PkglinkError::invalid_source(raw, "package name is empty"));
    }

    Ok(SourceSpec::Package {
        name: name.to_string(),
        version,
    })
}

fn parse_local(raw: &str, input: &str) -> Result<SourceSpec> {
    let name = input
        .split(['/', '\\'])
        .rev()
        .find(|part| !part.is_empty())
        .filter(|part| !matches!(*part, "." | ".." | "~") && !is_drive(part))
        .ok_or_else(|| {
            PkglinkError::invalid_source(raw, "cannot derive a name from the local path")
        })?;

    Ok(SourceSpec::Local {
        name: name.to_string(),
        path: input.to_string(),
    })
}

/// Split `value@version`; an `@` with nothing after it is rejected.
fn split_version<'a>(raw: &str, value: &'a str) -> Result<(&'a str, Option<String>)> {
    match value.split_once('@') {
        Some((head, version)) => {
            let version = version.trim();
            if version.is_empty() {
                Err(PkglinkError::invalid_source(raw, "version after '@' is empty"))
            } else {
                Ok((head, Some(version.to_string())))
            }
        }
        None => Ok((value, None)),
    }
}

fn is_local_path(input: &str) -> bool {
    input.starts_with("./")
        || input.starts_with("../")
        || input.starts_with(".\\")
        || input.starts_with("..\\")
        || input.starts_with('/')
        || input.starts_with('~')
        || has_drive_prefix(input)
}

fn has_drive_prefix(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/')
}

fn is_drive(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
