//! Ways of materialising a package into a staging directory.

use anyhow::{Result, anyhow, bail};
use log::debug;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

const SITE_PACKAGES_SCRIPT: &str = "import site; print(site.getsitepackages()[0])";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallStrategy {
    /// Let `uvx` build an ephemeral environment, then copy its site-packages.
    Uvx,
    /// `uv pip install --target` straight into the staging directory.
    UvPipTarget,
}

impl InstallStrategy {
    pub const DEFAULT_CHAIN: [InstallStrategy; 2] =
        [InstallStrategy::Uvx, InstallStrategy::UvPipTarget];

    pub fn program(&self) -> &'static str {
        match self {
            InstallStrategy::Uvx => "uvx",
            InstallStrategy::UvPipTarget => "uv",
        }
    }

    pub fn args(&self, install_string: &str, staging: &Path, force_reinstall: bool) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            InstallStrategy::Uvx => {
                if force_reinstall {
                    args.push("--force-reinstall".to_string());
                }
                args.extend([
                    "--from".to_string(),
                    install_string.to_string(),
                    "python".to_string(),
                    "-c".to_string(),
                    SITE_PACKAGES_SCRIPT.to_string(),
                ]);
            }
            InstallStrategy::UvPipTarget => {
                args.extend([
                    "pip".to_string(),
                    "install".to_string(),
                    install_string.to_string(),
                    "--target".to_string(),
                    staging.to_string_lossy().to_string(),
                ]);
                if force_reinstall {
                    args.push("--reinstall".to_string());
                }
            }
        }
        args
    }

    /// Run the strategy and leave a self-contained install at `staging`.
    #[tracing::instrument(skip(self, runtime))]
    pub fn fetch<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        install_string: &str,
        staging: &Path,
        force_reinstall: bool,
    ) -> Result<()> {
        let program = self.program();
        let args = self.args(install_string, staging, force_reinstall);
        let output = runtime.run_command(program, &args)?;

        if !output.success {
            let code = output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            bail!("`{}` exited with {}: {}", program, code, output.stderr.trim());
        }

        match self {
            InstallStrategy::Uvx => {
                let site_packages = output
                    .last_stdout_line()
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("`uvx` did not report a site-packages directory"))?;
                if !runtime.is_dir(&site_packages) {
                    bail!("`uvx` reported {:?}, which is not a directory", site_packages);
                }
                debug!("Copying {:?} into {:?}", site_packages, staging);
                runtime.copy_dir_all(&site_packages, staging)?;
            }
            InstallStrategy::UvPipTarget => {
                if !runtime.is_dir(staging) {
                    bail!("`uv pip install` did not create {:?}", staging);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for InstallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStrategy::Uvx => write!(f, "uvx"),
            InstallStrategy::UvPipTarget => write!(f, "uv pip install --target"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CommandOutput, MockRuntime};
    use mockall::predicate::eq;

    #[test]
    fn test_uvx_args() {
        let staging = Path::new("/cache/.staging");
        assert_eq!(
            InstallStrategy::Uvx.args("toolbelt==1.0", staging, false),
            vec!["--from", "toolbelt==1.0", "python", "-c", SITE_PACKAGES_SCRIPT]
        );
        assert_eq!(
            InstallStrategy::Uvx.args("toolbelt", staging, true)[0],
            "--force-reinstall"
        );
    }

    #[test]
    fn test_uv_pip_target_args() {
        let staging = Path::new("/cache/.staging");
        let args = InstallStrategy::UvPipTarget.args("toolbelt", staging, true);
        assert_eq!(
            args,
            vec!["pip", "install", "toolbelt", "--target", "/cache/.staging", "--reinstall"]
        );
    }

    #[test]
    fn test_uvx_fetch_copies_site_packages() {
        let mut runtime = MockRuntime::new();
        let staging = PathBuf::from("/cache/.staging-toolbelt");
        let site = PathBuf::from("/uv/envs/abc/lib/python3.12/site-packages");

        let site_out = format!("{}\n", site.display());
        runtime
            .expect_run_command()
            .withf(|program, _| program == "uvx")
            .times(1)
            .returning(move |_, _| {
                Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    stdout: site_out.clone(),
                    stderr: String::new(),
                })
            });
        runtime
            .expect_is_dir()
            .with(eq(site.clone()))
            .returning(|_| true);
        runtime
            .expect_copy_dir_all()
            .with(eq(site), eq(staging.clone()))
            .times(1)
            .returning(|_, _| Ok(()));

        InstallStrategy::Uvx
            .fetch(&runtime, "toolbelt", &staging, false)
            .unwrap();
    }

    #[test]
    fn test_failed_command_reports_stderr() {
        let mut runtime = MockRuntime::new();
        runtime.expect_run_command().returning(|_, _| {
            Ok(CommandOutput {
                success: false,
                code: Some(2),
                stdout: String::new(),
                stderr: "error: no solution found\n".to_string(),
            })
        });

        let err = InstallStrategy::UvPipTarget
            .fetch(&runtime, "toolbelt", Path::new("/cache/.staging"), false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`uv` exited with 2: error: no solution found"
        );
    }

    #[test]
    fn test_uvx_without_output_fails() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_run_command()
            .returning(|_, _| Ok(CommandOutput {
                success: true,
                ..Default::default()
            }));

        let err = InstallStrategy::Uvx
            .fetch(&runtime, "toolbelt", Path::new("/cache/.staging"), false)
            .unwrap_err();
        assert!(err.to_string().contains("did not report"));
    }
}
