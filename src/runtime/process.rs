//! External command execution.

use anyhow::{Context, Result, anyhow};
use log::debug;
use std::io::ErrorKind;
use std::process::Command;

use super::{CommandOutput, RealRuntime};

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn run_command_impl(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Running {} {}", program, args.join(" "));

        let output = match Command::new(program).args(args).output() {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(anyhow!("`{}` was not found on PATH", program));
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to run `{}`", program)),
        };

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};

    #[test]
    fn test_missing_program_is_reported() {
        let err = RealRuntime
            .run_command("pkglink-definitely-missing-tool", &[])
            .unwrap_err();
        assert!(err.to_string().contains("was not found on PATH"));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout_and_exit_status() {
        let ok = RealRuntime
            .run_command("sh", &["-c".to_string(), "echo hello".to_string()])
            .unwrap();
        assert!(ok.success);
        assert_eq!(ok.last_stdout_line(), Some("hello"));

        let failed = RealRuntime
            .run_command("sh", &["-c".to_string(), "echo boom >&2; exit 3".to_string()])
            .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.code, Some(3));
        assert_eq!(failed.stderr.trim(), "boom");
    }
}
