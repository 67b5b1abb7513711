//! Real root shell backed by the device's `su` binary.

use super::process::run_script;
use super::{ShellScript, SuOps};
use crate::SuResult;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Runs scripts as `su -c '<script>'`.
#[derive(Debug, Clone)]
pub struct SuShell {
    su_binary: PathBuf,
}

impl Default for SuShell {
    fn default() -> Self {
        Self::new("su")
    }
}

impl SuShell {
    pub fn new(su_binary: impl Into<PathBuf>) -> Self {
        Self {
            su_binary: su_binary.into(),
        }
    }

    pub fn su_binary(&self) -> &Path {
        &self.su_binary
    }
}

impl SuOps for SuShell {
    fn run(&self, script: &ShellScript, timeout: Duration) -> SuResult<Vec<String>> {
        let program = self.su_binary.to_string_lossy();
        let rendered = script.render();
        log::debug!("{} -c {}", program, rendered);
        run_script(&program, Command::new(&self.su_binary), &rendered, timeout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{ShellCommand, SuError};

    // `sh` stands in for `su`: both accept `-c <script>`.
    fn sh() -> SuShell {
        SuShell::new("sh")
    }

    #[test]
    fn default_binary_is_su() {
        assert_eq!(SuShell::default().su_binary(), Path::new("su"));
    }

    #[test]
    fn captures_ordered_lines() {
        let script = ShellScript::single(ShellCommand::new("echo").arg("one"))
            .then(ShellCommand::new("echo").arg("two"));
        let lines = sh().run(&script, Duration::from_secs(10)).unwrap();
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn confirmed_script_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("base_url");
        let script = ShellScript::single(
            ShellCommand::print_line("http://system-image.example").write_to(&target),
        );
        sh().run_confirmed(&script, Duration::from_secs(10)).unwrap();
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "http://system-image.example\n"
        );
    }

    #[test]
    fn failing_chain_is_not_confirmed() {
        let script = ShellScript::single(ShellCommand::file_exists(Path::new(
            "/definitely/not/here",
        )));
        let err = sh().run_confirmed(&script, Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, SuError::CommandFailed { .. }));
    }

    #[test]
    fn missing_binary_is_reported() {
        let shell = SuShell::new("/nonexistent/su-binary");
        let err = shell
            .run(&ShellScript::single(ShellCommand::new("true")), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SuError::CommandNotFound(_)));
    }

    #[test]
    fn hung_command_times_out() {
        let script = ShellScript::single(ShellCommand::new("sleep").arg("5"));
        let err = sh().run(&script, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, SuError::CommandTimeout { .. }));
    }
}
