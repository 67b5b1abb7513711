//! The privileged command contract.

use super::{ShellCommand, ShellScript};
use crate::{SuError, SuResult};
use std::sync::Arc;
use std::time::Duration;

/// Line a confirmed script prints once every command in it has succeeded.
pub const SUCCESS_MARKER: &str = "success";

/// A privileged round trip succeeded only if its first output line is exactly
/// [`SUCCESS_MARKER`]. Empty output counts as failure.
pub fn is_confirmed(lines: &[String]) -> bool {
    lines.first().is_some_and(|line| line == SUCCESS_MARKER)
}

/// Root shell runner.
///
/// Each call is one blocking round trip: submit the script, wait (bounded by
/// `timeout`) for the shell to exit, get stdout back as ordered lines.
pub trait SuOps: Send + Sync {
    fn run(&self, script: &ShellScript, timeout: Duration) -> SuResult<Vec<String>>;

    /// Run `script` followed by `echo success` and require the marker.
    fn run_confirmed(&self, script: &ShellScript, timeout: Duration) -> SuResult<()> {
        let confirmed = script
            .clone()
            .then(ShellCommand::new("echo").arg(SUCCESS_MARKER));
        let lines = self.run(&confirmed, timeout)?;
        if is_confirmed(&lines) {
            Ok(())
        } else {
            Err(SuError::NotConfirmed(script.render()))
        }
    }

    /// Like [`SuOps::run_confirmed`] but folds every failure into `false`.
    fn check(&self, script: &ShellScript, timeout: Duration) -> bool {
        match self.run_confirmed(script, timeout) {
            Ok(()) => true,
            Err(err) => {
                log::debug!("su check failed: {}", err);
                false
            }
        }
    }
}

impl<T: SuOps + ?Sized> SuOps for Arc<T> {
    fn run(&self, script: &ShellScript, timeout: Duration) -> SuResult<Vec<String>> {
        (**self).run(script, timeout)
    }
}

impl<T: SuOps + ?Sized> SuOps for &T {
    fn run(&self, script: &ShellScript, timeout: Duration) -> SuResult<Vec<String>> {
        (**self).run(script, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn confirmation_requires_exact_first_line() {
        assert!(is_confirmed(&lines(&["success"])));
        assert!(is_confirmed(&lines(&["success", "trailing"])));
        assert!(!is_confirmed(&lines(&[])));
        assert!(!is_confirmed(&lines(&["noise", "success"])));
        assert!(!is_confirmed(&lines(&["success "])));
        assert!(!is_confirmed(&lines(&["SUCCESS"])));
    }
}
