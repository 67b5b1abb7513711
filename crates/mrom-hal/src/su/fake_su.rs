//! Fake root shell for testing.
//!
//! Records every script it is given. By default nothing is executed and any
//! script ending in `echo success` is answered with the success marker. With
//! [`FakeSu::with_local_shell`] scripts really run through an unprivileged
//! `sh`, which lets tests stage files into a temporary directory.

use super::process::run_script;
use super::{ShellScript, SuOps, SUCCESS_MARKER};
use crate::SuResult;
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Script handed to the shell.
    Script { rendered: String, timeout_secs: u64 },
    /// Script matched an injected failure and produced no output.
    Rejected { rendered: String },
}

impl Operation {
    pub fn rendered(&self) -> &str {
        match self {
            Operation::Script { rendered, .. } | Operation::Rejected { rendered } => rendered,
        }
    }
}

#[derive(Debug, Default)]
struct FakeSuState {
    operations: Vec<Operation>,
    /// Substrings that make a matching script fail.
    failures: Vec<String>,
    local_shell: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSu {
    state: Arc<Mutex<FakeSuState>>,
}

impl FakeSu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute scripts with the local `sh` instead of only recording them.
    pub fn with_local_shell() -> Self {
        let fake = Self::new();
        fake.state().local_shell = true;
        fake
    }

    fn state(&self) -> MutexGuard<'_, FakeSuState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every later script whose rendering contains `pattern` fail.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.state().failures.push(pattern.into());
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Rendered text of every script, rejected ones included.
    pub fn scripts(&self) -> Vec<String> {
        self.state()
            .operations
            .iter()
            .map(|op| op.rendered().to_string())
            .collect()
    }

    pub fn operation_count(&self) -> usize {
        self.state().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.state().operations.iter().any(check)
    }

    /// Clear recorded operations. Injected failures stay in place.
    pub fn clear(&self) {
        self.state().operations.clear();
    }

    fn record_operation(&self, op: Operation) {
        self.state().operations.push(op);
    }
}

impl SuOps for FakeSu {
    fn run(&self, script: &ShellScript, timeout: Duration) -> SuResult<Vec<String>> {
        let rendered = script.render();
        let (rejected, local_shell) = {
            let state = self.state();
            let rejected = state.failures.iter().any(|p| rendered.contains(p.as_str()));
            (rejected, state.local_shell)
        };

        if rejected {
            log::info!("FAKE SU: rejecting {}", rendered);
            self.record_operation(Operation::Rejected { rendered });
            return Ok(Vec::new());
        }

        log::info!("FAKE SU: {}", rendered);
        self.record_operation(Operation::Script {
            rendered: rendered.clone(),
            timeout_secs: timeout.as_secs(),
        });

        if local_shell {
            return run_script("sh", Command::new("sh"), &rendered, timeout);
        }

        let ends_confirmed = script
            .commands()
            .last()
            .is_some_and(|cmd| {
                cmd.program() == "echo"
                    && cmd.arguments().len() == 1
                    && cmd.arguments()[0] == SUCCESS_MARKER
            });
        if ends_confirmed {
            Ok(vec![SUCCESS_MARKER.to_string()])
        } else {
            Ok(Vec::new())
        }
    }
}
