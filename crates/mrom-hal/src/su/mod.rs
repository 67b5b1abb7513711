//! Privileged command channel.
//!
//! This module defines the [`SuOps`] trait together with a real backend
//! ([`SuShell`]) and a recording backend for tests ([`FakeSu`]).

pub mod command;
pub mod fake_su;
mod process;
pub mod su_ops;
pub mod su_shell;

pub use command::{shell_escape, Redirect, ShellCommand, ShellScript};
pub use fake_su::{FakeSu, Operation};
pub use su_ops::{is_confirmed, SuOps, SUCCESS_MARKER};
pub use su_shell::SuShell;
