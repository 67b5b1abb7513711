//! MultiROM privileged shell layer.
//!
//! Everything that needs root on the device goes through [`SuOps`], so the
//! install workflow can be exercised against [`FakeSu`] without a rooted
//! device.

mod error;
pub mod su;

pub use error::{SuError, SuResult};
pub use su::{
    is_confirmed, shell_escape, FakeSu, Operation, Redirect, ShellCommand, ShellScript, SuOps,
    SuShell, SUCCESS_MARKER,
};
