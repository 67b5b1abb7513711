//! Structured shell commands.
//!
//! Callers never splice paths into command text. Arguments are kept as a list
//! and quoted here, when the script is rendered for `sh -c`.

use std::path::{Path, PathBuf};

/// Quote `value` as a single `sh` word.
pub fn shell_escape(value: &str) -> String {
    if value.is_empty() {
        "''".to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\"'\"'"))
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Output redirection for a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// `> path`
    Truncate(PathBuf),
    /// `>> path`
    Append(PathBuf),
}

/// A program invocation with its arguments and optional stdout redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    redirect: Option<Redirect>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            redirect: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path_str(path))
    }

    /// Redirect stdout into `path`, truncating it.
    pub fn write_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.redirect = Some(Redirect::Truncate(path.into()));
        self
    }

    /// Redirect stdout into `path`, appending.
    pub fn append_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.redirect = Some(Redirect::Append(path.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// `cat src > dst`
    pub fn copy_file(src: &Path, dst: &Path) -> Self {
        Self::new("cat").path_arg(src).write_to(dst)
    }

    /// `rm -rf path`
    pub fn remove_tree(path: &Path) -> Self {
        Self::new("rm").arg("-rf").path_arg(path)
    }

    /// `mkdir -p path`
    pub fn make_dirs(path: &Path) -> Self {
        Self::new("mkdir").arg("-p").path_arg(path)
    }

    /// `mv -f src dst`
    pub fn rename(src: &Path, dst: &Path) -> Self {
        Self::new("mv").arg("-f").path_arg(src).path_arg(dst)
    }

    /// `test -f path`
    pub fn file_exists(path: &Path) -> Self {
        Self::new("test").arg("-f").path_arg(path)
    }

    /// `test -d path`
    pub fn dir_exists(path: &Path) -> Self {
        Self::new("test").arg("-d").path_arg(path)
    }

    /// `printf '%s\n' line` (redirect it to write the line into a file).
    pub fn print_line(line: &str) -> Self {
        Self::new("printf").arg("%s\\n").arg(line)
    }

    pub fn render(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&shell_escape(arg));
        }
        match &self.redirect {
            Some(Redirect::Truncate(path)) => {
                out.push_str(" > ");
                out.push_str(&shell_escape(&path_str(path)));
            }
            Some(Redirect::Append(path)) => {
                out.push_str(" >> ");
                out.push_str(&shell_escape(&path_str(path)));
            }
            None => {}
        }
        out
    }
}

/// A chain of commands executed in one privileged round trip.
///
/// Commands are joined with `&&`: the chain stops at the first failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellScript {
    commands: Vec<ShellCommand>,
}

impl ShellScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(command: ShellCommand) -> Self {
        Self {
            commands: vec![command],
        }
    }

    pub fn then(mut self, command: ShellCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn push(&mut self, command: ShellCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[ShellCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn render(&self) -> String {
        self.commands
            .iter()
            .map(ShellCommand::render)
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

impl From<ShellCommand> for ShellScript {
    fn from(command: ShellCommand) -> Self {
        Self::single(command)
    }
}
