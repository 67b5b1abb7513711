//! Recovery command script (`ubuntu_command`).
//!
//! The Ubuntu installer in recovery reads this file on the next boot. Its
//! grammar is fixed:
//!
//! ```text
//! format data
//! format system
//! load_keyring <file> [<signature>]   (once per keyring)
//! mount system
//! update <file> [<signature>]         (once per install file)
//! unmount system
//! ```
//!
//! A file without a detached signature is written with the signature argument
//! left out.

use crate::manifest::{InstallInfo, UbuntuFile};
use crate::{InstallError, Result};
use mrom_hal::{ShellCommand, ShellScript, SuOps};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    FormatData,
    FormatSystem,
    LoadKeyring {
        payload: String,
        signature: Option<String>,
    },
    MountSystem,
    Update {
        payload: String,
        signature: Option<String>,
    },
    UnmountSystem,
}

fn write_file_args(
    f: &mut fmt::Formatter<'_>,
    payload: &str,
    signature: &Option<String>,
) -> fmt::Result {
    write!(f, " {}", payload)?;
    if let Some(sig) = signature {
        write!(f, " {}", sig)?;
    }
    Ok(())
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::FormatData => write!(f, "format data"),
            Directive::FormatSystem => write!(f, "format system"),
            Directive::LoadKeyring { payload, signature } => {
                write!(f, "load_keyring")?;
                write_file_args(f, payload, signature)
            }
            Directive::MountSystem => write!(f, "mount system"),
            Directive::Update { payload, signature } => {
                write!(f, "update")?;
                write_file_args(f, payload, signature)
            }
            Directive::UnmountSystem => write!(f, "unmount system"),
        }
    }
}

fn file_args(file: &UbuntuFile) -> Result<(String, Option<String>)> {
    Ok((
        file.filename()?.to_string(),
        file.signature_filename()?.map(str::to_string),
    ))
}

/// Where the parser is in the fixed directive sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Start,
    FormattedData,
    FormattedSystem,
    Mounted,
    Unmounted,
}

fn script_err(line_no: usize, line: &str, what: &str) -> InstallError {
    InstallError::CommandScript(format!("line {}: {} ({:?})", line_no + 1, what, line))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandScript {
    directives: Vec<Directive>,
}

impl CommandScript {
    pub fn from_info(info: &InstallInfo) -> Result<Self> {
        let list = info.download_list();
        let mut directives = vec![Directive::FormatData, Directive::FormatSystem];
        for file in list.keyrings() {
            let (payload, signature) = file_args(file)?;
            directives.push(Directive::LoadKeyring { payload, signature });
        }
        directives.push(Directive::MountSystem);
        for file in list.install_files() {
            let (payload, signature) = file_args(file)?;
            directives.push(Directive::Update { payload, signature });
        }
        directives.push(Directive::UnmountSystem);
        Ok(Self { directives })
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn lines(&self) -> Vec<String> {
        self.directives.iter().map(ToString::to_string).collect()
    }

    /// File contents, one directive per line with a trailing newline.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Parse a script, rejecting anything out of the fixed order.
    pub fn parse(text: &str) -> Result<Self> {
        let mut section = Section::Start;
        let mut directives = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let words: Vec<&str> = line.split_whitespace().collect();
            let (directive, next) = match words.as_slice() {
                [] => continue,
                ["format", "data"] if section == Section::Start => {
                    (Directive::FormatData, Section::FormattedData)
                }
                ["format", "system"] if section == Section::FormattedData => {
                    (Directive::FormatSystem, Section::FormattedSystem)
                }
                ["load_keyring", payload, rest @ ..]
                    if section == Section::FormattedSystem && rest.len() <= 1 =>
                {
                    let directive = Directive::LoadKeyring {
                        payload: payload.to_string(),
                        signature: rest.first().map(|s| s.to_string()),
                    };
                    (directive, section)
                }
                ["mount", "system"] if section == Section::FormattedSystem => {
                    (Directive::MountSystem, Section::Mounted)
                }
                ["update", payload, rest @ ..] if section == Section::Mounted && rest.len() <= 1 => {
                    let directive = Directive::Update {
                        payload: payload.to_string(),
                        signature: rest.first().map(|s| s.to_string()),
                    };
                    (directive, section)
                }
                ["unmount", "system"] if section == Section::Mounted => {
                    (Directive::UnmountSystem, Section::Unmounted)
                }
                _ => return Err(script_err(line_no, line, "unexpected directive")),
            };
            directives.push(directive);
            section = next;
        }

        if section != Section::Unmounted {
            return Err(InstallError::CommandScript(
                "script does not end with unmount system".into(),
            ));
        }
        Ok(Self { directives })
    }

    /// Write the script to `dest` through su.
    ///
    /// All lines go to `<dest>.tmp`, which is then renamed over `dest`, in one
    /// round trip chained with `&&`. A failure leaves no file named `dest`.
    pub fn write(&self, su: &dyn SuOps, dest: &Path, timeout: Duration) -> Result<()> {
        let tmp = temp_path(dest);
        let mut script = ShellScript::new();
        for (i, line) in self.lines().iter().enumerate() {
            let cmd = ShellCommand::print_line(line);
            script.push(if i == 0 {
                cmd.write_to(&tmp)
            } else {
                cmd.append_to(&tmp)
            });
        }
        script.push(ShellCommand::rename(&tmp, dest));

        if let Err(err) = su.run_confirmed(&script, timeout) {
            let cleanup = ShellScript::single(ShellCommand::new("rm").arg("-f").path_arg(&tmp));
            let _ = su.run(&cleanup, timeout);
            return Err(InstallError::CommandScript(err.to_string()));
        }
        log::info!("Wrote {} ({} directives)", dest.display(), self.directives.len());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
