//! Bounded execution of a shell interpreter (`su` or `sh`) with `-c <script>`.

use crate::{SuError, SuResult};
use std::io::Read;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use wait_timeout::ChildExt;

fn spawn_err(program: &str, err: std::io::Error) -> SuError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return SuError::CommandNotFound(program.to_string());
    }
    SuError::Io(err)
}

/// Read a pipe to the end on its own thread so the child never blocks on a
/// full pipe while we wait for it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

struct Pipes {
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
}

impl Pipes {
    fn take(child: &mut Child) -> Self {
        Self {
            stdout: drain::<ChildStdout>(child.stdout.take()),
            stderr: drain::<ChildStderr>(child.stderr.take()),
        }
    }

    fn collect(self) -> (Vec<u8>, Vec<u8>) {
        (
            self.stdout.join().unwrap_or_default(),
            self.stderr.join().unwrap_or_default(),
        )
    }
}

/// Run `<interpreter> -c <script>` and return stdout as ordered lines.
///
/// Stdin is closed so an interactive su prompt fails instead of hanging. A
/// non-zero exit is [`SuError::CommandFailed`]; expiry of `timeout` kills the
/// interpreter and is [`SuError::CommandTimeout`].
pub(crate) fn run_script(
    interpreter: &str,
    mut cmd: Command,
    script: &str,
    timeout: Duration,
) -> SuResult<Vec<String>> {
    cmd.arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| spawn_err(interpreter, e))?;
    let pipes = Pipes::take(&mut child);

    let Some(status) = child.wait_timeout(timeout)? else {
        let _ = child.kill();
        let _ = child.wait();
        let _ = pipes.collect();
        return Err(SuError::CommandTimeout {
            program: interpreter.to_string(),
            timeout_secs: timeout.as_secs(),
        });
    };

    let (stdout, stderr) = pipes.collect();
    if !status.success() {
        return Err(SuError::CommandFailed {
            program: interpreter.to_string(),
            code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }
    let text = String::from_utf8(stdout)?;
    Ok(text.lines().map(|line| line.trim_end().to_string()).collect())
}
