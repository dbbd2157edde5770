//! Launch an external command with a controlled environment, feed it lines
//! over stdin, and collect its exit status plus both output streams.
//!
//! Every `run()` call owns an independent child process and its pipes, so
//! invocations are safe to issue concurrently.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Invocation describes one execution of an external command.
/// It's owned by `run()` for the duration of a single call.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Executable to start.
    pub program: PathBuf,
    /// Positional arguments, in order.
    pub args: Vec<String>,
    /// Environment variables set for the child. Overrides are applied after
    /// removals and win on conflict.
    pub env_overrides: BTreeMap<String, String>,
    /// Environment variables removed from the inherited environment.
    pub env_removals: BTreeSet<String>,
    /// Lines written to the child's stdin, each with a trailing newline.
    /// The pipe is closed once all lines are written.
    pub stdin_lines: Vec<String>,
}

/// RunOutput is the collected result of a completed child process.
/// A non-zero exit is not an error of `run()`; callers inspect `code`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Exit code of the child, or None if it was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run the invocation to completion, pumping stdin concurrently with
/// draining stdout and stderr.
///
/// The concurrent pump matters: a child may fill its output pipe before it
/// has consumed all of its input, and a sequential write-then-wait would
/// deadlock on the full buffer. Writing, draining, and waiting are joined
/// instead.
///
/// Dropping the returned future abandons the wait and kills the child.
pub async fn run(invocation: Invocation) -> Result<RunOutput, RunError> {
    let Invocation {
        program,
        args,
        env_overrides,
        env_removals,
        stdin_lines,
    } = invocation;
    let program_display = program.display().to_string();

    let mut cmd = tokio::process::Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for name in &env_removals {
        cmd.env_remove(name);
    }
    for (name, value) in &env_overrides {
        cmd.env(name, value);
    }

    let mut child = cmd.spawn().map_err(|source| RunError::Launch {
        program: program_display.clone(),
        source,
    })?;

    let mut stdin = child.stdin.take().expect("stdin is piped");
    let mut stdout_pipe = child.stdout.take().expect("stdout is piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr is piped");

    let feed = async move {
        for line in &stdin_lines {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
        }
        // Dropping the handle closes the pipe, signalling end-of-input.
        stdin.shutdown().await?;
        Ok::<(), std::io::Error>(())
    };

    let (mut stdout, mut stderr) = (Vec::new(), Vec::new());
    let (feed, out, err, wait) = tokio::join!(
        feed,
        stdout_pipe.read_to_end(&mut stdout),
        stderr_pipe.read_to_end(&mut stderr),
        child.wait(),
    );

    // The child is free to exit without consuming its input, in which case
    // the write fails with a broken pipe. That's not an error of the run.
    if let Err(error) = feed {
        tracing::warn!(program = %program_display, %error, "i/o error writing to child stdin");
    }
    let status = wait.map_err(|source| RunError::Wait {
        program: program_display.clone(),
        source,
    })?;
    if let Err(error) = out {
        tracing::warn!(program = %program_display, %error, "i/o error reading child stdout");
    }
    if let Err(error) = err {
        tracing::warn!(program = %program_display, %error, "i/o error reading child stderr");
    }

    Ok(RunOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}
