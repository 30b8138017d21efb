//! Time-bounded external commands.
//!
//! Every synthesis stage is an executable with a deadline. The child is spawned with
//! `kill_on_drop`, so when the deadline fires and the wait future is dropped the process
//! is killed rather than left behind.

use crate::error::{VoiceError, VoiceResult};
use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const STDERR_TAIL: usize = 400;

#[derive(Debug, Clone)]
pub struct BoundedCommand {
    program: String,
    args: Vec<OsString>,
    stdin: Option<String>,
    limit: Duration,
}

impl BoundedCommand {
    pub fn new(program: impl Into<String>, limit: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            limit,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Text written to the child's standard input, which is then closed.
    pub fn stdin_text(mut self, text: impl Into<String>) -> Self {
        self.stdin = Some(text.into());
        self
    }

    /// Run to completion. Fails on spawn error, timeout or non-zero exit.
    pub async fn run(self) -> VoiceResult<()> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            VoiceError::Process(format!("{} could not be started: {}", self.program, e))
        })?;
        debug!(target: "pangool::process", program = %self.program, pid = ?child.id(), "Started");

        let input = self.stdin;
        let pipe = child.stdin.take();
        let completion = async move {
            if let (Some(text), Some(mut pipe)) = (input, pipe) {
                // A child that exits without reading closes the pipe; its exit status decides.
                let _ = pipe.write_all(text.as_bytes()).await;
                drop(pipe);
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.limit, completion).await {
            Ok(result) => result.map_err(|e| {
                VoiceError::Process(format!("waiting for {} failed: {}", self.program, e))
            })?,
            Err(_) => {
                return Err(VoiceError::Process(format!(
                    "{} timed out after {}s and was killed",
                    self.program,
                    self.limit.as_secs_f32()
                )))
            }
        };

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(VoiceError::Process(format!(
            "{} exited with {}: {}",
            self.program,
            output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            tail(stderr.trim(), STDERR_TAIL)
        )))
    }
}

fn tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    match s.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
