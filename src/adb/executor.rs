use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::types::CommandResult;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One concrete device-tool invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub(crate) fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ExecError {
    Launch(std::io::Error),
    Timeout,
}

pub trait CommandExecutor: Send + Sync {
    /// Runs the command to completion or until `timeout` elapses.
    fn execute(&self, command: &CommandLine, timeout: Duration) -> Result<CommandResult, ExecError>;
}

/// Runs commands as child processes, killing them at the deadline.
#[derive(Clone, Debug, Default)]
pub struct ProcessExecutor;

impl CommandExecutor for ProcessExecutor {
    fn execute(&self, command: &CommandLine, timeout: Duration) -> Result<CommandResult, ExecError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExecError::Launch)?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ExecError::Timeout);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    let _ = child.kill();
                    return Err(ExecError::Launch(err));
                }
            }
        };

        Ok(CommandResult {
            code: status.code(),
            stdout: stdout.map(collect_reader).unwrap_or_default(),
            stderr: stderr.map(collect_reader).unwrap_or_default(),
        })
    }
}

fn spawn_reader<R>(mut source: R) -> mpsc::Receiver<Vec<u8>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = source.read_to_end(&mut buffer);
        let _ = tx.send(buffer);
    });
    rx
}

fn collect_reader(rx: mpsc::Receiver<Vec<u8>>) -> String {
    rx.recv()
        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
        .unwrap_or_default()
}
