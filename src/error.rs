use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{command} exited with code {}: {}", display_code(.code), .stderr.trim())]
    CommandFailure {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} timed out after {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("Invalid search pattern: {0}")]
    Pattern(String),

    #[error("Internal inconsistency: {0}")]
    InvariantViolation(String),

    #[error("Another {0} is already running")]
    Busy(&'static str),

    #[error("No packages are selected")]
    NothingSelected,

    #[error("No device is selected")]
    NoDevice,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Coarse classification reported to event subscribers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    CommandFailure,
    Timeout,
    Pattern,
    InvariantViolation,
    Rejected,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CommandFailure { .. } | Error::Launch { .. } | Error::Io(_) => {
                ErrorKind::CommandFailure
            }
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Pattern(_) => ErrorKind::Pattern,
            Error::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Error::Busy(_) | Error::NothingSelected | Error::NoDevice | Error::Config(_) => {
                ErrorKind::Rejected
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::CommandFailure => write!(f, "command failure"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Pattern => write!(f, "pattern error"),
            ErrorKind::InvariantViolation => write!(f, "invariant violation"),
            ErrorKind::Rejected => write!(f, "rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_message_carries_stderr() {
        let err = Error::CommandFailure {
            command: "adb -s emulator-5554 shell pm list packages".to_string(),
            code: Some(1),
            stderr: "error: device offline\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "adb -s emulator-5554 shell pm list packages exited with code 1: error: device offline"
        );
        assert_eq!(err.kind(), ErrorKind::CommandFailure);
    }

    #[test]
    fn launch_failures_classify_as_command_failures() {
        let err = Error::Launch {
            command: "adb version".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.kind(), ErrorKind::CommandFailure);
        assert_eq!(
            Error::Timeout {
                command: "adb devices".to_string(),
                after: Duration::from_secs(30),
            }
            .to_string(),
            "adb devices timed out after 30s"
        );
    }
}
