//! Scripted device tool used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adb::executor::{CommandExecutor, CommandLine, ExecError};
use crate::adb::{AdbSyntax, DeviceTool};
use crate::settings::AppSettings;
use crate::state::AppController;
use crate::types::CommandResult;

pub(crate) const LIST: &str = "adb -s dev shell pm list packages";
pub(crate) const LIST_SYSTEM: &str = "adb -s dev shell pm list packages -s";
pub(crate) const WAIT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub(crate) enum Scripted {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    Timeout,
    Missing,
}

type Hook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Inner {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
    hook: Mutex<Option<Hook>>,
}

/// Answers command lines from a script; unscripted commands exit 0 silently.
///
/// Several responses queued for one command are returned in order and the
/// last one repeats.
#[derive(Clone, Default)]
pub(crate) struct ScriptedExecutor {
    inner: Arc<Inner>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ok(self, line: &str, stdout: &str) -> Self {
        self.push(
            line,
            Scripted::Exit {
                code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
        self
    }

    pub(crate) fn fail(self, line: &str, code: i32, stderr: &str) -> Self {
        self.push(
            line,
            Scripted::Exit {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
        self
    }

    pub(crate) fn timeout(self, line: &str) -> Self {
        self.push(line, Scripted::Timeout);
        self
    }

    pub(crate) fn push(&self, line: &str, response: Scripted) {
        let mut responses = self.inner.responses.lock().unwrap();
        responses
            .entry(line.to_string())
            .or_default()
            .push_back(response);
    }

    /// Replaces every queued response for `line`.
    pub(crate) fn set(&self, line: &str, response: Scripted) {
        let mut responses = self.inner.responses.lock().unwrap();
        responses.insert(line.to_string(), VecDeque::from(vec![response]));
    }

    pub(crate) fn on_execute<F>(self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.inner.hook.lock().unwrap() = Some(Arc::new(hook));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_matching(&self, needle: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.contains(needle))
            .collect()
    }

    pub(crate) fn tool(&self) -> DeviceTool {
        DeviceTool::new(
            Arc::new(self.clone()),
            Arc::new(AdbSyntax::default()),
            Duration::from_secs(30),
        )
    }

    fn next_response(&self, line: &str) -> Option<Scripted> {
        let mut responses = self.inner.responses.lock().unwrap();
        let queue = responses.get_mut(line)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &CommandLine, _timeout: Duration) -> Result<CommandResult, ExecError> {
        let line = command.to_string();
        self.inner.calls.lock().unwrap().push(line.clone());

        let hook = self.inner.hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(&line);
        }

        match self.next_response(&line) {
            None => Ok(CommandResult {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }),
            Some(Scripted::Exit {
                code,
                stdout,
                stderr,
            }) => Ok(CommandResult {
                code: Some(code),
                stdout,
                stderr,
            }),
            Some(Scripted::Timeout) => Err(ExecError::Timeout),
            Some(Scripted::Missing) => Err(ExecError::Launch(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            ))),
        }
    }
}

pub(crate) fn package_listing(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("package:{}\n", name))
        .collect()
}

/// Controller bound to device `dev` with its first load already applied.
pub(crate) fn loaded_controller(executor: &ScriptedExecutor) -> AppController {
    let controller = AppController::new(executor.tool(), AppSettings::default());
    controller.select_device("dev").unwrap();
    assert!(controller.wait_until_idle(WAIT));
    controller
}
