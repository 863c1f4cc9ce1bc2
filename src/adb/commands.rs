use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::executor::{CommandExecutor, CommandLine, ExecError};
use super::parser::{
    parse_devices_output, parse_dumpsys_package, parse_package_lines, parse_package_set,
    summarize_output_line,
};
use crate::details::PackageDetail;
use crate::error::{Error, Result};
use crate::types::{CommandResult, PackageOperation};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    Version,
    ListDevices,
    ListPackages,
    ListSystemPackages,
    DumpPackage(String),
    Apply(PackageOperation, String),
}

/// Turns typed device commands into concrete command lines.
pub trait CommandSyntax: Send + Sync {
    fn command_line(&self, device: Option<&str>, command: &DeviceCommand) -> CommandLine;
}

#[derive(Clone, Debug)]
pub struct AdbSyntax {
    program: String,
}

impl AdbSyntax {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for AdbSyntax {
    fn default() -> Self {
        Self::new("adb")
    }
}

impl CommandSyntax for AdbSyntax {
    fn command_line(&self, device: Option<&str>, command: &DeviceCommand) -> CommandLine {
        let mut args: Vec<String> = Vec::new();
        if let Some(serial) = device {
            args.push("-s".to_string());
            args.push(serial.to_string());
        }

        let tail: Vec<&str> = match command {
            DeviceCommand::Version => vec!["version"],
            DeviceCommand::ListDevices => vec!["devices"],
            DeviceCommand::ListPackages => vec!["shell", "pm", "list", "packages"],
            DeviceCommand::ListSystemPackages => vec!["shell", "pm", "list", "packages", "-s"],
            DeviceCommand::DumpPackage(package) => vec!["shell", "dumpsys", "package", package.as_str()],
            DeviceCommand::Apply(operation, package) => match operation {
                PackageOperation::Uninstall => vec!["uninstall", package.as_str()],
                PackageOperation::Enable => vec!["shell", "pm", "enable", package.as_str()],
                PackageOperation::Disable => vec!["shell", "pm", "disable-user", package.as_str()],
                PackageOperation::Reset => vec!["shell", "pm", "default-state", package.as_str()],
            },
        };
        args.extend(tail.into_iter().map(str::to_string));

        CommandLine::new(self.program.clone(), args)
    }
}

/// Executor, syntax and timeout bound together; cheap to clone into tasks.
#[derive(Clone)]
pub struct DeviceTool {
    executor: Arc<dyn CommandExecutor>,
    syntax: Arc<dyn CommandSyntax>,
    timeout: Duration,
}

impl DeviceTool {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        syntax: Arc<dyn CommandSyntax>,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            syntax,
            timeout,
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs a command; a non-zero exit is still `Ok`.
    pub(crate) fn run(&self, device: Option<&str>, command: &DeviceCommand) -> Result<CommandResult> {
        let line = self.syntax.command_line(device, command);
        debug!(command = %line, "running device command");
        match self.executor.execute(&line, self.timeout) {
            Ok(result) => Ok(result),
            Err(ExecError::Timeout) => Err(Error::Timeout {
                command: line.to_string(),
                after: self.timeout,
            }),
            Err(ExecError::Launch(source)) => Err(Error::Launch {
                command: line.to_string(),
                source,
            }),
        }
    }

    /// Runs a command and maps a non-zero exit to `CommandFailure`.
    pub(crate) fn run_checked(
        &self,
        device: Option<&str>,
        command: &DeviceCommand,
    ) -> Result<CommandResult> {
        let result = self.run(device, command)?;
        if result.success() {
            return Ok(result);
        }

        let line = self.syntax.command_line(device, command);
        Err(Error::CommandFailure {
            command: line.to_string(),
            code: result.code,
            stderr: failure_text(&result),
        })
    }
}

fn failure_text(result: &CommandResult) -> String {
    if !result.stderr.trim().is_empty() {
        result.stderr.trim().to_string()
    } else {
        summarize_output_line(&result.stdout).unwrap_or_default()
    }
}

pub(crate) fn check_tool_available(tool: &DeviceTool) -> Result<String> {
    let result = tool.run_checked(None, &DeviceCommand::Version)?;
    Ok(summarize_output_line(&result.stdout).unwrap_or_default())
}

pub(crate) fn run_list_devices(tool: &DeviceTool) -> Result<Vec<String>> {
    let result = tool.run_checked(None, &DeviceCommand::ListDevices)?;
    Ok(parse_devices_output(&result.stdout))
}

pub(crate) fn run_list_packages(tool: &DeviceTool, device: &str) -> Result<Vec<String>> {
    let result = tool.run_checked(Some(device), &DeviceCommand::ListPackages)?;
    Ok(parse_package_lines(&result.stdout))
}

pub(crate) fn run_list_system_packages(tool: &DeviceTool, device: &str) -> Result<BTreeSet<String>> {
    let result = tool.run_checked(Some(device), &DeviceCommand::ListSystemPackages)?;
    Ok(parse_package_set(&result.stdout))
}

pub(crate) fn query_package_detail(
    tool: &DeviceTool,
    device: &str,
    package: &str,
) -> Result<PackageDetail> {
    let result = tool.run_checked(
        Some(device),
        &DeviceCommand::DumpPackage(package.to_string()),
    )?;
    Ok(parse_dumpsys_package(&result.stdout))
}

pub(crate) fn run_package_operation(
    tool: &DeviceTool,
    device: &str,
    operation: PackageOperation,
    package: &str,
) -> Result<CommandResult> {
    tool.run(
        Some(device),
        &DeviceCommand::Apply(operation, package.to_string()),
    )
}
