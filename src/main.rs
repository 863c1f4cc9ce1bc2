mod adb;
mod cli;
mod details;
mod error;
mod session;
mod settings;
mod state;
mod types;

#[cfg(test)]
mod test_support;

use std::env;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::adb::{AdbSyntax, DeviceTool, ProcessExecutor, truncate_for_summary};
use crate::cli::{Command, USAGE, parse_args};
use crate::session::run_session;
use crate::settings::{AppSettings, app_settings_path, load_app_settings, save_app_settings};
use crate::state::AppController;
use crate::state::types::TaskProgress;
use crate::types::{PackageOperation, is_valid_package_name};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn main() -> Result<ExitCode> {
    let settings = load_app_settings();
    init_tracing(&settings);

    let command = parse_args(env::args().skip(1))?;
    let tool = DeviceTool::new(
        Arc::new(ProcessExecutor),
        Arc::new(AdbSyntax::new(settings.adb_path.as_str())),
        settings.command_timeout(),
    );
    let controller = AppController::new(tool, settings);

    match command {
        Command::Help => {
            println!("{USAGE}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { init } => show_config(&controller.settings, init),
        Command::Devices => list_devices(&controller),
        Command::List {
            serial,
            filter,
            search,
        } => list_packages(&controller, &serial, filter, search.as_deref()),
        Command::Detail {
            serial,
            package,
            raw,
        } => show_detail(&controller, &serial, &package, raw),
        Command::Apply {
            operation,
            serial,
            packages,
            yes,
        } => apply_operation(&controller, operation, &serial, &packages, yes),
        Command::Shell { serial } => {
            run_session(&controller, &serial)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(settings: &AppSettings) {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            settings
                .log_filter
                .as_deref()
                .and_then(|directives| EnvFilter::try_new(directives).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(io::stderr)
        .init();
}

fn show_config(settings: &AppSettings, init: bool) -> Result<ExitCode> {
    let path = app_settings_path().context("unable to determine settings directory")?;
    if init {
        if path.exists() {
            bail!("settings file already exists at {}", path.display());
        }
        save_app_settings(settings).context("failed to write settings")?;
        println!("Wrote default settings to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(ExitCode::SUCCESS)
}

fn list_devices(controller: &AppController) -> Result<ExitCode> {
    let version = controller
        .check_tool()
        .context("adb is not available; set adb_path in the settings file")?;
    tracing::debug!(version = %version, "device tool found");

    let devices = controller.list_devices()?;
    if devices.is_empty() {
        eprintln!("No devices connected.");
        return Ok(ExitCode::FAILURE);
    }
    for device in devices {
        println!("{device}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Pumps controller events until idle, echoing progress labels to stderr.
fn drive(controller: &AppController, ceiling: Duration) -> Result<()> {
    let mut last_label = String::new();
    let mut waited = Duration::ZERO;
    while !controller.wait_until_idle(POLL_INTERVAL) {
        waited += POLL_INTERVAL;
        if waited >= ceiling {
            bail!("gave up waiting after {}s", ceiling.as_secs());
        }

        let label = {
            let state = controller.state.borrow();
            state
                .operation_progress
                .as_ref()
                .or(state.load_progress.as_ref())
                .map(progress_line)
        };
        if let Some(label) = label {
            if label != last_label {
                eprintln!("{label}");
                last_label = label;
            }
        }
    }
    Ok(())
}

fn progress_line(progress: &TaskProgress) -> String {
    format!(
        "[{:>3}%] {}",
        (progress.fraction * 100.0).round() as u32,
        truncate_for_summary(&progress.label, 72)
    )
}

fn load_device(controller: &AppController, serial: &str) -> Result<()> {
    controller.select_device(serial)?;
    drive(controller, controller.tool.timeout() * 3)?;

    if let Some(error) = controller.state.borrow().last_load_error.clone() {
        bail!("failed to load packages from {serial}: {error}");
    }
    Ok(())
}

fn list_packages(
    controller: &AppController,
    serial: &str,
    filter: Option<crate::types::PackageFilter>,
    search: Option<&str>,
) -> Result<ExitCode> {
    load_device(controller, serial)?;
    if let Some(filter) = filter {
        controller.set_filter(filter);
    }

    let matches = match search {
        Some(pattern) => {
            controller.search(pattern)?;
            Some(controller.state.borrow().search.matches().to_vec())
        }
        None => None,
    };

    if controller.state.borrow().inventory.is_empty() {
        warn!(device = serial, "device reported no packages");
    }

    let rows = controller.visible_rows();
    for (row, record) in rows.iter().enumerate() {
        if let Some(matches) = &matches {
            if matches.binary_search(&row).is_err() {
                continue;
            }
        }
        let kind = if record.is_system { "system" } else { "user" };
        println!("{:<6} {}", kind, record.name);
    }

    if let Some(status) = controller.status_message() {
        eprintln!("{status}");
    }
    if let Some(matches) = matches {
        eprintln!("{} of {} displayed packages match", matches.len(), rows.len());
    }
    Ok(ExitCode::SUCCESS)
}

fn show_detail(
    controller: &AppController,
    serial: &str,
    package: &str,
    raw: bool,
) -> Result<ExitCode> {
    if !is_valid_package_name(package) {
        bail!("'{package}' is not a valid package name");
    }
    controller.select_device(serial)?;
    drive(controller, controller.tool.timeout() * 3)?;
    controller.request_package_detail(package)?;
    drive(controller, controller.tool.timeout() * 2)?;

    if let Some(error) = controller.package_detail_error(package) {
        bail!("failed to query {package}: {error}");
    }
    let detail = controller
        .package_detail(package)
        .with_context(|| format!("no details were returned for {package}"))?;

    if raw {
        println!("{}", detail.raw.trim_end());
    } else {
        println!("{}", detail.clipboard_text(package));
    }
    Ok(ExitCode::SUCCESS)
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

fn apply_operation(
    controller: &AppController,
    operation: PackageOperation,
    serial: &str,
    packages: &[String],
    yes: bool,
) -> Result<ExitCode> {
    if let Some(bad) = packages.iter().find(|name| !is_valid_package_name(name)) {
        bail!("'{bad}' is not a valid package name");
    }
    load_device(controller, serial)?;

    let names: Vec<&str> = packages.iter().map(String::as_str).collect();
    for name in &names {
        if !controller.state.borrow().inventory.contains(name) {
            warn!(package = %name, device = serial, "package not installed; skipping");
        }
    }
    if controller.batch_select(&names, true) == 0 {
        bail!("none of the given packages are installed on {serial}");
    }

    let targets = controller.state.borrow().selection.selected_names();
    if controller.settings.confirm_operations && !yes {
        let prompt = format!(
            "{} {} package{} on {}?\n  {}\nProceed?",
            capitalize(operation.label()),
            targets.len(),
            if targets.len() == 1 { "" } else { "s" },
            serial,
            targets.join("\n  ")
        );
        if !confirm(&prompt)? {
            eprintln!("Aborted.");
            return Ok(ExitCode::FAILURE);
        }
    }

    let total = controller.start_operation(operation)?;
    let ceiling = controller.tool.timeout() * (total as u32 + 3);
    drive(controller, ceiling)?;

    let Some(outcome) = controller.last_outcome() else {
        bail!("operation finished without a result");
    };
    println!("{}", outcome.summary());
    for record in controller.operation_history().iter().rev() {
        match record.error_message.as_deref() {
            Some(message) => println!("  {:<9} {}: {}", record.status.label(), record.package_name, message),
            None => println!("  {:<9} {}", record.status.label(), record.package_name),
        }
    }
    if let Some(error) = controller.state.borrow().last_load_error.as_deref() {
        eprintln!("Inventory reload failed: {error}");
    }

    if outcome.failed.is_empty() && !outcome.cancelled {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
