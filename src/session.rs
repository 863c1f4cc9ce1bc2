//! Line-driven interactive session over one device.
//!
//! Stdin is read on a helper thread so a running batch can still be
//! cancelled while the controller pumps events on this thread.

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::state::AppController;
use crate::types::{PackageFilter, PackageOperation};

const TICK: Duration = Duration::from_millis(100);

const HELP: &str = "\
list                      show displayed packages
filter all|user|system    change the display filter
search <pattern>          regex search (case-insensitive)
next | prev | clear       navigate or clear search matches
focus <row> | scroll <n>  move the focus row or scroll offset
select|unselect <name>..  change selection by package name
toggle <row>..            flip rows together (like the space key)
copy [row..]              print names of rows plus the focused row
selected                  show selected packages
detail <name>             show dumpsys details
run uninstall|enable|disable|reset
cancel                    stop the running operation
reload | history | status | help | quit";

enum Input {
    Line(String),
    Closed,
}

fn spawn_stdin_reader() -> mpsc::Receiver<Input> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Input::Line(line)).is_err() {
                        return;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = tx.send(Input::Closed);
    });
    rx
}

pub(crate) fn run_session(controller: &AppController, serial: &str) -> Result<()> {
    controller.select_device(serial)?;
    let input = spawn_stdin_reader();
    let mut last_progress = String::new();
    let mut was_busy = true;
    let mut waiting: Vec<String> = Vec::new();

    loop {
        controller.pump();
        report_progress(controller, &mut last_progress);

        let ready = finished_details(controller, &mut waiting);
        for text in &ready {
            println!("{text}");
        }
        if !ready.is_empty() {
            prompt();
        }

        let busy = controller.state.borrow().is_busy();
        if was_busy && !busy {
            if let Some(status) = controller.status_message() {
                println!("{status}");
            }
            prompt();
        }
        was_busy = busy;

        match input.recv_timeout(TICK) {
            Ok(Input::Line(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    prompt();
                    continue;
                }
                if matches!(line, "quit" | "exit") {
                    controller.cancel_operation();
                    return Ok(());
                }
                if let Err(err) = execute(controller, line, &mut waiting) {
                    println!("error: {err}");
                }
                if !controller.state.borrow().is_busy() {
                    prompt();
                }
            }
            Ok(Input::Closed) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                controller.cancel_operation();
                return Ok(());
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }
}

fn prompt() {
    print!("apkdeck> ");
    let _ = io::stdout().flush();
}

fn report_progress(controller: &AppController, last: &mut String) {
    let line = {
        let state = controller.state.borrow();
        state
            .operation_progress
            .as_ref()
            .or(state.load_progress.as_ref().filter(|_| state.load_in_progress))
            .map(|progress| format!("[{:>3.0}%] {}", progress.fraction * 100.0, progress.label))
    };
    if let Some(line) = line {
        if *last != line {
            println!("{line}");
            *last = line;
        }
    }
}

fn parse_rows(args: &[&str]) -> Result<Vec<usize>> {
    args.iter()
        .map(|arg| {
            arg.parse::<usize>()
                .map_err(|_| anyhow::anyhow!("'{arg}' is not a row number"))
        })
        .collect()
}

/// Detail texts for queued requests that have finished, in request order.
fn finished_details(controller: &AppController, waiting: &mut Vec<String>) -> Vec<String> {
    let mut ready = Vec::new();
    waiting.retain(|name| {
        if controller.detail_in_flight(name) {
            return true;
        }
        ready.push(detail_text(controller, name));
        false
    });
    ready
}

fn detail_text(controller: &AppController, name: &str) -> String {
    let Some(detail) = controller.package_detail(name) else {
        return match controller.package_detail_error(name) {
            Some(error) => format!("{name}: {error}"),
            None => format!("{name}: no details available"),
        };
    };
    let kind = match controller.state.borrow().inventory.get(name) {
        Some(record) if record.is_system => "system",
        Some(_) => "user",
        None => "not installed",
    };
    format!("{}\nKind: {kind}", detail.clipboard_text(name))
}

fn execute(controller: &AppController, line: &str, waiting: &mut Vec<String>) -> Result<()> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(());
    };
    let args: Vec<&str> = parts.collect();
    debug!(command, "session command");

    match command {
        "help" => println!("{HELP}"),
        "list" => print_rows(controller),
        "filter" => {
            let filter = args
                .first()
                .and_then(|key| PackageFilter::from_key(key))
                .ok_or_else(|| anyhow::anyhow!("usage: filter all|user|system"))?;
            controller.set_filter(filter);
            print_rows(controller);
        }
        "search" => {
            let pattern = line.trim_start_matches("search").trim();
            let count = controller.search(pattern)?;
            println!("{count} match{}", if count == 1 { "" } else { "es" });
            print_focus(controller);
        }
        "next" => {
            controller.search_next();
            print_focus(controller);
        }
        "prev" => {
            controller.search_previous();
            print_focus(controller);
        }
        "clear" => controller.reset_search(),
        "focus" => {
            let row = parse_rows(&args)?.first().copied();
            controller.focus_row(row);
            print_focus(controller);
        }
        "scroll" => {
            let offset = parse_rows(&args)?.first().copied().unwrap_or(0);
            controller.set_scroll_offset(offset);
        }
        "select" | "unselect" => {
            let value = command == "select";
            for name in &args {
                if !controller.toggle(name, value) {
                    println!("{name}: unchanged");
                }
            }
        }
        "toggle" => {
            let changed = controller.toggle_rows(&parse_rows(&args)?);
            println!("{changed} row{} changed", if changed == 1 { "" } else { "s" });
        }
        "copy" => match controller.copy_names(&parse_rows(&args)?) {
            Some(text) => println!("{text}"),
            None => println!("nothing to copy"),
        },
        "selected" => {
            for name in controller.state.borrow().selection.selected_names() {
                println!("{name}");
            }
        }
        "detail" => {
            let name = args
                .first()
                .ok_or_else(|| anyhow::anyhow!("usage: detail <package>"))?;
            if controller.package_detail(name).is_some() {
                println!("{}", detail_text(controller, name));
            } else {
                controller.request_package_detail(name)?;
                if !waiting.iter().any(|queued| queued == name) {
                    waiting.push(name.to_string());
                }
                println!("fetching details for {name}...");
            }
        }
        "run" => {
            let operation = args
                .first()
                .and_then(|key| PackageOperation::from_key(key))
                .ok_or_else(|| anyhow::anyhow!("usage: run uninstall|enable|disable|reset"))?;
            let total = controller.start_operation(operation)?;
            println!("{} {} package{}...", operation.label(), total, if total == 1 { "" } else { "s" });
        }
        "cancel" => {
            if !controller.cancel_operation() {
                println!("no operation is running");
            }
        }
        "reload" => {
            controller.request_load()?;
        }
        "history" => {
            for record in controller.operation_history() {
                let finished = record
                    .completed_at
                    .map(|at| at.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "--:--:--".to_string());
                println!(
                    "{}-{} {:<9} {:<9} {}",
                    record.started_at.format("%H:%M:%S"),
                    finished,
                    record.operation.label(),
                    record.status.label(),
                    record.package_name
                );
            }
        }
        "status" => print_status(controller),
        other => println!("unknown command '{other}' (try help)"),
    }
    Ok(())
}

fn print_rows(controller: &AppController) {
    let state = controller.state.borrow();
    let rows = controller.visible_rows();
    for (row, record) in rows.iter().enumerate() {
        let focus = if state.view.focused_row == Some(row) { '>' } else { ' ' };
        let hit = if state.search.highlighted() == Some(row) {
            '#'
        } else if state.search.is_match(row) {
            '*'
        } else {
            ' '
        };
        let check = if record.selected { "[x]" } else { "[ ]" };
        let kind = if record.is_system { "system" } else { "user" };
        println!("{focus}{hit}{row:>5} {check} {kind:<6} {}", record.name);
    }
}

fn print_focus(controller: &AppController) {
    let state = controller.state.borrow();
    match state.view.focused_row.and_then(|row| state.display_name_at(row).map(|name| (row, name))) {
        Some((row, name)) => println!("> {row} {name}"),
        None => println!("no focused row"),
    }
}

fn print_status(controller: &AppController) {
    let state = controller.state.borrow();
    println!(
        "device: {}  packages: {} ({} shown)  selected: {}",
        state.device.as_deref().unwrap_or("-"),
        state.inventory.len(),
        state.displayed.len(),
        state.selection.len()
    );
    if let Some(pattern) = state.search.pattern().filter(|_| state.search.is_active()) {
        println!("search: {} ({} matches)", pattern, state.search.matches().len());
    }
    if let Some(refreshed) = state.inventory_last_refresh {
        println!("loaded: {}", refreshed.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(outcome) = &state.last_outcome {
        println!(
            "last {}: {:.0}% done, {} failed{}",
            outcome.operation.label(),
            outcome.completed_fraction() * 100.0,
            outcome.failed.len(),
            if outcome.cancelled { ", cancelled" } else { "" }
        );
    }
    if let Some(error) = &state.last_load_error {
        println!("last load error: {error}");
    }
}
