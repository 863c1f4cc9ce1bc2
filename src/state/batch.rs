use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{info, warn};

use crate::adb::{DeviceTool, run_package_operation, summarize_output_line};
use crate::state::types::{AppMessage, TaskEvent};
use crate::types::{CommandResult, PackageOperation};

/// Text `adb uninstall` prints when it fails with exit code 0.
pub(crate) const UNINSTALL_FAILURE_MARKER: &str = "Failure";
pub(crate) const DONE_LABEL: &str = "done";

#[derive(Clone, Debug, Default)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ItemResult {
    pub(crate) package: String,
    pub(crate) success: bool,
    pub(crate) message: Option<String>,
}

/// Mutable state of one batch while it runs.
#[derive(Clone, Debug)]
pub(crate) struct OperationRun {
    pub(crate) operation: PackageOperation,
    pub(crate) targets: Vec<String>,
    pub(crate) completed: usize,
    pub(crate) failed: BTreeSet<String>,
    pub(crate) cancelled: bool,
    pub(crate) items: Vec<ItemResult>,
}

impl OperationRun {
    pub(crate) fn new(operation: PackageOperation, targets: Vec<String>) -> Self {
        Self {
            operation,
            targets,
            completed: 0,
            failed: BTreeSet::new(),
            cancelled: false,
            items: Vec::new(),
        }
    }
}

/// Terminal state of a batch, handed back to the interactive thread.
#[derive(Clone, Debug)]
pub(crate) struct BatchOutcome {
    pub(crate) device: String,
    pub(crate) operation: PackageOperation,
    pub(crate) targets: Vec<String>,
    pub(crate) completed: usize,
    pub(crate) failed: BTreeSet<String>,
    pub(crate) cancelled: bool,
    pub(crate) items: Vec<ItemResult>,
}

impl BatchOutcome {
    pub(crate) fn completed_fraction(&self) -> f32 {
        if self.targets.is_empty() {
            return 1.0;
        }
        self.completed as f32 / self.targets.len() as f32
    }

    pub(crate) fn unattempted(&self) -> &[String] {
        &self.targets[self.completed.min(self.targets.len())..]
    }

    pub(crate) fn summary(&self) -> String {
        if self.cancelled {
            format!(
                "Cancelled after {} of {} package{}; {} failed.",
                self.completed,
                self.targets.len(),
                if self.targets.len() == 1 { "" } else { "s" },
                self.failed.len()
            )
        } else if self.failed.is_empty() {
            format!(
                "All {} selected package{} {}.",
                self.targets.len(),
                if self.targets.len() == 1 { "" } else { "s" },
                self.operation.past_tense()
            )
        } else {
            format!(
                "Failed to {} {} package{}:\n{}",
                self.operation.label(),
                self.failed.len(),
                if self.failed.len() == 1 { "" } else { "s" },
                self.failed.iter().cloned().collect::<Vec<_>>().join("\n")
            )
        }
    }
}

pub(crate) fn item_failed(operation: PackageOperation, result: &CommandResult) -> bool {
    !result.success()
        || (operation == PackageOperation::Uninstall
            && result.stdout.contains(UNINSTALL_FAILURE_MARKER))
}

/// Applies `run.operation` to each target in order until done or cancelled.
///
/// `emit` sees `(index / total, package)` before each item and exactly one
/// `(1.0, "done")` at the end, whichever way the run ends.
pub(crate) fn run_batch<F>(
    tool: &DeviceTool,
    device: &str,
    run: &mut OperationRun,
    cancel: &CancelToken,
    mut emit: F,
) where
    F: FnMut(f32, &str),
{
    let total = run.targets.len();
    let targets = run.targets.clone();

    for (index, package) in targets.iter().enumerate() {
        if cancel.is_cancelled() {
            run.cancelled = true;
            info!(
                device,
                operation = run.operation.label(),
                completed = run.completed,
                total,
                "batch cancelled"
            );
            break;
        }

        emit(index as f32 / total as f32, package);

        let item = match run_package_operation(tool, device, run.operation, package) {
            Ok(result) if item_failed(run.operation, &result) => ItemResult {
                package: package.clone(),
                success: false,
                message: summarize_output_line(&result.stderr)
                    .or_else(|| summarize_output_line(&result.stdout))
                    .or_else(|| result.code.map(|code| format!("Exit code: {}", code))),
            },
            Ok(_) => ItemResult {
                package: package.clone(),
                success: true,
                message: None,
            },
            Err(err) => ItemResult {
                package: package.clone(),
                success: false,
                message: Some(err.to_string()),
            },
        };

        if !item.success {
            warn!(
                device,
                package = %package,
                operation = run.operation.label(),
                reason = item.message.as_deref().unwrap_or(""),
                "package operation failed"
            );
            run.failed.insert(package.clone());
        }
        run.items.push(item);
        run.completed += 1;
    }

    emit(1.0, DONE_LABEL);
}

pub(crate) struct BatchHandle {
    cancel: CancelToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl BatchHandle {
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub(crate) fn spawn_batch(
    tool: DeviceTool,
    device: String,
    operation: PackageOperation,
    targets: Vec<String>,
    sender: mpsc::Sender<AppMessage>,
) -> BatchHandle {
    let cancel = CancelToken::default();
    let token = cancel.clone();

    let thread = thread::spawn(move || {
        info!(
            device = %device,
            operation = operation.label(),
            total = targets.len(),
            "batch started"
        );
        let mut run = OperationRun::new(operation, targets);
        let progress_sender = sender.clone();
        run_batch(&tool, &device, &mut run, &token, |fraction, label| {
            let _ = progress_sender.send(AppMessage::Operation {
                event: TaskEvent::Progress {
                    fraction,
                    label: label.to_string(),
                },
            });
        });

        let outcome = BatchOutcome {
            device,
            operation: run.operation,
            targets: run.targets,
            completed: run.completed,
            failed: run.failed,
            cancelled: run.cancelled,
            items: run.items,
        };
        let _ = sender.send(AppMessage::Operation {
            event: TaskEvent::Complete(outcome),
        });
    });

    BatchHandle {
        cancel,
        thread: Some(thread),
    }
}
