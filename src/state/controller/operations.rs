use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::settings::DEFAULT_MAX_OPERATION_HISTORY;
use crate::state::batch::{BatchOutcome, spawn_batch};
use crate::state::controller::AppController;
use crate::state::types::{OperationRecord, OperationStatus, TaskEvent, TaskProgress};
use crate::state::view::{RestoreScope, ViewStateSnapshot};
use crate::types::PackageOperation;

impl AppController {
    /// Runs `operation` over the current selection in ascending name order.
    pub(crate) fn start_operation(&self, operation: PackageOperation) -> Result<usize> {
        let (device, targets) = {
            let mut state = self.state.borrow_mut();
            let Some(device) = state.device.clone() else {
                return Err(Error::NoDevice);
            };
            if state.operation_in_progress() {
                return Err(Error::Busy("package operation"));
            }
            if state.load_in_progress {
                return Err(Error::Busy("package load"));
            }
            if state.selection.is_empty() {
                return Err(Error::NothingSelected);
            }

            // uninstalled names cannot be reselected after the reload
            let scope = if operation == PackageOperation::Uninstall {
                RestoreScope::ScrollOnly
            } else {
                RestoreScope::Full
            };
            state.pending_snapshot = Some(ViewStateSnapshot::capture(&state, scope));
            state.operation_started_at = Some(Utc::now());
            state.operation_progress = Some(TaskProgress {
                fraction: 0.0,
                label: format!("Starting {}", operation.label()),
            });
            state.last_outcome = None;
            (device, state.selection.selected_names())
        };

        let total = targets.len();
        let handle = spawn_batch(
            self.tool.clone(),
            device,
            operation,
            targets,
            self.sender.clone(),
        );
        self.state.borrow_mut().operation = Some(handle);
        Ok(total)
    }

    /// Asks the running batch to stop before its next package.
    pub(crate) fn cancel_operation(&self) -> bool {
        let state = self.state.borrow();
        match &state.operation {
            Some(handle) => {
                if !handle.is_cancel_requested() {
                    info!("cancellation requested");
                }
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn handle_operation_event(&self, event: TaskEvent<BatchOutcome>) {
        match event {
            TaskEvent::Progress { fraction, label } => {
                self.state.borrow_mut().operation_progress = Some(TaskProgress { fraction, label });
            }
            TaskEvent::Complete(outcome) => self.finish_operation(outcome),
            TaskEvent::Error { kind, message } => {
                warn!(%kind, error = %message, "package operation aborted");
                let handle = {
                    let mut state = self.state.borrow_mut();
                    state.operation_progress = None;
                    state.pending_snapshot = None;
                    state.status_message = Some(message);
                    state.operation.take()
                };
                if let Some(handle) = handle {
                    handle.join();
                }
            }
        }
    }

    fn finish_operation(&self, outcome: BatchOutcome) {
        let handle = {
            let mut state = self.state.borrow_mut();
            state.operation_progress = None;
            state.operation.take()
        };
        if let Some(handle) = handle {
            handle.join();
        }

        info!(
            device = %outcome.device,
            operation = outcome.operation.label(),
            completed = outcome.completed,
            failed = outcome.failed.len(),
            cancelled = outcome.cancelled,
            "batch finished"
        );
        self.record_operation_history(&outcome);

        {
            let mut state = self.state.borrow_mut();
            state.status_message = Some(outcome.summary());
            state.last_outcome = Some(outcome);
        }

        // package state may have changed even when every item failed
        if let Err(err) = self.request_load() {
            warn!(error = %err, "could not reload inventory after operation");
            self.state.borrow_mut().pending_snapshot = None;
        }
    }

    fn record_operation_history(&self, outcome: &BatchOutcome) {
        let mut state = self.state.borrow_mut();
        let started_at = state.operation_started_at.take().unwrap_or_else(Utc::now);
        let completed_at = Utc::now();

        for item in &outcome.items {
            state.operation_history.push(OperationRecord {
                package_name: item.package.clone(),
                operation: outcome.operation,
                status: if item.success {
                    OperationStatus::Success
                } else {
                    OperationStatus::Failed
                },
                started_at,
                completed_at: Some(completed_at),
                error_message: item.message.clone(),
            });
        }
        for package in outcome.unattempted() {
            state.operation_history.push(OperationRecord {
                package_name: package.clone(),
                operation: outcome.operation,
                status: OperationStatus::Cancelled,
                started_at,
                completed_at: None,
                error_message: None,
            });
        }

        // Keep only the most recent N operations
        let max = if state.max_operation_history == 0 {
            DEFAULT_MAX_OPERATION_HISTORY
        } else {
            state.max_operation_history
        };
        if state.operation_history.len() > max {
            let current_len = state.operation_history.len();
            state.operation_history.drain(0..current_len - max);
        }
    }

    /// All recorded operations, most recent first.
    pub(crate) fn operation_history(&self) -> Vec<OperationRecord> {
        let state = self.state.borrow();
        let mut records = state.operation_history.clone();
        records.reverse();
        records
    }

    pub(crate) fn last_outcome(&self) -> Option<BatchOutcome> {
        self.state.borrow().last_outcome.clone()
    }
}
