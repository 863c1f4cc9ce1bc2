use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::adb::{DeviceTool, check_tool_available, run_list_devices, run_package_operation};
use crate::error::Result;
use crate::settings::AppSettings;
use crate::state::selection::Activator;
use crate::state::types::{AppMessage, AppState};
use crate::types::{CommandResult, PackageOperation, PackageRecord};

/// Owns all mutable state on the interactive thread and applies background
/// task results in the order they were sent.
pub(crate) struct AppController {
    pub(crate) state: RefCell<AppState>,
    pub(crate) sender: mpsc::Sender<AppMessage>,
    receiver: mpsc::Receiver<AppMessage>,
    pub(crate) tool: DeviceTool,
    pub(crate) settings: AppSettings,
    pending_activations: Arc<AtomicUsize>,
}

impl AppController {
    pub(crate) fn new(tool: DeviceTool, settings: AppSettings) -> Self {
        let (sender, receiver) = mpsc::channel();
        let mut state = AppState::default();
        state.filter = settings.default_filter;
        state.max_operation_history = settings.max_operation_history;

        Self {
            state: RefCell::new(state),
            sender,
            receiver,
            tool,
            settings,
            pending_activations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn check_tool(&self) -> Result<String> {
        check_tool_available(&self.tool)
    }

    pub(crate) fn list_devices(&self) -> Result<Vec<String>> {
        run_list_devices(&self.tool)
    }

    /// Switches to `serial` and starts loading its inventory.
    pub(crate) fn select_device(&self, serial: &str) -> Result<u64> {
        {
            let mut state = self.state.borrow_mut();
            if state.device.as_deref() != Some(serial) {
                state.device = Some(serial.to_string());
                state.detail_cache.clear();
                state.detail_errors.clear();
                state.operation_history.clear();
                state.last_outcome = None;
                state.search.reset();
                state.view = Default::default();
                state.selection.clear();
            }
            let activator = ThreadActivator {
                tool: self.tool.clone(),
                device: serial.to_string(),
                sender: self.sender.clone(),
                pending: Arc::clone(&self.pending_activations),
            };
            state.selection.set_activator(Some(Arc::new(activator)));
        }
        info!(device = serial, "device selected");
        self.request_load()
    }

    /// Applies every message already queued. Returns how many were handled.
    pub(crate) fn pump(&self) -> usize {
        let mut handled = 0;
        while let Ok(msg) = self.receiver.try_recv() {
            self.handle_message(msg);
            handled += 1;
        }
        handled
    }

    /// Blocks until no load, batch, detail query or activation is in flight.
    /// Returns `false` if `timeout` elapsed first.
    pub(crate) fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if self.is_idle() {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(msg) => self.handle_message(msg),
                Err(mpsc::RecvTimeoutError::Timeout) => return false,
                Err(mpsc::RecvTimeoutError::Disconnected) => return self.is_idle(),
            }
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        let state = self.state.borrow();
        !state.is_busy()
            && state.detail_loading.is_empty()
            && self.pending_activations.load(Ordering::SeqCst) == 0
    }

    pub(crate) fn handle_message(&self, msg: AppMessage) {
        match msg {
            AppMessage::Inventory { generation, event } => {
                self.handle_inventory_event(generation, event);
            }
            AppMessage::Operation { event } => {
                self.handle_operation_event(event);
            }
            AppMessage::DetailLoaded { package, result } => {
                self.finish_package_detail(package, result);
            }
            AppMessage::ActivationFinished { package, result } => {
                self.finish_activation(package, result);
            }
        }
    }

    fn finish_activation(&self, package: String, result: std::result::Result<CommandResult, String>) {
        self.pending_activations.fetch_sub(1, Ordering::SeqCst);
        match result {
            Ok(command) if command.success() => {
                debug!(package = %package, "package activated");
            }
            Ok(command) => {
                warn!(
                    package = %package,
                    code = ?command.code,
                    stderr = command.stderr.trim(),
                    "activation command failed"
                );
            }
            Err(err) => {
                warn!(package = %package, error = %err, "activation command failed");
            }
        }
    }

    /// Displayed rows with their current selection flag.
    pub(crate) fn visible_rows(&self) -> Vec<PackageRecord> {
        let state = self.state.borrow();
        let records = state.inventory.records();
        state
            .displayed
            .iter()
            .filter_map(|pos| records.get(*pos))
            .map(|record| PackageRecord {
                selected: state.selection.is_selected(&record.name),
                ..record.clone()
            })
            .collect()
    }

    pub(crate) fn status_message(&self) -> Option<String> {
        self.state.borrow().status_message.clone()
    }
}

/// Runs `pm enable` for a freshly selected package on a short-lived thread.
struct ThreadActivator {
    tool: DeviceTool,
    device: String,
    sender: mpsc::Sender<AppMessage>,
    pending: Arc<AtomicUsize>,
}

impl Activator for ThreadActivator {
    fn activate(&self, package: &str) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let tool = self.tool.clone();
        let device = self.device.clone();
        let sender = self.sender.clone();
        let package = package.to_string();
        thread::spawn(move || {
            let result = run_package_operation(&tool, &device, PackageOperation::Enable, &package)
                .map_err(|err| err.to_string());
            let _ = sender.send(AppMessage::ActivationFinished { package, result });
        });
    }
}
