use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::state::controller::AppController;
use crate::state::loader::{LoadedInventory, spawn_inventory_load};
use crate::state::types::{TaskEvent, TaskProgress, display_names};
use crate::types::PackageFilter;

impl AppController {
    /// Starts a background load for the current device.
    pub(crate) fn request_load(&self) -> Result<u64> {
        let (device, generation) = {
            let mut state = self.state.borrow_mut();
            let Some(device) = state.device.clone() else {
                return Err(Error::NoDevice);
            };
            if state.load_in_progress {
                return Err(Error::Busy("package load"));
            }
            if state.operation_in_progress() {
                return Err(Error::Busy("package operation"));
            }
            state.load_generation += 1;
            state.load_in_progress = true;
            state.load_progress = Some(TaskProgress {
                fraction: 0.0,
                label: "Loading packages".to_string(),
            });
            state.last_load_error = None;
            (device, state.load_generation)
        };

        info!(device = %device, generation, "loading package inventory");
        spawn_inventory_load(self.tool.clone(), device, generation, self.sender.clone());
        Ok(generation)
    }

    pub(crate) fn handle_inventory_event(&self, generation: u64, event: TaskEvent<LoadedInventory>) {
        if generation != self.state.borrow().load_generation {
            debug!(generation, "discarding stale inventory event");
            return;
        }

        match event {
            TaskEvent::Progress { fraction, label } => {
                self.state.borrow_mut().load_progress = Some(TaskProgress { fraction, label });
            }
            TaskEvent::Complete(loaded) => self.finish_load(loaded),
            TaskEvent::Error { kind, message } => {
                warn!(generation, %kind, error = %message, "package inventory load failed");
                let mut state = self.state.borrow_mut();
                state.load_in_progress = false;
                state.load_progress = None;
                if state.pending_snapshot.take().is_some() {
                    debug!("dropping view snapshot after failed reload");
                }
                state.status_message = Some(format!("Failed to load packages: {}", message));
                state.last_load_error = Some(format!("{}: {}", kind, message));
            }
        }
    }

    fn finish_load(&self, loaded: LoadedInventory) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        state.load_in_progress = false;
        state.inventory = loaded.inventory;
        state.inventory_last_refresh = Some(Utc::now());
        state.selection.reseed(&state.inventory);
        state.rebuild_displayed();
        state.view.focused_row = None;
        state.refresh_search();

        if let Some(snapshot) = state.pending_snapshot.take() {
            snapshot.restore(state);
        }

        state.status_message = Some(format!(
            "{} packages ({} system)",
            state.inventory.len(),
            state.inventory.system_count()
        ));
        debug!(
            device = %loaded.device,
            generation = loaded.generation,
            displayed = state.displayed.len(),
            "inventory applied"
        );
    }

    pub(crate) fn set_filter(&self, filter: PackageFilter) {
        let mut state = self.state.borrow_mut();
        if state.filter == filter {
            return;
        }
        state.filter = filter;
        state.rebuild_displayed();
        state.view.focused_row = None;
        state.refresh_search();
    }

    pub(crate) fn toggle(&self, name: &str, value: bool) -> bool {
        self.state.borrow_mut().selection.toggle(name, value)
    }

    /// Sets membership for `names` without activation side effects.
    /// Returns how many of them exist in the current inventory.
    pub(crate) fn batch_select(&self, names: &[&str], value: bool) -> usize {
        let mut state = self.state.borrow_mut();
        let known: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| state.inventory.contains(name))
            .collect();
        state.selection.batch_set(known.iter().copied(), value);
        known.len()
    }

    /// Flips the given display rows together. The new value is the inverse
    /// of the lowest row's current membership.
    pub(crate) fn toggle_rows(&self, rows: &[usize]) -> usize {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let mut rows: Vec<usize> = rows.to_vec();
        rows.sort_unstable();
        rows.dedup();

        let names: Vec<&str> = {
            let display = display_names(&state.inventory, &state.displayed);
            rows.iter().filter_map(|row| display.get(*row).copied()).collect()
        };
        let Some(first) = names.first() else {
            return 0;
        };

        let value = !state.selection.is_selected(first);
        state.selection.batch_set(names.iter().copied(), value)
    }

    /// Names of `rows` plus the focused row, in display order, one per line.
    pub(crate) fn copy_names(&self, rows: &[usize]) -> Option<String> {
        let state = self.state.borrow();
        let mut rows: Vec<usize> = rows.to_vec();
        rows.extend(state.view.focused_row);
        rows.sort_unstable();
        rows.dedup();

        let names: Vec<&str> = rows
            .iter()
            .filter_map(|row| state.display_name_at(*row))
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join("\n"))
        }
    }

    pub(crate) fn focus_row(&self, row: Option<usize>) {
        let mut state = self.state.borrow_mut();
        state.view.focused_row = row.filter(|row| *row < state.displayed.len());
    }

    pub(crate) fn set_scroll_offset(&self, offset: usize) {
        self.state.borrow_mut().view.scroll_offset = offset;
    }

    /// Runs a search and moves focus to the first match after it.
    /// Returns the number of matches.
    pub(crate) fn search(&self, pattern: &str) -> Result<usize> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let names = display_names(&state.inventory, &state.displayed);
        let count = state.search.search(pattern, &names)?.len();
        state.view.focused_row = state.search.next(state.view.focused_row);
        Ok(count)
    }

    pub(crate) fn search_next(&self) -> Option<usize> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.view.focused_row = state.search.next(state.view.focused_row);
        state.view.focused_row
    }

    pub(crate) fn search_previous(&self) -> Option<usize> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.view.focused_row = state.search.previous(state.view.focused_row);
        state.view.focused_row
    }

    pub(crate) fn reset_search(&self) {
        self.state.borrow_mut().search.reset();
    }
}
