use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::details::PackageDetail;
use crate::error::ErrorKind;
use crate::settings::DEFAULT_MAX_OPERATION_HISTORY;
use crate::state::batch::{BatchHandle, BatchOutcome};
use crate::state::loader::LoadedInventory;
use crate::state::search::SearchEngine;
use crate::state::selection::SelectionState;
use crate::state::view::{ViewState, ViewStateSnapshot};
use crate::types::{CommandResult, Inventory, PackageFilter, PackageOperation};

/// Events a background task reports, in emission order.
#[derive(Debug)]
pub(crate) enum TaskEvent<T> {
    Progress { fraction: f32, label: String },
    Complete(T),
    Error { kind: ErrorKind, message: String },
}

pub(crate) enum AppMessage {
    Inventory {
        generation: u64,
        event: TaskEvent<LoadedInventory>,
    },
    Operation {
        event: TaskEvent<BatchOutcome>,
    },
    DetailLoaded {
        package: String,
        result: Result<PackageDetail, String>,
    },
    ActivationFinished {
        package: String,
        result: Result<CommandResult, String>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum OperationStatus {
    Success,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub(crate) fn label(self) -> &'static str {
        match self {
            OperationStatus::Success => "Success",
            OperationStatus::Failed => "Failed",
            OperationStatus::Cancelled => "Cancelled",
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct OperationRecord {
    pub(crate) package_name: String,
    pub(crate) operation: PackageOperation,
    pub(crate) status: OperationStatus,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) error_message: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct TaskProgress {
    pub(crate) fraction: f32,
    pub(crate) label: String,
}

pub(crate) struct AppState {
    pub(crate) device: Option<String>,
    pub(crate) inventory: Inventory,
    pub(crate) inventory_last_refresh: Option<DateTime<Utc>>,
    pub(crate) filter: PackageFilter,
    /// Display position -> inventory position.
    pub(crate) displayed: Vec<usize>,
    pub(crate) selection: SelectionState,
    pub(crate) search: SearchEngine,
    pub(crate) view: ViewState,
    pub(crate) load_generation: u64,
    pub(crate) load_in_progress: bool,
    pub(crate) load_progress: Option<TaskProgress>,
    pub(crate) last_load_error: Option<String>,
    pub(crate) operation: Option<BatchHandle>,
    pub(crate) operation_progress: Option<TaskProgress>,
    pub(crate) operation_started_at: Option<DateTime<Utc>>,
    pub(crate) last_outcome: Option<BatchOutcome>,
    pub(crate) pending_snapshot: Option<ViewStateSnapshot>,
    pub(crate) operation_history: Vec<OperationRecord>,
    pub(crate) max_operation_history: usize,
    pub(crate) detail_cache: HashMap<String, PackageDetail>,
    pub(crate) detail_loading: HashSet<String>,
    pub(crate) detail_errors: HashMap<String, String>,
    pub(crate) status_message: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            device: None,
            inventory: Inventory::default(),
            inventory_last_refresh: None,
            filter: PackageFilter::default(),
            displayed: Vec::new(),
            selection: SelectionState::default(),
            search: SearchEngine::default(),
            view: ViewState::default(),
            load_generation: 0,
            load_in_progress: false,
            load_progress: None,
            last_load_error: None,
            operation: None,
            operation_progress: None,
            operation_started_at: None,
            last_outcome: None,
            pending_snapshot: None,
            operation_history: Vec::new(),
            max_operation_history: DEFAULT_MAX_OPERATION_HISTORY,
            detail_cache: HashMap::new(),
            detail_loading: HashSet::new(),
            detail_errors: HashMap::new(),
            status_message: None,
        }
    }
}

impl AppState {
    pub(crate) fn operation_in_progress(&self) -> bool {
        self.operation.is_some()
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.load_in_progress || self.operation_in_progress()
    }

    pub(crate) fn display_name_at(&self, row: usize) -> Option<&str> {
        self.displayed
            .get(row)
            .and_then(|pos| self.inventory.records().get(*pos))
            .map(|record| record.name.as_str())
    }

    pub(crate) fn display_position_of(&self, name: &str) -> Option<usize> {
        let target = self.inventory.position(name)?;
        // displayed is a filtered subsequence of the sorted inventory
        self.displayed.binary_search(&target).ok()
    }

    pub(crate) fn rebuild_displayed(&mut self) {
        let filter = self.filter;
        self.displayed = self
            .inventory
            .records()
            .iter()
            .enumerate()
            .filter(|(_, record)| filter.matches(record))
            .map(|(pos, _)| pos)
            .collect();
    }

    /// Recomputes the search matches against the current display order.
    pub(crate) fn refresh_search(&mut self) {
        let names = display_names(&self.inventory, &self.displayed);
        self.search.refresh(&names);
    }
}

pub(crate) fn display_names<'a>(inventory: &'a Inventory, displayed: &[usize]) -> Vec<&'a str> {
    let records = inventory.records();
    displayed
        .iter()
        .filter_map(|pos| records.get(*pos))
        .map(|record| record.name.as_str())
        .collect()
}
