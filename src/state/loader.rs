use std::collections::BTreeSet;
use std::sync::mpsc;
use std::thread;

use tracing::{info, warn};

use crate::adb::{DeviceTool, run_list_packages, run_list_system_packages};
use crate::error::Result;
use crate::state::types::{AppMessage, TaskEvent};
use crate::types::{Inventory, PackageRecord};

pub(crate) const LOAD_MILESTONES: [u8; 4] = [30, 60, 80, 100];

/// Fetches and merges the package lists for one device.
///
/// `progress` receives percentages in non-decreasing order; 100 is only
/// reported when the returned inventory is complete.
pub(crate) fn load_inventory<F>(tool: &DeviceTool, device: &str, mut progress: F) -> Result<Inventory>
where
    F: FnMut(u8),
{
    progress(LOAD_MILESTONES[0]);
    let names = run_list_packages(tool, device)?;

    progress(LOAD_MILESTONES[1]);
    let system = match run_list_system_packages(tool, device) {
        Ok(system) => system,
        Err(err) => {
            warn!(device, error = %err, "system package list unavailable; treating all packages as user packages");
            BTreeSet::new()
        }
    };

    progress(LOAD_MILESTONES[2]);
    let records = names
        .into_iter()
        .map(|name| {
            let is_system = system.contains(&name);
            PackageRecord::new(name, is_system)
        })
        .collect();
    let inventory = Inventory::from_records(records);
    inventory.validate()?;

    info!(
        device,
        total = inventory.len(),
        system = inventory.system_count(),
        "inventory loaded"
    );
    progress(LOAD_MILESTONES[3]);
    Ok(inventory)
}

/// Result of one background load, tagged so stale loads can be ignored.
#[derive(Debug)]
pub(crate) struct LoadedInventory {
    pub(crate) device: String,
    pub(crate) generation: u64,
    pub(crate) inventory: Inventory,
}

pub(crate) fn spawn_inventory_load(
    tool: DeviceTool,
    device: String,
    generation: u64,
    sender: mpsc::Sender<AppMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let progress_sender = sender.clone();
        let result = load_inventory(&tool, &device, |percent| {
            let _ = progress_sender.send(AppMessage::Inventory {
                generation,
                event: TaskEvent::Progress {
                    fraction: f32::from(percent) / 100.0,
                    label: format!("Loading packages ({}%)", percent),
                },
            });
        });

        let event = match result {
            Ok(inventory) => TaskEvent::Complete(LoadedInventory {
                device,
                generation,
                inventory,
            }),
            Err(err) => TaskEvent::Error {
                kind: err.kind(),
                message: err.to_string(),
            },
        };
        let _ = sender.send(AppMessage::Inventory { generation, event });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::test_support::{ScriptedExecutor, package_listing};

    const LIST: &str = "adb -s dev shell pm list packages";
    const LIST_SYSTEM: &str = "adb -s dev shell pm list packages -s";

    #[test]
    fn merges_system_flags_and_sorts() {
        let executor = ScriptedExecutor::new()
            .ok(LIST, &package_listing(&["b.app", "a.app", "c.sys"]))
            .ok(LIST_SYSTEM, &package_listing(&["c.sys"]));
        let mut milestones = Vec::new();

        let inventory = load_inventory(&executor.tool(), "dev", |p| milestones.push(p)).unwrap();

        let names: Vec<&str> = inventory.names().collect();
        assert_eq!(names, vec!["a.app", "b.app", "c.sys"]);
        assert!(inventory.get("c.sys").unwrap().is_system);
        assert!(!inventory.get("a.app").unwrap().is_system);
        assert_eq!(milestones, vec![30, 60, 80, 100]);
    }

    #[test]
    fn duplicate_lines_collapse_to_one_record() {
        let executor = ScriptedExecutor::new()
            .ok(LIST, &package_listing(&["x", "y", "x", "y", "z"]))
            .ok(LIST_SYSTEM, &package_listing(&["y", "y"]));

        let inventory = load_inventory(&executor.tool(), "dev", |_| {}).unwrap();

        let names: Vec<&str> = inventory.names().collect();
        assert_eq!(names, vec!["x", "y", "z"]);
        assert!(inventory.get("y").unwrap().is_system);
    }

    #[test]
    fn system_list_failure_degrades_to_user_packages() {
        let executor = ScriptedExecutor::new()
            .ok(LIST, &package_listing(&["android", "com.example"]))
            .fail(LIST_SYSTEM, 255, "error: closed");

        let inventory = load_inventory(&executor.tool(), "dev", |_| {}).unwrap();

        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.system_count(), 0);
    }

    #[test]
    fn system_list_timeout_is_not_fatal() {
        let executor = ScriptedExecutor::new()
            .ok(LIST, &package_listing(&["android"]))
            .timeout(LIST_SYSTEM);

        let inventory = load_inventory(&executor.tool(), "dev", |_| {}).unwrap();
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn list_failure_aborts_without_final_milestone() {
        let executor = ScriptedExecutor::new().fail(LIST, 1, "error: device unauthorized");
        let mut milestones = Vec::new();

        let err = load_inventory(&executor.tool(), "dev", |p| milestones.push(p)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CommandFailure);
        assert!(err.to_string().contains("device unauthorized"));
        assert!(!milestones.contains(&100));
        assert!(executor.calls_matching("-s").len() == 1);
    }

    #[test]
    fn list_timeout_reports_timeout() {
        let executor = ScriptedExecutor::new().timeout(LIST);
        let err = load_inventory(&executor.tool(), "dev", |_| {}).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn background_load_delivers_ordered_events() {
        let executor = ScriptedExecutor::new()
            .ok(LIST, &package_listing(&["b", "a"]))
            .ok(LIST_SYSTEM, "");
        let (tx, rx) = mpsc::channel();

        spawn_inventory_load(executor.tool(), "dev".to_string(), 7, tx)
            .join()
            .unwrap();

        let mut fractions = Vec::new();
        let mut loaded = None;
        for message in rx.try_iter() {
            match message {
                AppMessage::Inventory { generation, event } => {
                    assert_eq!(generation, 7);
                    match event {
                        TaskEvent::Progress { fraction, .. } => fractions.push(fraction),
                        TaskEvent::Complete(result) => loaded = Some(result),
                        TaskEvent::Error { message, .. } => panic!("unexpected error: {message}"),
                    }
                }
                _ => panic!("unexpected message"),
            }
        }

        assert_eq!(fractions, vec![0.3, 0.6, 0.8, 1.0]);
        let loaded = loaded.expect("load should complete");
        assert_eq!(loaded.device, "dev");
        assert_eq!(loaded.inventory.len(), 2);
    }
}
