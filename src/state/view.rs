use std::collections::BTreeSet;

use tracing::debug;

use crate::state::types::AppState;

/// What a display surface reports about its viewport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ViewState {
    pub(crate) scroll_offset: usize,
    pub(crate) focused_row: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RestoreScope {
    Full,
    ScrollOnly,
}

/// View state remembered by name so it survives a reload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ViewStateSnapshot {
    pub(crate) scroll_offset: usize,
    pub(crate) selected_names: BTreeSet<String>,
    pub(crate) focused_name: Option<String>,
    pub(crate) scope: RestoreScope,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct RestoreReport {
    pub(crate) reselected: usize,
    pub(crate) dropped: usize,
    pub(crate) focus_restored: bool,
}

impl ViewStateSnapshot {
    pub(crate) fn capture(state: &AppState, scope: RestoreScope) -> Self {
        let focused_name = state
            .view
            .focused_row
            .and_then(|row| state.display_name_at(row))
            .map(str::to_string);

        Self {
            scroll_offset: state.view.scroll_offset,
            selected_names: state.selection.selected_set(),
            focused_name,
            scope,
        }
    }

    /// Re-applies the snapshot to a freshly loaded state. Names that no
    /// longer exist are dropped silently.
    pub(crate) fn restore(self, state: &mut AppState) -> RestoreReport {
        state.view.scroll_offset = self.scroll_offset;

        if self.scope == RestoreScope::ScrollOnly {
            debug!(scroll = self.scroll_offset, "restored scroll offset only");
            return RestoreReport::default();
        }

        let surviving: Vec<&str> = self
            .selected_names
            .iter()
            .map(String::as_str)
            .filter(|name| state.inventory.contains(name))
            .collect();
        state.selection.batch_set(surviving.iter().copied(), true);

        let focus = self
            .focused_name
            .as_deref()
            .and_then(|name| state.display_position_of(name));
        state.view.focused_row = focus;

        let report = RestoreReport {
            reselected: surviving.len(),
            dropped: self.selected_names.len() - surviving.len(),
            focus_restored: focus.is_some(),
        };
        debug!(
            reselected = report.reselected,
            dropped = report.dropped,
            focus_restored = report.focus_restored,
            scroll = self.scroll_offset,
            "restored view state"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Inventory, PackageFilter, PackageRecord};

    fn state_with(names: &[(&str, bool)]) -> AppState {
        let mut state = AppState::default();
        load(&mut state, names);
        state
    }

    fn load(state: &mut AppState, names: &[(&str, bool)]) {
        state.inventory = Inventory::from_records(
            names
                .iter()
                .map(|(name, system)| PackageRecord::new(*name, *system))
                .collect(),
        );
        state.selection.reseed(&state.inventory);
        state.rebuild_displayed();
        state.view.focused_row = None;
    }

    const PACKAGES: [(&str, bool); 4] = [
        ("a.app", false),
        ("b.app", false),
        ("c.sys", true),
        ("d.app", false),
    ];

    #[test]
    fn capture_then_restore_reproduces_selection_and_focus() {
        let mut state = state_with(&PACKAGES);
        state.selection.batch_set(["b.app", "c.sys"], true);
        state.view = ViewState {
            scroll_offset: 12,
            focused_row: Some(3),
        };

        let snapshot = ViewStateSnapshot::capture(&state, RestoreScope::Full);
        assert_eq!(snapshot.focused_name.as_deref(), Some("d.app"));

        load(&mut state, &PACKAGES);
        state.view.scroll_offset = 0;
        let report = snapshot.restore(&mut state);

        assert_eq!(
            state.selection.selected_names(),
            vec!["b.app".to_string(), "c.sys".to_string()]
        );
        assert_eq!(state.view.focused_row, Some(3));
        assert_eq!(state.view.scroll_offset, 12);
        assert_eq!(report.dropped, 0);
    }

    #[test]
    fn removed_names_are_dropped_on_restore() {
        let mut state = state_with(&PACKAGES);
        state.selection.batch_set(["a.app", "d.app"], true);
        state.view.focused_row = Some(0);
        let snapshot = ViewStateSnapshot::capture(&state, RestoreScope::Full);

        load(&mut state, &[("b.app", false), ("c.sys", true), ("d.app", false)]);
        let report = snapshot.restore(&mut state);

        assert_eq!(state.selection.selected_names(), vec!["d.app".to_string()]);
        assert_eq!(state.view.focused_row, None);
        assert_eq!(
            report,
            RestoreReport {
                reselected: 1,
                dropped: 1,
                focus_restored: false,
            }
        );
    }

    #[test]
    fn focus_follows_name_to_new_display_row() {
        let mut state = state_with(&PACKAGES);
        state.view.focused_row = Some(3);
        let snapshot = ViewStateSnapshot::capture(&state, RestoreScope::Full);

        load(&mut state, &PACKAGES);
        state.filter = PackageFilter::User;
        state.rebuild_displayed();
        snapshot.restore(&mut state);

        assert_eq!(state.view.focused_row, Some(2));
    }

    #[test]
    fn scroll_only_scope_leaves_selection_empty() {
        let mut state = state_with(&PACKAGES);
        state.selection.batch_set(["b.app"], true);
        state.view = ViewState {
            scroll_offset: 40,
            focused_row: Some(1),
        };
        let snapshot = ViewStateSnapshot::capture(&state, RestoreScope::ScrollOnly);

        load(&mut state, &PACKAGES);
        snapshot.restore(&mut state);

        assert!(state.selection.is_empty());
        assert_eq!(state.view.focused_row, None);
        assert_eq!(state.view.scroll_offset, 40);
    }

    #[test]
    fn scroll_is_restored_by_value_even_if_list_shrank() {
        let mut state = state_with(&PACKAGES);
        state.view.scroll_offset = 500;
        let snapshot = ViewStateSnapshot::capture(&state, RestoreScope::Full);

        load(&mut state, &[("a.app", false)]);
        snapshot.restore(&mut state);

        assert_eq!(state.view.scroll_offset, 500);
    }
}
