use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::types::Inventory;

/// Side effect fired when a user package is individually selected.
pub(crate) trait Activator {
    fn activate(&self, package: &str);
}

/// Which packages the operator has ticked, keyed by name.
#[derive(Default)]
pub(crate) struct SelectionState {
    // name -> is_system for every package in the current inventory
    known: HashMap<String, bool>,
    selected: BTreeSet<String>,
    activator: Option<Arc<dyn Activator>>,
}

impl fmt::Debug for SelectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionState")
            .field("known", &self.known.len())
            .field("selected", &self.selected)
            .finish()
    }
}

impl SelectionState {
    pub(crate) fn set_activator(&mut self, activator: Option<Arc<dyn Activator>>) {
        self.activator = activator;
    }

    /// Starts over from a fresh inventory with nothing selected.
    pub(crate) fn reseed(&mut self, inventory: &Inventory) {
        self.known = inventory
            .records()
            .iter()
            .map(|record| (record.name.clone(), record.is_system))
            .collect();
        self.selected.clear();
    }

    pub(crate) fn clear(&mut self) {
        self.known.clear();
        self.selected.clear();
    }

    /// Sets one name's membership. Returns whether anything changed.
    pub(crate) fn toggle(&mut self, name: &str, value: bool) -> bool {
        let Some(is_system) = self.known.get(name).copied() else {
            debug!(package = name, "ignoring toggle for unknown package");
            return false;
        };

        let changed = if value {
            self.selected.insert(name.to_string())
        } else {
            self.selected.remove(name)
        };

        if changed && value && !is_system {
            if let Some(activator) = &self.activator {
                activator.activate(name);
            }
        }

        changed
    }

    /// Sets membership for every known name in `names` in one step, without
    /// activation side effects. Returns how many names changed.
    pub(crate) fn batch_set<'a, I>(&mut self, names: I, value: bool) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let pending: BTreeSet<&str> = names
            .into_iter()
            .filter(|name| self.known.contains_key(*name))
            .filter(|name| self.selected.contains(*name) != value)
            .collect();

        for name in &pending {
            if value {
                self.selected.insert((*name).to_string());
            } else {
                self.selected.remove(*name);
            }
        }

        pending.len()
    }

    pub(crate) fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.selected.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected names in ascending order.
    pub(crate) fn selected_names(&self) -> Vec<String> {
        self.selected.iter().cloned().collect()
    }

    pub(crate) fn selected_set(&self) -> BTreeSet<String> {
        self.selected.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::types::PackageRecord;

    #[derive(Default)]
    struct RecordingActivator {
        activated: Mutex<Vec<String>>,
    }

    impl Activator for RecordingActivator {
        fn activate(&self, package: &str) {
            self.activated.lock().unwrap().push(package.to_string());
        }
    }

    fn inventory() -> Inventory {
        Inventory::from_records(vec![
            PackageRecord::new("com.android.settings", true),
            PackageRecord::new("com.example.mail", false),
            PackageRecord::new("com.example.maps", false),
            PackageRecord::new("org.fdroid", false),
        ])
    }

    fn selection_with(activator: &Arc<RecordingActivator>) -> SelectionState {
        let mut selection = SelectionState::default();
        selection.reseed(&inventory());
        selection.set_activator(Some(activator.clone() as Arc<dyn Activator>));
        selection
    }

    #[test]
    fn toggle_activates_user_packages_only_on_select() {
        let activator = Arc::new(RecordingActivator::default());
        let mut selection = selection_with(&activator);

        assert!(selection.toggle("com.example.mail", true));
        assert!(!selection.toggle("com.example.mail", true));
        assert!(selection.toggle("com.android.settings", true));
        assert!(selection.toggle("com.example.mail", false));

        assert_eq!(
            *activator.activated.lock().unwrap(),
            vec!["com.example.mail".to_string()]
        );
        assert_eq!(selection.selected_names(), vec!["com.android.settings".to_string()]);
    }

    #[test]
    fn toggle_of_unknown_name_is_noop() {
        let activator = Arc::new(RecordingActivator::default());
        let mut selection = selection_with(&activator);

        assert!(!selection.toggle("gone.after.reload", true));
        assert!(selection.is_empty());
        assert!(activator.activated.lock().unwrap().is_empty());
    }

    #[test]
    fn batch_set_intersects_with_known_names_without_side_effects() {
        let activator = Arc::new(RecordingActivator::default());
        let mut selection = selection_with(&activator);
        selection.toggle("org.fdroid", true);
        selection.toggle("org.fdroid", false);
        activator.activated.lock().unwrap().clear();

        let changed = selection.batch_set(
            ["com.example.maps", "x.missing", "com.example.mail", "com.example.maps"],
            true,
        );

        assert_eq!(changed, 2);
        assert_eq!(
            selection.selected_names(),
            vec!["com.example.mail".to_string(), "com.example.maps".to_string()]
        );
        assert!(activator.activated.lock().unwrap().is_empty());
    }

    #[test]
    fn batch_clear_only_counts_changes() {
        let mut selection = SelectionState::default();
        selection.reseed(&inventory());
        selection.batch_set(["org.fdroid", "com.example.mail"], true);

        let changed = selection.batch_set(["org.fdroid", "com.example.maps"], false);

        assert_eq!(changed, 1);
        assert_eq!(selection.selected_names(), vec!["com.example.mail".to_string()]);
    }

    #[test]
    fn reseed_drops_names_missing_from_new_inventory() {
        let mut selection = SelectionState::default();
        selection.reseed(&inventory());
        selection.batch_set(["org.fdroid"], true);

        let shrunk = Inventory::from_records(vec![PackageRecord::new("com.example.mail", false)]);
        selection.reseed(&shrunk);

        assert!(selection.is_empty());
        assert!(!selection.toggle("org.fdroid", true));
        assert!(selection.toggle("com.example.mail", true));
    }

    #[test]
    fn selected_names_are_sorted() {
        let mut selection = SelectionState::default();
        selection.reseed(&inventory());
        selection.toggle("org.fdroid", true);
        selection.toggle("com.android.settings", true);
        selection.toggle("com.example.maps", true);

        assert_eq!(
            selection.selected_names(),
            vec![
                "com.android.settings".to_string(),
                "com.example.maps".to_string(),
                "org.fdroid".to_string()
            ]
        );
    }
}
