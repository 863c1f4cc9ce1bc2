use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub is_system: bool,
    pub selected: bool,
}

impl PackageRecord {
    pub(crate) fn new(name: impl Into<String>, is_system: bool) -> Self {
        Self {
            name: name.into(),
            is_system,
            selected: false,
        }
    }
}

/// Whether `name` is a well-formed Android package name.
pub(crate) fn is_valid_package_name(name: &str) -> bool {
    static PACKAGE_NAME: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$").expect("valid regex")
    });
    PACKAGE_NAME.is_match(name)
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub(crate) fn success(&self) -> bool {
        self.code.unwrap_or(-1) == 0
    }
}

/// Sorted package snapshot with a name index kept in lockstep.
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    records: Vec<PackageRecord>,
    index: HashMap<String, usize>,
}

impl Inventory {
    /// Builds the snapshot from unordered records. Later duplicates lose to the
    /// first record seen, except that a system flag on either copy wins.
    pub(crate) fn from_records(records: Vec<PackageRecord>) -> Self {
        let mut records = records;
        records.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        records.dedup_by(|later, kept| {
            if later.name == kept.name {
                kept.is_system |= later.is_system;
                true
            } else {
                false
            }
        });
        for record in &mut records {
            record.selected = false;
        }

        let index = records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.name.clone(), pos))
            .collect();

        Self { records, index }
    }

    pub(crate) fn records(&self) -> &[PackageRecord] {
        &self.records
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.index.get(name).and_then(|pos| self.records.get(*pos))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[cfg(test)]
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.name.as_str())
    }

    pub(crate) fn system_count(&self) -> usize {
        self.records.iter().filter(|record| record.is_system).count()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.index.len() != self.records.len() {
            return Err(Error::InvariantViolation(format!(
                "index holds {} names for {} records",
                self.index.len(),
                self.records.len()
            )));
        }

        for (pos, pair) in self.records.windows(2).enumerate() {
            if pair[0].name.as_bytes() >= pair[1].name.as_bytes() {
                return Err(Error::InvariantViolation(format!(
                    "records out of order at {}: {} >= {}",
                    pos, pair[0].name, pair[1].name
                )));
            }
        }

        for (pos, record) in self.records.iter().enumerate() {
            if self.index.get(&record.name) != Some(&pos) {
                return Err(Error::InvariantViolation(format!(
                    "index entry for {} does not point at position {}",
                    record.name, pos
                )));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageFilter {
    #[default]
    All,
    User,
    System,
}

impl PackageFilter {
    pub(crate) fn matches(self, record: &PackageRecord) -> bool {
        match self {
            PackageFilter::All => true,
            PackageFilter::User => !record.is_system,
            PackageFilter::System => record.is_system,
        }
    }

    pub(crate) fn from_key(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Some(PackageFilter::All),
            "user" => Some(PackageFilter::User),
            "system" => Some(PackageFilter::System),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PackageOperation {
    Uninstall,
    Enable,
    Disable,
    Reset,
}

impl PackageOperation {
    pub(crate) fn label(self) -> &'static str {
        match self {
            PackageOperation::Uninstall => "uninstall",
            PackageOperation::Enable => "enable",
            PackageOperation::Disable => "disable",
            PackageOperation::Reset => "reset",
        }
    }

    pub(crate) fn past_tense(self) -> &'static str {
        match self {
            PackageOperation::Uninstall => "uninstalled",
            PackageOperation::Enable => "enabled",
            PackageOperation::Disable => "disabled",
            PackageOperation::Reset => "reset to default state",
        }
    }

    pub(crate) fn from_key(value: &str) -> Option<Self> {
        match value {
            "uninstall" => Some(PackageOperation::Uninstall),
            "enable" => Some(PackageOperation::Enable),
            "disable" => Some(PackageOperation::Disable),
            "reset" => Some(PackageOperation::Reset),
            _ => None,
        }
    }
}
