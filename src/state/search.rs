use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::{Error, Result};

/// Case-insensitive regex search over the displayed names.
///
/// Match positions are display positions and stay strictly increasing.
#[derive(Debug, Default)]
pub(crate) struct SearchEngine {
    pattern: Option<Regex>,
    matches: Vec<usize>,
    highlighted: Option<usize>,
}

impl SearchEngine {
    /// Compiles `pattern` and evaluates it against `names`.
    ///
    /// On a bad or blank pattern the previous pattern and matches are kept.
    pub(crate) fn search(&mut self, pattern: &str, names: &[&str]) -> Result<&[usize]> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(Error::Pattern("search pattern is empty".to_string()));
        }

        let regex = RegexBuilder::new(trimmed)
            .case_insensitive(true)
            .build()
            .map_err(|err| Error::Pattern(err.to_string()))?;

        self.matches = collect_matches(&regex, names);
        self.pattern = Some(regex);
        self.highlighted = None;
        debug!(pattern = trimmed, matches = self.matches.len(), "search evaluated");
        Ok(&self.matches)
    }

    /// Re-evaluates the active pattern after the displayed names changed.
    pub(crate) fn refresh(&mut self, names: &[&str]) {
        let Some(regex) = &self.pattern else {
            return;
        };
        self.matches = collect_matches(regex, names);
        if self
            .highlighted
            .is_some_and(|row| self.matches.binary_search(&row).is_err())
        {
            self.highlighted = None;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.pattern = None;
        self.matches.clear();
        self.highlighted = None;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.pattern.is_some()
    }

    pub(crate) fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }

    pub(crate) fn matches(&self) -> &[usize] {
        &self.matches
    }

    pub(crate) fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub(crate) fn is_match(&self, row: usize) -> bool {
        self.matches.binary_search(&row).is_ok()
    }

    /// Next match after `current`; `None` means nothing is focused yet.
    ///
    /// Wraps to the first match only while `current` is below the last
    /// match. At or past the last match the focus stays where it is.
    pub(crate) fn next(&mut self, current: Option<usize>) -> Option<usize> {
        let (Some(&first), Some(&last)) = (self.matches.first(), self.matches.last()) else {
            return current;
        };

        let target = match current {
            None => Some(first),
            Some(row) => match self.matches.iter().copied().find(|&m| m > row) {
                Some(found) => Some(found),
                None if row >= last => None,
                None => Some(first),
            },
        };

        self.land(target, current)
    }

    /// Mirror of [`SearchEngine::next`]. With nothing focused the focus
    /// stays unset.
    pub(crate) fn previous(&mut self, current: Option<usize>) -> Option<usize> {
        let (Some(&first), Some(&last)) = (self.matches.first(), self.matches.last()) else {
            return current;
        };
        let Some(row) = current else {
            return None;
        };

        let target = match self.matches.iter().rev().copied().find(|&m| m < row) {
            Some(found) => Some(found),
            None if row <= first => None,
            None => Some(last),
        };

        self.land(target, current)
    }

    fn land(&mut self, target: Option<usize>, current: Option<usize>) -> Option<usize> {
        match target {
            Some(row) => {
                self.highlighted = Some(row);
                Some(row)
            }
            None => current,
        }
    }
}

fn collect_matches(regex: &Regex, names: &[&str]) -> Vec<usize> {
    names
        .iter()
        .enumerate()
        .filter(|(_, name)| regex.is_match(name))
        .map(|(row, _)| row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: [&str; 3] = ["a.app", "b.app", "a2.app"];

    fn engine(pattern: &str, names: &[&str]) -> SearchEngine {
        let mut engine = SearchEngine::default();
        engine.search(pattern, names).unwrap();
        engine
    }

    #[test]
    fn anchored_pattern_matches_in_display_order() {
        let mut engine = SearchEngine::default();
        let matches = engine.search("^a", &NAMES).unwrap();
        assert_eq!(matches, &[0, 2]);
    }

    #[test]
    fn matching_ignores_case() {
        let engine = engine("MAPS", &["com.google.maps", "org.osmand", "Maps.Lite"]);
        assert_eq!(engine.matches(), &[0, 2]);
    }

    #[test]
    fn next_stops_at_last_match() {
        let mut engine = engine("^a", &NAMES);
        assert_eq!(engine.next(Some(0)), Some(2));
        assert_eq!(engine.next(Some(2)), Some(2));
        assert_eq!(engine.next(Some(2)), Some(2));
        assert_eq!(engine.highlighted(), Some(2));
    }

    #[test]
    fn next_past_last_match_stays_put() {
        let mut engine = engine("^a", &["a", "b", "c", "d"]);
        assert_eq!(engine.next(Some(3)), Some(3));
        assert_eq!(engine.highlighted(), None);
    }

    #[test]
    fn next_without_focus_lands_on_first_match() {
        let mut engine = engine("app", &["x", "one.app", "two.app"]);
        assert_eq!(engine.next(None), Some(1));
    }

    #[test]
    fn next_moves_from_non_matching_row() {
        let mut engine = engine("^a", &["a", "b", "c", "a1", "a2"]);
        assert_eq!(engine.next(Some(1)), Some(3));
        assert_eq!(engine.next(Some(3)), Some(4));
    }

    #[test]
    fn previous_stops_at_first_match() {
        let mut engine = engine("^a", &["x", "a", "y", "a2"]);
        assert_eq!(engine.previous(Some(3)), Some(1));
        assert_eq!(engine.previous(Some(1)), Some(1));
        assert_eq!(engine.previous(Some(0)), Some(0));
        assert_eq!(engine.previous(None), None);
    }

    #[test]
    fn navigation_without_matches_is_noop() {
        let mut engine = engine("zzz", &NAMES);
        assert!(engine.matches().is_empty());
        assert_eq!(engine.next(Some(1)), Some(1));
        assert_eq!(engine.previous(None), None);
    }

    #[test]
    fn invalid_pattern_keeps_previous_matches() {
        let mut engine = engine("^a", &NAMES);

        let err = engine.search("(unclosed", &NAMES).unwrap_err();

        assert!(matches!(err, Error::Pattern(_)));
        assert_eq!(engine.matches(), &[0, 2]);
        assert_eq!(engine.pattern(), Some("^a"));
    }

    #[test]
    fn blank_pattern_is_rejected() {
        let mut engine = SearchEngine::default();
        assert!(matches!(engine.search("   ", &NAMES), Err(Error::Pattern(_))));
        assert!(!engine.is_active());
    }

    #[test]
    fn refresh_recomputes_against_new_names() {
        let mut engine = engine("^a", &NAMES);
        engine.next(Some(0));

        engine.refresh(&["a.app", "b.app"]);

        assert_eq!(engine.matches(), &[0]);
        assert_eq!(engine.highlighted(), None);
    }

    #[test]
    fn reset_clears_matches_and_highlight() {
        let mut engine = engine("^a", &NAMES);
        engine.next(None);
        engine.reset();
        assert!(engine.matches().is_empty());
        assert_eq!(engine.highlighted(), None);
        assert_eq!(engine.pattern(), None);
    }
}
