//! Label highlights for a release: priority labels first, then by popularity.
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::config::Labels;
use crate::db::model::Label;

/// Colors compare case-insensitively, with or without a leading `#`.
pub fn normalize_color(color: &str) -> String {
    color.trim().trim_start_matches('#').to_ascii_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPolicy {
    priority: HashSet<String>,
    excluded: HashSet<String>,
    max_highlights: usize,
}

impl LabelPolicy {
    pub fn new<P, E>(priority: P, excluded: E, max_highlights: usize) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            priority: priority.into_iter().map(|c| normalize_color(c.as_ref())).collect(),
            excluded: excluded.into_iter().map(|c| normalize_color(c.as_ref())).collect(),
            max_highlights,
        }
    }

    pub fn from_config(cfg: &Labels) -> Self {
        Self::new(&cfg.priority_colors, &cfg.excluded_colors, cfg.max_highlights)
    }

    pub fn is_excluded(&self, label: &Label) -> bool {
        self.excluded.contains(&normalize_color(&label.color))
    }

    pub fn is_priority(&self, label: &Label) -> bool {
        self.priority.contains(&normalize_color(&label.color))
    }

    pub fn max_highlights(&self) -> usize {
        self.max_highlights
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    #[serde(flatten)]
    pub label: Label,
    pub occurrences: usize,
    pub priority: bool,
}

struct Tally {
    first_seen: usize,
    count: usize,
    label: Label,
}

/// Rank distinct labels out of a list of occurrences.
///
/// Excluded colors are dropped. Priority labels come before all others; within
/// each group more frequent labels come first and ties keep first-seen order.
pub fn rank_highlights(occurrences: &[Label], policy: &LabelPolicy) -> Vec<Highlight> {
    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    for (idx, label) in occurrences.iter().enumerate() {
        if policy.is_excluded(label) {
            continue;
        }
        tallies
            .entry(label.id.as_str())
            .or_insert_with(|| Tally {
                first_seen: idx,
                count: 0,
                label: label.clone(),
            })
            .count += 1;
    }

    let mut ranked: Vec<Highlight> = Vec::new();
    let mut tallies: Vec<Tally> = tallies.into_values().collect();
    tallies.sort_by_key(|t| {
        (
            !policy.is_priority(&t.label),
            std::cmp::Reverse(t.count),
            t.first_seen,
        )
    });
    for t in tallies.into_iter().take(policy.max_highlights) {
        let priority = policy.is_priority(&t.label);
        ranked.push(Highlight {
            label: t.label,
            occurrences: t.count,
            priority,
        });
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: &str, color: &str) -> Label {
        Label {
            id: id.into(),
            name: id.into(),
            description: None,
            color: color.into(),
        }
    }

    fn ids(ranked: &[Highlight]) -> Vec<&str> {
        ranked.iter().map(|h| h.label.id.as_str()).collect()
    }

    #[test]
    fn priority_beats_popularity() {
        let policy = LabelPolicy::new(["#B60205"], ["ededed"], 15);
        let mut occurrences = vec![label("common", "0075ca"); 10];
        occurrences.extend(vec![label("urgent", "b60205"); 2]);
        let ranked = rank_highlights(&occurrences, &policy);
        assert_eq!(ids(&ranked), vec!["urgent", "common"]);
        assert_eq!(ranked[0].occurrences, 2);
        assert!(ranked[0].priority);
        assert_eq!(ranked[1].occurrences, 10);
    }

    #[test]
    fn excluded_colors_are_dropped_case_insensitively() {
        let policy = LabelPolicy::new(Vec::<String>::new(), ["EDEDED"], 15);
        let occurrences = vec![label("noise", "#ededed"), label("docs", "0075ca")];
        assert_eq!(ids(&rank_highlights(&occurrences, &policy)), vec!["docs"]);
    }

    #[test]
    fn ties_keep_first_seen_order_and_truncate() {
        let policy = LabelPolicy::new(Vec::<String>::new(), Vec::<String>::new(), 2);
        let occurrences = vec![
            label("b", "111111"),
            label("a", "222222"),
            label("c", "333333"),
            label("c", "333333"),
        ];
        assert_eq!(ids(&rank_highlights(&occurrences, &policy)), vec!["c", "b"]);
    }

    #[test]
    fn empty_input_gives_empty_ranking() {
        let policy = LabelPolicy::from_config(&Labels::default());
        assert_eq!(policy.max_highlights(), 15);
        assert!(rank_highlights(&[], &policy).is_empty());
    }
}
