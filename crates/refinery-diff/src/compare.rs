use refinery_analysis::{Analysis, ListField};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Unchanged,
}

/// One list entry with its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffItem {
    pub text: String,
    pub kind: DiffKind,
}

impl DiffItem {
    fn new(text: &str, kind: DiffKind) -> Self {
        Self {
            text: text.to_string(),
            kind,
        }
    }
}

/// Classify the entries of two lists by exact string equality.
///
/// Removed entries come first in `before` order, followed by every entry of
/// `after` in its own order. Matching is by membership, so duplicates are
/// not counted: every copy of an entry shares its classification.
pub fn diff_lists(before: &[String], after: &[String]) -> Vec<DiffItem> {
    let before_set: HashSet<&str> = before.iter().map(String::as_str).collect();
    let after_set: HashSet<&str> = after.iter().map(String::as_str).collect();

    let removed = before
        .iter()
        .filter(|item| !after_set.contains(item.as_str()))
        .map(|item| DiffItem::new(item, DiffKind::Removed));

    let current = after.iter().map(|item| {
        let kind = if before_set.contains(item.as_str()) {
            DiffKind::Unchanged
        } else {
            DiffKind::Added
        };
        DiffItem::new(item, kind)
    });

    removed.chain(current).collect()
}

/// Overall movement of a list field between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    /// Entries were both added and removed
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDiff {
    pub field: ListField,
    pub change_type: ChangeType,
    pub items: Vec<DiffItem>,
}

impl FieldDiff {
    pub fn count(&self, kind: DiffKind) -> usize {
        self.items.iter().filter(|i| i.kind == kind).count()
    }

    pub fn added(&self) -> usize {
        self.count(DiffKind::Added)
    }

    pub fn removed(&self) -> usize {
        self.count(DiffKind::Removed)
    }
}

/// Added/removed counts for questions or assumptions, matched by text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChanges {
    pub added: usize,
    pub removed: usize,
    /// Size of the newer collection
    pub total: usize,
}

impl ItemChanges {
    fn between<'a>(
        before: impl Iterator<Item = &'a str>,
        after: impl Iterator<Item = &'a str>,
    ) -> Self {
        let before: Vec<&str> = before.collect();
        let after: Vec<&str> = after.collect();

        Self {
            added: after.iter().filter(|t| !before.contains(t)).count(),
            removed: before.iter().filter(|t| !after.contains(t)).count(),
            total: after.len(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisComparison {
    pub fields: Vec<FieldDiff>,
    pub questions: ItemChanges,
    pub assumptions: ItemChanges,
}

impl AnalysisComparison {
    pub fn field(&self, field: ListField) -> Option<&FieldDiff> {
        self.fields.iter().find(|f| f.field == field)
    }

    pub fn has_changes(&self) -> bool {
        self.fields.iter().any(|f| f.change_type != ChangeType::Unchanged)
            || !self.questions.is_unchanged()
            || !self.assumptions.is_unchanged()
    }
}

/// Compare two analysis snapshots field by field
pub fn compare_analyses(before: &Analysis, after: &Analysis) -> AnalysisComparison {
    let fields = ListField::ALL
        .iter()
        .map(|&field| {
            let items = diff_lists(before.list(field), after.list(field));
            let added = items.iter().any(|i| i.kind == DiffKind::Added);
            let removed = items.iter().any(|i| i.kind == DiffKind::Removed);
            let change_type = match (added, removed) {
                (true, true) => ChangeType::Modified,
                (true, false) => ChangeType::Added,
                (false, true) => ChangeType::Removed,
                (false, false) => ChangeType::Unchanged,
            };
            FieldDiff {
                field,
                change_type,
                items,
            }
        })
        .collect();

    AnalysisComparison {
        fields,
        questions: ItemChanges::between(
            before.questions.iter().map(|q| q.text.as_str()),
            after.questions.iter().map(|q| q.text.as_str()),
        ),
        assumptions: ItemChanges::between(
            before.assumptions.iter().map(|a| a.text.as_str()),
            after.assumptions.iter().map(|a| a.text.as_str()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinery_analysis::{Assumption, Priority, Question};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn tagged(items: &[DiffItem]) -> Vec<(&str, DiffKind)> {
        items.iter().map(|i| (i.text.as_str(), i.kind)).collect()
    }

    #[test]
    fn test_removed_first_then_after_order() {
        let diff = diff_lists(&strings(&["A", "B", "C"]), &strings(&["A", "C", "D"]));
        assert_eq!(
            tagged(&diff),
            vec![
                ("B", DiffKind::Removed),
                ("A", DiffKind::Unchanged),
                ("C", DiffKind::Unchanged),
                ("D", DiffKind::Added),
            ]
        );
    }

    #[test]
    fn test_matching_is_exact() {
        let diff = diff_lists(&strings(&["Use cache"]), &strings(&["use cache", "Use cache "]));
        assert_eq!(
            tagged(&diff),
            vec![
                ("Use cache", DiffKind::Removed),
                ("use cache", DiffKind::Added),
                ("Use cache ", DiffKind::Added),
            ]
        );
    }

    #[test]
    fn test_every_item_accounted_for() {
        let before = strings(&["x", "y", "z", "w"]);
        let after = strings(&["w", "v", "x"]);
        let diff = diff_lists(&before, &after);

        for item in &before {
            let hits = diff
                .iter()
                .filter(|d| &d.text == item && d.kind != DiffKind::Added)
                .count();
            assert_eq!(hits, 1, "{item}");
        }
        for item in &after {
            let hits = diff
                .iter()
                .filter(|d| &d.text == item && d.kind != DiffKind::Removed)
                .count();
            assert_eq!(hits, 1, "{item}");
        }
        assert_eq!(
            diff.iter().filter(|d| d.kind == DiffKind::Unchanged).count(),
            2
        );
    }

    #[test]
    fn test_empty_lists() {
        assert!(diff_lists(&[], &[]).is_empty());
        let diff = diff_lists(&[], &strings(&["new"]));
        assert_eq!(tagged(&diff), vec![("new", DiffKind::Added)]);
    }

    #[test]
    fn test_duplicates_match_by_membership() {
        // A dropped duplicate is not a removal while one copy survives
        let diff = diff_lists(&strings(&["A", "A"]), &strings(&["A"]));
        assert_eq!(tagged(&diff), vec![("A", DiffKind::Unchanged)]);

        let diff = diff_lists(&strings(&["A"]), &strings(&["A", "A"]));
        assert_eq!(
            tagged(&diff),
            vec![("A", DiffKind::Unchanged), ("A", DiffKind::Unchanged)]
        );

        let diff = diff_lists(&strings(&["B", "B"]), &strings(&["A"]));
        assert_eq!(
            tagged(&diff),
            vec![
                ("B", DiffKind::Removed),
                ("B", DiffKind::Removed),
                ("A", DiffKind::Added),
            ]
        );

        let before = Analysis {
            goals: strings(&["A", "A"]),
            ..Default::default()
        };
        let after = Analysis {
            goals: strings(&["A"]),
            ..Default::default()
        };
        let comparison = compare_analyses(&before, &after);
        assert_eq!(
            comparison.field(ListField::Goals).unwrap().change_type,
            ChangeType::Unchanged
        );
    }

    #[test]
    fn test_compare_classifies_fields() {
        let before = Analysis {
            goals: strings(&["A", "B"]),
            constraints: strings(&["C1"]),
            dependencies: strings(&["D1"]),
            questions: vec![
                Question::new("q1", "Which DB?", Priority::Critical),
                Question::new("q2", "SSO?", Priority::Important),
            ],
            assumptions: vec![Assumption::new("a1", "Web only", 0.6)],
            ..Default::default()
        };
        let after = Analysis {
            goals: strings(&["A", "C"]),
            constraints: strings(&["C1", "C2"]),
            questions: vec![
                // Same text under a new id counts as the same question
                Question::new("iter2_q1", "Which DB?", Priority::Critical),
                Question::new("iter2_q2", "Mobile?", Priority::NiceToHave),
                Question::new("iter2_q3", "Budget?", Priority::Important),
            ],
            assumptions: vec![Assumption::new("iter2_a1", "Web only", 0.9)],
            ..Default::default()
        };

        let cmp = compare_analyses(&before, &after);

        let change = |f| cmp.field(f).map(|d| d.change_type);
        assert_eq!(change(ListField::Goals), Some(ChangeType::Modified));
        assert_eq!(change(ListField::Constraints), Some(ChangeType::Added));
        assert_eq!(change(ListField::Dependencies), Some(ChangeType::Removed));
        assert_eq!(change(ListField::EdgeCases), Some(ChangeType::Unchanged));

        assert_eq!(
            cmp.questions,
            ItemChanges {
                added: 2,
                removed: 1,
                total: 3
            }
        );
        assert!(cmp.assumptions.is_unchanged());
        assert!(cmp.has_changes());
    }

    #[test]
    fn test_identical_analyses_have_no_changes() {
        let analysis = Analysis {
            goals: strings(&["A"]),
            ..Default::default()
        };
        assert!(!compare_analyses(&analysis, &analysis).has_changes());
    }
}
