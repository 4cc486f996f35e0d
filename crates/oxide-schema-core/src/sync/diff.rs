//! Pure comparison of desired and live table shapes.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::{ColumnChange, Constraint, LiveTable, SyncOptions, TableChanges};
use crate::columns::ColumnSpec;
use crate::table::{IndexSpec, TableSpec};

// ================================================================
// Column diff
// ================================================================

/// Compares column lists by name.
///
/// Additions and modifications follow `desired` declaration order; drops
/// follow `live` order and come last.
#[must_use]
pub fn diff_columns(desired: &[ColumnSpec], live: &[ColumnSpec]) -> Vec<ColumnChange> {
    let mut changes = Vec::new();
    for want in desired {
        match live
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(want.name()))
        {
            None => changes.push(ColumnChange::Add(want.clone())),
            Some(have) if !have.is_identical(want) => changes.push(ColumnChange::Modify {
                old: have.clone(),
                new: want.clone(),
            }),
            Some(_) => {}
        }
    }
    let desired_names: BTreeSet<String> = desired.iter().map(|c| c.name().to_lowercase()).collect();
    changes.extend(
        live.iter()
            .filter(|c| !desired_names.contains(&c.name().to_lowercase()))
            .cloned()
            .map(ColumnChange::Drop),
    );
    changes
}

// ================================================================
// Index diff
// ================================================================

/// Two indexes are equivalent when they cover the same columns in the
/// same order with the same uniqueness.
fn indexes_equivalent(a: &IndexSpec, b: &IndexSpec) -> bool {
    a.is_unique() == b.is_unique() && a.is_identical(b.columns())
}

/// Compares index lists.
///
/// Returns `(missing, extra)`: declared indexes without an equivalent live
/// index, and live indexes that match no declared index and back no
/// constraint.
#[must_use]
pub fn diff_indexes(
    desired: &[IndexSpec],
    live: &[IndexSpec],
    constraints: &[Constraint],
) -> (Vec<IndexSpec>, Vec<IndexSpec>) {
    let mut used = vec![false; live.len()];
    let mut missing = Vec::new();
    for want in desired {
        let found = live
            .iter()
            .enumerate()
            .find(|(i, have)| !used[*i] && indexes_equivalent(have, want));
        match found {
            Some((i, _)) => used[i] = true,
            None => missing.push(want.clone()),
        }
    }
    let extra = live
        .iter()
        .zip(&used)
        .filter(|(idx, used)| !**used && !constraints.iter().any(|c| c.implies(idx)))
        .map(|(idx, _)| idx.clone())
        .collect();
    (missing, extra)
}

// ================================================================
// Table-level diff
// ================================================================

pub(super) fn diff_table(
    desired: &TableSpec,
    live: &LiveTable,
    options: &SyncOptions,
) -> TableChanges {
    let mut changes = TableChanges::default();

    for change in diff_columns(desired.columns(), &live.columns) {
        match change {
            ColumnChange::Drop(col) if !options.drop_removed_columns => {
                warn!(
                    table = %desired.name(),
                    column = %col.name(),
                    "Live column is no longer declared; keeping it"
                );
                changes.retained_columns.push(col);
            }
            change => {
                debug!(
                    table = %desired.name(),
                    column = %change.column_name(),
                    change = ?change,
                    "Column change detected"
                );
                changes.columns.push(change);
            }
        }
    }

    if desired.backend().supports_indexes() {
        // Indexes on columns being dropped disappear with them.
        let dropped: BTreeSet<String> = changes.removed().map(|c| c.name().to_string()).collect();
        let (missing, extra) = diff_indexes(desired.indexes(), &live.indexes, &live.constraints);
        let implied: Vec<IndexSpec> = live
            .indexes
            .iter()
            .filter(|idx| live.constraints.iter().any(|c| c.implies(idx)))
            .cloned()
            .collect();
        changes.retained_indexes.extend(implied);
        for idx in extra {
            if idx.columns().iter().any(|c| dropped.contains(c.as_str())) {
                debug!(table = %desired.name(), index = %idx.name(), "Index goes with dropped column");
                changes.removed_indexes.push(idx);
            } else if options.drop_extra_indexes {
                debug!(table = %desired.name(), index = %idx.name(), "Extra index detected");
                changes.removed_indexes.push(idx);
            } else {
                warn!(table = %desired.name(), index = %idx.name(), "Live index is not declared; keeping it");
                changes.retained_indexes.push(idx);
            }
        }
        for idx in missing {
            debug!(table = %desired.name(), index = %idx.name(), "Missing index detected");
            changes.added_indexes.push(idx);
        }
    }

    let desired_pk = desired.backend().effective_primary_key(desired);
    let mut live_sorted = live.primary_key_names();
    let mut desired_sorted = desired_pk.clone();
    live_sorted.sort();
    desired_sorted.sort();
    if live_sorted != desired_sorted {
        debug!(table = %desired.name(), "Primary key change detected");
        changes.primary_key = Some((live.primary_key_names(), desired_pk));
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mysql::{integer_column, text_column};
    use crate::sync::ConstraintKind;
    use std::collections::BTreeMap;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn column_changes_follow_declaration_order() {
        let live = vec![
            integer_column("id", "BIGINT", true, &tags(&[("auto_increment", "true")]), false)
                .unwrap(),
            text_column("name", "VARCHAR", &tags(&[("width", "64")]), false).unwrap(),
            integer_column("age", "INT", false, &tags(&[("width", "11")]), true).unwrap(),
            integer_column("is_male", "TINYINT", false, &tags(&[]), true).unwrap(),
        ];
        let desired = vec![
            live[0].clone(),
            text_column("name", "VARCHAR", &tags(&[("width", "128")]), false).unwrap(),
            integer_column("age", "INT", true, &tags(&[("width", "10")]), true).unwrap(),
            text_column("gender", "VARCHAR", &tags(&[("width", "8")]), false).unwrap(),
        ];
        let changes = diff_columns(&desired, &live);
        let names: Vec<_> = changes.iter().map(ColumnChange::column_name).collect();
        assert_eq!(names, ["name", "age", "gender", "is_male"]);
        assert!(matches!(changes[0], ColumnChange::Modify { .. }));
        assert!(matches!(changes[2], ColumnChange::Add(_)));
        assert!(matches!(changes[3], ColumnChange::Drop(_)));
    }

    #[test]
    fn identical_columns_produce_no_change() {
        let cols = vec![text_column("name", "VARCHAR", &tags(&[("width", "64")]), false).unwrap()];
        assert!(diff_columns(&cols, &cols).is_empty());
    }

    #[test]
    fn index_diff_respects_constraints() {
        let desired = vec![IndexSpec::new("ix_t_a_b", &["a", "b"], false)];
        let live = vec![
            IndexSpec::new("ix_t_b_a", &["b", "a"], false),
            IndexSpec::new("fk_idx", &["c"], false),
        ];
        let constraints = vec![Constraint {
            name: Some("t_ibfk_1".into()),
            columns: vec!["c".into()],
            kind: ConstraintKind::ForeignKey {
                references_table: "other".into(),
                references_columns: vec!["id".into()],
            },
        }];
        let (missing, extra) = diff_indexes(&desired, &live, &constraints);
        assert_eq!(missing, desired);
        assert_eq!(extra, vec![live[0].clone()]);
    }

    #[test]
    fn equivalent_index_under_other_name_is_kept() {
        let desired = vec![IndexSpec::new("ix_t_a", &["a"], false)];
        let live = vec![IndexSpec::new("legacy_a", &["a"], false)];
        let (missing, extra) = diff_indexes(&desired, &live, &[]);
        assert!(missing.is_empty());
        assert!(extra.is_empty());
    }
}
