//! Schema introspection and diff engine.
//!
//! The engine compares a [`TableSpec`] against the [`LiveTable`] read back
//! from the database and produces [`TableChanges`]. Checking is read-only;
//! committing renders the changes through the table's backend and runs the
//! statements as one all-or-nothing batch.
//!
//! Running [`TableSpec::sync`] for the same table from several processes
//! at once is not supported. Callers that deploy concurrently must
//! serialize schema changes themselves.

mod apply;
mod diff;

use serde::{Deserialize, Serialize};

pub use apply::SyncOutcome;
pub use diff::{diff_columns, diff_indexes};

use crate::columns::ColumnSpec;
use crate::table::{IndexSpec, TableSpec};

/// Knobs shared by check and commit so both agree on what counts as a
/// discrepancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Emit `DROP COLUMN` for live columns the table no longer declares.
    pub drop_removed_columns: bool,
    /// Drop live indexes that are neither declared nor implied by a
    /// constraint.
    pub drop_extra_indexes: bool,
    /// Create the table when it does not exist.
    pub create_missing_table: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            drop_removed_columns: false,
            drop_extra_indexes: true,
            create_missing_table: true,
        }
    }
}

/// Kind of a constraint found in live DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Foreign key.
    ForeignKey {
        /// Referenced table.
        references_table: String,
        /// Referenced columns.
        references_columns: Vec<String>,
    },
    /// Unique constraint.
    Unique,
}

/// A foreign-key or unique constraint found in live DDL. Only used to
/// recognize the indexes a constraint creates implicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// Constraint name, when the DDL gives one.
    pub name: Option<String>,
    /// Constrained columns.
    pub columns: Vec<String>,
    /// Constraint kind.
    pub kind: ConstraintKind,
}

impl Constraint {
    /// Whether `index` exists only to back this constraint.
    #[must_use]
    pub fn implies(&self, index: &IndexSpec) -> bool {
        self.name.as_deref() == Some(index.name()) || index.is_identical(&self.columns)
    }
}

/// Schema of a table as it exists in the database.
#[derive(Debug, Clone)]
pub struct LiveTable {
    /// Table name.
    pub name: String,
    /// Columns in storage order.
    pub columns: Vec<ColumnSpec>,
    /// Secondary indexes.
    pub indexes: Vec<IndexSpec>,
    /// Constraints parsed from the DDL.
    pub constraints: Vec<Constraint>,
    /// Raw DDL text.
    pub ddl: String,
}

impl LiveTable {
    /// Looks a live column up by name, case-insensitively.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Names of the live primary key columns.
    #[must_use]
    pub fn primary_key_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_primary())
            .map(|c| c.name().to_string())
            .collect()
    }
}

/// One column level change.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnChange {
    /// Column declared but missing from the live table.
    Add(ColumnSpec),
    /// Column present on both sides with different definitions.
    Modify {
        /// Live column.
        old: ColumnSpec,
        /// Desired column.
        new: ColumnSpec,
    },
    /// Live column no longer declared.
    Drop(ColumnSpec),
}

impl ColumnChange {
    /// Name of the affected column.
    #[must_use]
    pub fn column_name(&self) -> &str {
        match self {
            Self::Add(c) | Self::Drop(c) | Self::Modify { new: c, .. } => c.name(),
        }
    }
}

/// Everything that must change for a live table to match its spec.
///
/// Column changes are ordered by desired declaration order, with drops
/// last in live order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableChanges {
    /// Column additions, modifications and drops.
    pub columns: Vec<ColumnChange>,
    /// Declared indexes missing from the live table.
    pub added_indexes: Vec<IndexSpec>,
    /// Live indexes to remove.
    pub removed_indexes: Vec<IndexSpec>,
    /// Live and desired primary key columns, when they differ.
    pub primary_key: Option<(Vec<String>, Vec<String>)>,
    /// Live-only columns kept because drops are disabled.
    pub retained_columns: Vec<ColumnSpec>,
    /// Live-only indexes kept because index drops are disabled or a
    /// constraint implies them.
    pub retained_indexes: Vec<IndexSpec>,
}

impl TableChanges {
    /// Returns `true` when no statement needs to run. Retained columns do
    /// not count, see [`TableChanges::has_discrepancies`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
            && self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.primary_key.is_none()
    }

    /// Returns `true` when the live table differs in any way, including
    /// live-only columns that are kept.
    #[must_use]
    pub fn has_discrepancies(&self) -> bool {
        !self.is_empty() || !self.retained_columns.is_empty()
    }

    /// Columns to add.
    pub fn added(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter_map(|c| match c {
            ColumnChange::Add(col) => Some(col),
            _ => None,
        })
    }

    /// `(live, desired)` pairs of columns to modify.
    pub fn updated(&self) -> impl Iterator<Item = (&ColumnSpec, &ColumnSpec)> {
        self.columns.iter().filter_map(|c| match c {
            ColumnChange::Modify { old, new } => Some((old, new)),
            _ => None,
        })
    }

    /// Columns to drop.
    pub fn removed(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter_map(|c| match c {
            ColumnChange::Drop(col) => Some(col),
            _ => None,
        })
    }

    /// Human readable description of each change.
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        for change in &self.columns {
            reasons.push(match change {
                ColumnChange::Add(c) => format!("missing column {}", c.definition_string()),
                ColumnChange::Modify { old, new } => format!(
                    "column `{}` differs: live {} desired {}",
                    new.name(),
                    old.definition_string(),
                    new.definition_string()
                ),
                ColumnChange::Drop(c) => format!("extra column `{}`", c.name()),
            });
        }
        for c in &self.retained_columns {
            reasons.push(format!("extra column `{}` (kept)", c.name()));
        }
        for idx in &self.added_indexes {
            reasons.push(format!("missing index `{}` ({})", idx.name(), idx.columns().join(", ")));
        }
        for idx in &self.removed_indexes {
            reasons.push(format!("extra index `{}` ({})", idx.name(), idx.columns().join(", ")));
        }
        if let Some((live, desired)) = &self.primary_key {
            reasons.push(format!(
                "primary key differs: live ({}) desired ({})",
                live.join(", "),
                desired.join(", ")
            ));
        }
        reasons
    }
}

/// Result of checking one table.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Table name.
    pub table: String,
    /// The table does not exist.
    pub missing_table: bool,
    /// Changes needed when the table exists.
    pub changes: TableChanges,
    /// Human readable discrepancies.
    pub reasons: Vec<String>,
}

impl SyncReport {
    /// Returns `true` when the live table matches exactly. A live-only
    /// column kept by [`SyncOptions::drop_removed_columns`] makes the
    /// table out of sync even though committing would change nothing.
    #[must_use]
    pub fn is_in_sync(&self) -> bool {
        !self.missing_table && !self.changes.has_discrepancies()
    }

    /// Returns `true` when committing would run at least one statement.
    #[must_use]
    pub fn needs_commit(&self) -> bool {
        self.missing_table || !self.changes.is_empty()
    }
}

impl TableSpec {
    /// Computes the changes turning `live` into this table.
    #[must_use]
    pub fn diff_live(&self, live: &LiveTable, options: &SyncOptions) -> TableChanges {
        diff::diff_table(self, live, options)
    }
}
