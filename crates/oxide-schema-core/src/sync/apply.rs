//! Checking and committing table changes through a [`Connection`].

use tracing::{debug, info, warn};

use super::{LiveTable, SyncOptions, SyncReport, TableChanges};
use crate::connection::Connection;
use crate::error::Result;
use crate::table::TableSpec;

/// Statements executed by a sync and the state observed afterwards.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Statements run, in order.
    pub statements: Vec<String>,
    /// Fresh check of the table after the statements ran.
    pub after: SyncReport,
}

impl TableSpec {
    /// Reads the live schema of this table, or `None` when it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub async fn fetch_live<C: Connection>(&self, conn: &C) -> Result<Option<LiveTable>> {
        let backend = self.backend();
        let (sql, params) = backend.columns_query(self.name());
        debug!(table = %self.name(), sql = %sql, "Introspecting columns");
        let columns = conn.fetch_rows(&sql, &params).await?;
        if columns.is_empty() {
            return Ok(None);
        }
        let (sql, params) = backend.ddl_query(self.name());
        debug!(table = %self.name(), sql = %sql, "Introspecting DDL");
        let ddl = conn.fetch_rows(&sql, &params).await?;
        backend.parse_live_table(self.name(), &columns, &ddl)
    }

    /// Compares this table against the database without changing it.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub async fn check_sync<C: Connection>(
        &self,
        conn: &C,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let report = match self.fetch_live(conn).await? {
            None => SyncReport {
                table: self.name().to_string(),
                missing_table: true,
                changes: TableChanges::default(),
                reasons: vec![format!("table `{}` does not exist", self.name())],
            },
            Some(live) => {
                let changes = self.diff_live(&live, options);
                SyncReport {
                    table: self.name().to_string(),
                    missing_table: false,
                    reasons: changes.reasons(),
                    changes,
                }
            }
        };
        Ok(report)
    }

    /// Renders the statements that bring the database in line with this
    /// table, given a prior check.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SchemaError::PrimaryKeyChange`] when the backend
    /// cannot alter the primary key.
    pub fn commit_sql(&self, report: &SyncReport, options: &SyncOptions) -> Result<Vec<String>> {
        if report.missing_table {
            if options.create_missing_table {
                return Ok(self.create_sql());
            }
            return Ok(Vec::new());
        }
        if report.changes.is_empty() {
            return Ok(Vec::new());
        }
        self.backend()
            .commit_table_change_sql(self, &report.changes)
    }

    /// Brings the database in line with this table.
    ///
    /// The statements run as one all-or-nothing batch. The returned
    /// outcome carries a fresh check taken after the commit.
    ///
    /// # Errors
    ///
    /// Propagates driver errors and [`crate::SchemaError::PrimaryKeyChange`].
    pub async fn sync<C: Connection>(&self, conn: &C, options: &SyncOptions) -> Result<SyncOutcome> {
        info!(table = %self.name(), backend = self.backend().name(), "Syncing table");
        let report = self.check_sync(conn, options).await?;
        if !report.needs_commit() {
            info!(table = %self.name(), "Table is in sync");
            return Ok(SyncOutcome {
                statements: Vec::new(),
                after: report,
            });
        }
        for reason in &report.reasons {
            debug!(table = %self.name(), reason = %reason, "Schema discrepancy");
        }
        let statements = self.commit_sql(&report, options)?;
        if !statements.is_empty() {
            conn.execute_batch(&statements).await?;
        }
        let after = self.check_sync(conn, options).await?;
        if !after.needs_commit() {
            info!(table = %self.name(), statements = statements.len(), "Table synced");
        } else {
            warn!(
                table = %self.name(),
                remaining = ?after.reasons,
                "Table still differs after sync"
            );
        }
        Ok(SyncOutcome { statements, after })
    }
}
