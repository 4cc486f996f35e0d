//! Driver boundary.
//!
//! The core never talks to a database directly. Schema introspection,
//! statement execution and the query fetch helpers go through a
//! [`Connection`], which a driver crate implements.

use std::collections::BTreeMap;
use std::future::Future;

use crate::error::Result;
use crate::value::SqlValue;

/// A result row keyed by column name. SQL NULL is `None`.
pub type StringMap = BTreeMap<String, Option<String>>;

/// Executes SQL on behalf of the core.
///
/// Implementations report failures as [`crate::SchemaError::Driver`] and
/// apply their own timeout and retry policy.
pub trait Connection: Send + Sync {
    /// Executes one statement with positional `?` parameters and returns
    /// the number of affected rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> impl Future<Output = Result<u64>> + Send;

    /// Runs a query and returns every row as text.
    fn fetch_rows(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<Vec<StringMap>>> + Send;

    /// Executes statements in order, all or nothing.
    fn execute_batch(&self, statements: &[String]) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::{Connection, StringMap};
    use crate::error::Result;
    use crate::value::SqlValue;

    /// Records statements and answers queries with canned rows, in order.
    #[derive(Debug, Default)]
    pub(crate) struct MockConnection {
        responses: Mutex<VecDeque<Vec<StringMap>>>,
        pub(crate) executed: Mutex<Vec<(String, Vec<SqlValue>)>>,
    }

    impl MockConnection {
        pub(crate) fn with_responses(responses: Vec<Vec<StringMap>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                executed: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn statements(&self) -> Vec<String> {
            self.executed
                .lock()
                .unwrap()
                .iter()
                .map(|(sql, _)| sql.clone())
                .collect()
        }
    }

    pub(crate) fn row(pairs: &[(&str, Option<&str>)]) -> StringMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.map(str::to_string)))
            .collect()
    }

    impl Connection for MockConnection {
        async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
            self.executed
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            Ok(1)
        }

        async fn fetch_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<StringMap>> {
            self.executed
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn execute_batch(&self, statements: &[String]) -> Result<()> {
            let mut executed = self.executed.lock().unwrap();
            executed.extend(statements.iter().map(|s| (s.clone(), Vec::new())));
            Ok(())
        }
    }
}
