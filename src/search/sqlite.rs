//! Embedded SQLite execution channel.
//!
//! A reference [`ExecutionChannel`] over `rusqlite`, matching the dialect
//! the compiler emits: a `resources` table with an integer `id` primary
//! key and a `resource_type` column, a `relationships` triple table, and
//! an FTS5 `resources_fts` index over the searchable columns.

use std::path::Path;
use std::time::Instant;

use parking_lot::Mutex;
use rusqlite::types::ToSqlOutput;
use rusqlite::{params_from_iter, Connection, ToSql};

use crate::catalog::ParamValue;
use crate::error::{SearchError, SearchResult};
use crate::lql::ParameterizedStatement;
use super::channel::{ExecutionChannel, MatchRow, QueryControl};

impl ToSql for ParamValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            ParamValue::Text(s) => ToSqlOutput::from(s.as_str()),
            ParamValue::Integer(i) => ToSqlOutput::from(*i),
            ParamValue::Real(f) => ToSqlOutput::from(*f),
            ParamValue::Boolean(b) => ToSqlOutput::from(*b as i64),
            // Sortable text keeps range comparisons lexicographic.
            ParamValue::DateTime(dt) => {
                ToSqlOutput::from(dt.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            ParamValue::Guid(u) => ToSqlOutput::from(u.to_string()),
        })
    }
}

fn store_err(error: rusqlite::Error) -> SearchError {
    SearchError::Store(error.to_string())
}

pub struct SqliteChannel {
    conn: Mutex<Connection>,
}

impl SqliteChannel {
    pub fn open(path: impl AsRef<Path>) -> SearchResult<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> SearchResult<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Runs a raw SQL batch, e.g. schema setup or data seeding.
    pub fn run_batch(&self, sql: &str) -> SearchResult<()> {
        self.conn.lock().execute_batch(sql).map_err(store_err)
    }
}

impl ExecutionChannel for SqliteChannel {
    fn fetch_rows(
        &self,
        statement: &ParameterizedStatement,
        control: &QueryControl,
    ) -> SearchResult<Vec<MatchRow>> {
        let started = Instant::now();
        control.check(started)?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&statement.sql).map_err(store_err)?;
        let columns = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(statement.params.iter()))
            .map_err(store_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            control.check(started)?;
            let id: i64 = row.get(0).map_err(store_err)?;
            let weight = if columns > 1 {
                Some(row.get::<_, f64>(1).map_err(store_err)?)
            } else {
                None
            };
            out.push(MatchRow { id, weight });
        }
        Ok(out)
    }

    fn fetch_count(
        &self,
        statement: &ParameterizedStatement,
        control: &QueryControl,
    ) -> SearchResult<u64> {
        let started = Instant::now();
        control.check(started)?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&statement.sql).map_err(store_err)?;
        let count: i64 = stmt
            .query_row(params_from_iter(statement.params.iter()), |row| row.get(0))
            .map_err(store_err)?;
        Ok(count.max(0) as u64)
    }

    fn fetch_scalar(
        &self,
        statement: &ParameterizedStatement,
        control: &QueryControl,
    ) -> SearchResult<Option<f64>> {
        let started = Instant::now();
        control.check(started)?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&statement.sql).map_err(store_err)?;
        stmt.query_row(params_from_iter(statement.params.iter()), |row| {
            row.get::<_, Option<f64>>(0)
        })
        .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::channel::CancelToken;

    fn channel() -> SqliteChannel {
        let channel = SqliteChannel::open_in_memory().unwrap();
        channel
            .run_batch(
                "CREATE TABLE resources (id INTEGER PRIMARY KEY, resource_type TEXT NOT NULL, title TEXT);
                 INSERT INTO resources VALUES (1, 'type-a', 'first');
                 INSERT INTO resources VALUES (2, 'type-a', 'second');",
            )
            .unwrap();
        channel
    }

    #[test]
    fn test_fetch_rows_and_count() {
        let channel = channel();
        let statement = ParameterizedStatement {
            sql: "SELECT id FROM resources WHERE resource_type = ? ORDER BY id".to_string(),
            params: vec![ParamValue::Text("type-a".to_string())],
        };
        let control = QueryControl::unconstrained();

        let rows = channel.fetch_rows(&statement, &control).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], MatchRow { id: 1, weight: None });

        let count = channel
            .fetch_count(
                &ParameterizedStatement {
                    sql: "SELECT COUNT(*) FROM resources".to_string(),
                    params: vec![],
                },
                &control,
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_fetch_scalar_empty_aggregate_is_none() {
        let channel = channel();
        let statement = ParameterizedStatement {
            sql: "SELECT MAX(id) FROM resources WHERE id > 100".to_string(),
            params: vec![],
        };
        let scalar = channel
            .fetch_scalar(&statement, &QueryControl::unconstrained())
            .unwrap();
        assert_eq!(scalar, None);
    }

    #[test]
    fn test_cancelled_control_stops_before_execution() {
        let channel = channel();
        let cancel = CancelToken::new();
        cancel.cancel();
        let control = QueryControl {
            timeout: None,
            cancel,
        };
        let statement = ParameterizedStatement {
            sql: "SELECT id FROM resources".to_string(),
            params: vec![],
        };
        assert!(matches!(
            channel.fetch_rows(&statement, &control),
            Err(SearchError::Cancelled)
        ));
    }

    #[test]
    fn test_store_error_is_propagated() {
        let channel = channel();
        let statement = ParameterizedStatement {
            sql: "SELECT id FROM no_such_table".to_string(),
            params: vec![],
        };
        assert!(matches!(
            channel.fetch_rows(&statement, &QueryControl::unconstrained()),
            Err(SearchError::Store(_))
        ));
    }
}
