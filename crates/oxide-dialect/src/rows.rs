//! Statement results and result cursors.
//!
//! Cursors are materialized when the query returns, so they do not borrow
//! the connection. They still follow the `next`/`scan`/`close` protocol the
//! ORM layer consumes, and refuse to be read after `close`.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{DialectError, Result};
use crate::value::{FromRow, FromSqlValue, SqlValue};

/// Outcome of a statement executed with [`Dialect::exec`].
///
/// [`Dialect::exec`]: crate::dialect::Dialect::exec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    rows_affected: u64,
    last_insert_id: Option<i64>,
}

impl ExecResult {
    /// Creates a result.
    #[must_use]
    pub const fn new(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }

    /// Number of rows changed by the statement.
    #[must_use]
    pub const fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Key generated by the statement, when the backend reports one.
    pub fn last_insert_id(&self) -> Result<i64> {
        self.last_insert_id
            .ok_or_else(|| DialectError::decode(0, "backend reported no last insert id"))
    }
}

/// A cursor over the rows returned by [`Dialect::query`].
///
/// [`Dialect::query`]: crate::dialect::Dialect::query
#[derive(Debug, Clone)]
pub struct Rows {
    columns: Arc<[String]>,
    pending: VecDeque<Vec<SqlValue>>,
    current: Option<Vec<SqlValue>>,
    closed: bool,
    err: Option<Arc<DialectError>>,
}

impl Rows {
    /// Creates a cursor over already-fetched rows.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.into(),
            pending: rows.into(),
            current: None,
            closed: false,
            err: None,
        }
    }

    /// Creates a cursor whose iteration stopped early with `err`.
    ///
    /// The rows fetched before the failure are still readable; once they
    /// are exhausted [`Rows::err`] reports the failure.
    #[must_use]
    pub fn truncated(columns: Vec<String>, rows: Vec<Vec<SqlValue>>, err: DialectError) -> Self {
        Self {
            err: Some(Arc::new(err)),
            ..Self::new(columns, rows)
        }
    }

    /// Creates an empty cursor, as returned by statements with no result set.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Column names of the result set.
    pub fn columns(&self) -> Result<&[String]> {
        if self.closed {
            return Err(DialectError::Closed);
        }
        Ok(&self.columns)
    }

    /// Advances to the next row. Returns `false` once the rows are exhausted
    /// or the cursor is closed.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.pending.pop_front();
        if self.current.is_none() {
            self.close();
            return false;
        }
        true
    }

    /// Converts the current row.
    pub fn scan<T: FromRow>(&self) -> Result<T> {
        T::from_row(self.current_row()?)
    }

    /// Converts a single column of the current row.
    pub fn get<T: FromSqlValue>(&self, column: usize) -> Result<T> {
        let row = self.current_row()?;
        let value = row.get(column).ok_or_else(|| {
            DialectError::decode(column, format!("row has {} columns", row.len()))
        })?;
        T::from_sql_value(value, column)
    }

    /// Error that ended iteration, if any.
    #[must_use]
    pub fn err(&self) -> Option<&DialectError> {
        self.err.as_deref()
    }

    /// Releases the cursor. Further reads fail with [`DialectError::Closed`].
    pub fn close(&mut self) {
        self.closed = true;
        self.current = None;
        self.pending.clear();
    }

    /// Returns whether the cursor has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    fn current_row(&self) -> Result<&[SqlValue]> {
        if self.closed {
            return Err(DialectError::Closed);
        }
        self.current
            .as_deref()
            .ok_or_else(|| DialectError::decode(0, "scan called before next"))
    }

    /// Drains the cursor into a vector of converted rows.
    pub fn collect<T: FromRow>(mut self) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(self.pending.len());
        while self.next() {
            out.push(self.scan()?);
        }
        Ok(out)
    }
}

/// A single row returned by [`Dialect::query_row`].
///
/// Errors from the query are deferred until [`Row::scan`].
///
/// [`Dialect::query_row`]: crate::dialect::Dialect::query_row
#[derive(Debug)]
pub struct Row {
    inner: Result<Option<Vec<SqlValue>>>,
}

impl Row {
    /// Takes the first row of a cursor and releases it.
    #[must_use]
    pub fn from_rows(mut rows: Rows) -> Self {
        let first = if rows.next() { rows.current.take() } else { None };
        rows.close();
        Self { inner: Ok(first) }
    }

    /// Wraps the error of a failed query.
    #[must_use]
    pub const fn from_error(err: DialectError) -> Self {
        Self { inner: Err(err) }
    }

    /// Converts the row, or returns the deferred query error.
    pub fn scan<T: FromRow>(self) -> Result<T> {
        match self.inner? {
            Some(values) => T::from_row(&values),
            None => Err(DialectError::NoRows),
        }
    }
}

impl From<Result<Rows>> for Row {
    fn from(result: Result<Rows>) -> Self {
        match result {
            Ok(rows) => Self::from_rows(rows),
            Err(err) => Self::from_error(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Rows {
        Rows::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![SqlValue::Int(1), SqlValue::Text("ada".into())],
                vec![SqlValue::Int(2), SqlValue::Text("grace".into())],
            ],
        )
    }

    #[test]
    fn test_iterate_and_scan() {
        let mut rows = sample();
        assert_eq!(rows.columns().unwrap(), ["id", "name"]);
        assert!(rows.next());
        let (id, name): (i64, String) = rows.scan().unwrap();
        assert_eq!((id, name.as_str()), (1, "ada"));
        assert!(rows.next());
        assert_eq!(rows.get::<String>(1).unwrap(), "grace");
        assert!(!rows.next());
        assert!(rows.is_closed());
        assert!(rows.err().is_none());
    }

    #[test]
    fn test_closed_cursor_rejects_reads() {
        let mut rows = sample();
        assert!(rows.next());
        rows.close();
        assert!(matches!(rows.scan::<(i64,)>(), Err(DialectError::Closed)));
        assert!(matches!(rows.columns(), Err(DialectError::Closed)));
        assert!(!rows.next());
    }

    #[test]
    fn test_truncated_reports_error() {
        let mut rows = Rows::truncated(
            vec!["id".into()],
            vec![vec![SqlValue::Int(1)]],
            DialectError::decode(0, "unsupported column type"),
        );
        assert!(rows.next());
        assert!(!rows.next());
        assert!(rows.err().is_some());
    }

    #[test]
    fn test_scan_before_next() {
        let rows = sample();
        assert!(rows.scan::<(i64,)>().is_err());
    }

    #[test]
    fn test_collect() {
        let ids: Vec<(i64,)> = sample().collect().unwrap();
        assert_eq!(ids, vec![(1,), (2,)]);
    }

    #[test]
    fn test_row_no_rows() {
        let row = Row::from_rows(Rows::empty());
        assert!(matches!(row.scan::<(i64,)>(), Err(DialectError::NoRows)));
    }

    #[test]
    fn test_row_deferred_error() {
        let row = Row::from(Err(DialectError::NotConnected));
        assert!(matches!(
            row.scan::<(i64,)>(),
            Err(DialectError::NotConnected)
        ));
    }

    #[test]
    fn test_exec_result() {
        let res = ExecResult::new(3, Some(9));
        assert_eq!(res.rows_affected(), 3);
        assert_eq!(res.last_insert_id().unwrap(), 9);
        assert!(ExecResult::default().last_insert_id().is_err());
    }
}
