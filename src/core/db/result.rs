//! Result Module
//!
//! A lazy, forward-only cursor over the row set of one execution, or a bare
//! acknowledgement envelope for statements that produce no rows.

use crate::core::db::{Row, Value};
use crate::core::native::RawResult;
use std::fmt;

/// Outcome of one execution.
///
/// Rows are fetched one at a time on first access and memoized until the
/// cursor is advanced, so reading [`current`](ResultSet::current) repeatedly
/// never re-fetches. Affected rows and the generated value are captured when
/// the result is built and never re-derived.
pub struct ResultSet {
    resource: RawResult,
    current_data: Option<Row>,
    current_complete: bool,
    position: usize,
    affected_rows: i64,
    generated_value: Option<Value>,
}

impl ResultSet {
    /// Wraps a native result with the metadata computed at execution time.
    pub fn new(resource: RawResult, affected_rows: i64, generated_value: Option<Value>) -> Self {
        ResultSet {
            resource,
            current_data: None,
            current_complete: false,
            position: 0,
            affected_rows,
            generated_value,
        }
    }

    /// Results stream from the native handle and are never buffered here.
    pub fn is_buffered(&self) -> bool {
        false
    }

    pub fn resource(&self) -> &RawResult {
        &self.resource
    }

    /// The row at the cursor, fetching it if this position was not loaded yet.
    pub fn current(&mut self) -> Option<&Row> {
        if !self.current_complete {
            self.load();
        }
        self.current_data.as_ref()
    }

    fn load(&mut self) -> bool {
        self.current_data = match &mut self.resource {
            RawResult::Rows(rows) => rows.fetch_assoc(),
            RawResult::Done => None,
        };
        self.current_complete = true;
        self.current_data.is_some()
    }

    /// Moves the cursor forward and fetches the row there.
    pub fn advance(&mut self) {
        self.position += 1;
        self.load();
    }

    /// Returns the cursor to position 0 and fetches.
    ///
    /// Native row sets are forward-only; on a row set that was already read
    /// this fetches whatever the native handle yields next.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.load();
    }

    /// 0-based cursor position.
    pub fn key(&self) -> usize {
        self.position
    }

    /// Whether the cursor is on a row. Fetches once if the memoized row is
    /// missing.
    pub fn valid(&mut self) -> bool {
        if self.current_complete && self.current_data.is_some() {
            return true;
        }
        self.load()
    }

    /// Number of rows in the native row set; 0 for acknowledgements.
    ///
    /// Named apart from `Iterator::count`, which would consume the cursor.
    pub fn row_count(&self) -> i64 {
        match &self.resource {
            RawResult::Rows(rows) => rows.num_rows(),
            RawResult::Done => 0,
        }
    }

    /// Number of columns in the native row set; 0 for acknowledgements.
    pub fn field_count(&self) -> usize {
        match &self.resource {
            RawResult::Rows(rows) => rows.num_fields(),
            RawResult::Done => 0,
        }
    }

    /// Whether this result carries columns rather than a DML acknowledgement.
    pub fn is_query_result(&self) -> bool {
        match &self.resource {
            RawResult::Done => false,
            RawResult::Rows(rows) => rows.num_fields() > 0,
        }
    }

    pub fn affected_rows(&self) -> i64 {
        self.affected_rows
    }

    pub fn generated_value(&self) -> Option<&Value> {
        self.generated_value.as_ref()
    }
}

impl Iterator for ResultSet {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if !self.valid() {
            return None;
        }
        let row = self.current_data.take();
        self.advance();
        row
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("resource", &self.resource)
            .field("position", &self.position)
            .field("affected_rows", &self.affected_rows)
            .field("generated_value", &self.generated_value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::native::{BufferedResult, NativeResult};
    use std::cell::Cell;
    use std::rc::Rc;

    /// Row set that counts native fetches.
    struct CountingRows {
        inner: BufferedResult,
        fetches: Rc<Cell<usize>>,
    }

    impl NativeResult for CountingRows {
        fn fetch_assoc(&mut self) -> Option<Row> {
            self.fetches.set(self.fetches.get() + 1);
            self.inner.fetch_assoc()
        }
        fn num_rows(&self) -> i64 {
            self.inner.num_rows()
        }
        fn num_fields(&self) -> usize {
            self.inner.num_fields()
        }
    }

    fn rows(n: i64) -> (ResultSet, Rc<Cell<usize>>) {
        let fetches = Rc::new(Cell::new(0));
        let data = (1..=n).map(|i| vec![Value::Int(i)]).collect();
        let native = CountingRows {
            inner: BufferedResult::new(vec!["id".to_string()], data),
            fetches: fetches.clone(),
        };
        let result = ResultSet::new(RawResult::Rows(Box::new(native)), n, None);
        (result, fetches)
    }

    #[test]
    fn test_empty_result() {
        let (mut result, _) = rows(0);
        assert!(!result.valid());
        assert_eq!(result.row_count(), 0);
        assert!(result.is_query_result());
        assert!(result.next().is_none());
    }

    #[test]
    fn test_iterates_in_fetch_order() {
        let (mut result, fetches) = rows(3);
        result.rewind();
        let mut seen = Vec::new();
        while result.valid() {
            seen.push(result.current().and_then(|r| r.get("id")).cloned());
            result.advance();
        }
        assert_eq!(
            seen,
            vec![Some(Value::Int(1)), Some(Value::Int(2)), Some(Value::Int(3))]
        );
        assert!(!result.valid());
        assert!(fetches.get() >= 4);
    }

    #[test]
    fn test_current_is_memoized() {
        let (mut result, fetches) = rows(2);
        let first = result.current().cloned();
        let again = result.current().cloned();
        assert_eq!(first, again);
        assert_eq!(fetches.get(), 1);
        assert!(result.valid());
        assert_eq!(fetches.get(), 1);
        assert_eq!(result.key(), 0);

        result.advance();
        assert_eq!(result.key(), 1);
        assert_eq!(fetches.get(), 2);
        assert_eq!(result.current().and_then(|r| r.get("id")), Some(&Value::Int(2)));
    }

    #[test]
    fn test_iterator_yields_every_row() {
        let (result, _) = rows(4);
        let ids: Vec<i64> = result
            .filter_map(|row| row.get("id").and_then(Value::as_i64))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_acknowledgement_envelope() {
        let mut result = ResultSet::new(RawResult::Done, 5, Some(Value::Int(42)));
        assert!(!result.is_query_result());
        assert_eq!(result.field_count(), 0);
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.affected_rows(), 5);
        assert_eq!(result.generated_value(), Some(&Value::Int(42)));
        assert!(!result.valid());
        assert!(!result.is_buffered());
    }

    #[test]
    fn test_columnless_row_set_is_not_a_query_result() {
        let native = BufferedResult::new(vec![], vec![]);
        let result = ResultSet::new(RawResult::Rows(Box::new(native)), 0, None);
        assert!(!result.is_query_result());
    }
}
