//! Name-based row access over a [`TabularResult`].
//!
//! Enabled with the `row-map` feature.

use crate::{TabularResult, Value};

/// One row of a column-major result.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    result: &'a TabularResult,
    index: usize,
}

impl<'a> RowRef<'a> {
    /// Position of this row in the result.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns a value by case-insensitive column name. With duplicate
    /// names the first column wins.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let column = self
            .result
            .columns()
            .iter()
            .position(|col| col.eq_ignore_ascii_case(name))?;
        self.result.column_at(column)?.get(self.index)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Floats, and integers widened to `f64`.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Float(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn get_text(&self, name: &str) -> Option<&'a str> {
        match self.get(name)? {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl TabularResult {
    /// Row view at `index`, if it exists.
    pub fn row_ref(&self, index: usize) -> Option<RowRef<'_>> {
        (index < self.num_rows()).then_some(RowRef {
            result: self,
            index,
        })
    }

    /// Iterates all rows as [`RowRef`]s.
    pub fn row_refs(&self) -> impl Iterator<Item = RowRef<'_>> + '_ {
        (0..self.num_rows()).map(move |index| RowRef {
            result: self,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{TabularResult, Value};

    fn sample() -> TabularResult {
        TabularResult::from_columns(
            vec!["Id".into(), "name".into(), "score".into(), "active".into()],
            vec![
                vec![Value::integer(1), Value::integer(2)],
                vec![Value::text("alice"), Value::null()],
                vec![Value::float(0.5), Value::integer(3)],
                vec![Value::bool(true), Value::bool(false)],
            ],
        )
        .expect("valid result")
    }

    #[test]
    fn lookups_ignore_case() {
        let result = sample();
        let row = result.row_ref(0).expect("row 0");
        assert_eq!(row.get_i64("id"), Some(1));
        assert_eq!(row.get_text("NAME"), Some("alice"));
        assert_eq!(row.get_f64("score"), Some(0.5));
        assert_eq!(row.get_bool("active"), Some(true));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn typed_getters_reject_other_kinds() {
        let result = sample();
        let row = result.row_ref(1).expect("row 1");
        assert!(row.get("name").is_some_and(Value::is_null));
        assert_eq!(row.get_text("name"), None);
        assert_eq!(row.get_i64("name"), None);
        assert_eq!(row.get_f64("score"), Some(3.0));
    }

    #[test]
    fn iterates_rows_in_order() {
        let result = sample();
        assert!(result.row_ref(2).is_none());
        let ids: Vec<i64> = result
            .row_refs()
            .filter_map(|row| row.get_i64("id"))
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
