use std::fmt;

use serde::Deserialize;

use crate::{Result, Value, WarehouseError};

/// Wire encoding of one result cell: a single-key map from a type tag such
/// as `stringValue` or `isNull` to the scalar.
pub type WrappedValue = serde_json::Map<String, serde_json::Value>;

/// Statement status as reported by the warehouse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Submitted,
    Picked,
    Started,
    Running,
    Finished,
    Failed,
    Aborted,
    /// Any status string this crate does not know about. Treated as pending.
    #[serde(other)]
    Unknown,
}

/// The three outcomes the poll loop distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Finished,
    Failed,
}

impl QueryStatus {
    pub fn class(self) -> StatusClass {
        match self {
            Self::Finished => StatusClass::Finished,
            Self::Failed | Self::Aborted => StatusClass::Failed,
            _ => StatusClass::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.class() != StatusClass::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Picked => "PICKED",
            Self::Started => "STARTED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a statement returned by one status request.
#[derive(Clone, Debug, PartialEq)]
pub struct StatementDescription {
    pub id: String,
    pub status: QueryStatus,
    /// Error text; set when the status is FAILED or ABORTED.
    pub error: Option<String>,
    /// Whether the finished statement produced a result set.
    pub has_result_set: bool,
    pub result_rows: Option<i64>,
}

/// One page of statement results.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultPage {
    /// Column names in positional order.
    pub columns: Vec<String>,
    pub records: Vec<Vec<WrappedValue>>,
    /// Continuation token for the next page, if any.
    pub next_token: Option<String>,
}

/// Column-oriented query result.
///
/// Column order is the order reported by the warehouse, and every column
/// holds exactly [`TabularResult::num_rows`] values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TabularResult {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
}

impl TabularResult {
    /// A result with no columns and no rows, as produced by statements
    /// without a result set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a result from column-major data.
    pub fn from_columns(columns: Vec<String>, data: Vec<Vec<Value>>) -> Result<Self> {
        if columns.len() != data.len() {
            return Err(WarehouseError::Decode(format!(
                "column count mismatch: {} names, {} value columns",
                columns.len(),
                data.len()
            )));
        }
        if let Some(first) = data.first() {
            let rows = first.len();
            if let Some((index, col)) = data.iter().enumerate().find(|(_, c)| c.len() != rows) {
                return Err(WarehouseError::Decode(format!(
                    "column '{}' has {} values, expected {rows}",
                    columns[index],
                    col.len()
                )));
            }
        }
        Ok(Self { columns, data })
    }

    /// Builds a result from row-major data.
    pub fn from_rows<I>(columns: Vec<String>, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let mut data: Vec<Vec<Value>> = vec![Vec::new(); columns.len()];
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(WarehouseError::Decode(format!(
                    "row {index} has {} values, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in data.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Ok(Self { columns, data })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values of the first column with the given name.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        let index = self.columns.iter().position(|col| col == name)?;
        self.data.get(index).map(Vec::as_slice)
    }

    pub fn column_at(&self, index: usize) -> Option<&[Value]> {
        self.data.get(index).map(Vec::as_slice)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Returns a cell by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column)?.get(row)
    }

    /// Returns one row in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.num_rows() {
            return None;
        }
        Some(self.data.iter().map(|col| &col[index]).collect())
    }

    /// Iterates rows in order, each in column order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        (0..self.num_rows()).map(move |index| self.data.iter().map(|col| &col[index]).collect())
    }

    pub fn into_columns(self) -> Vec<(String, Vec<Value>)> {
        self.columns.into_iter().zip(self.data).collect()
    }
}
