use crate::core::error::DataError;
use crate::core::types::Time;
use crate::core::values::Value;
use serde::Serialize;
use std::collections::HashMap;

/// Name of the mandatory first column
pub const TIME_COLUMN: &str = "time";

/// One row of a matrix. Cells are `None` when nothing was observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixRow {
    time: Time,
    cells: Vec<Option<Value>>,
}

impl MatrixRow {
    pub fn time(&self) -> Time {
        self.time
    }

    /// Cell of a value column; `None` marks a missing sample
    pub fn cell(&self, column: usize) -> Option<&Value> {
        self.cells.get(column).and_then(Option::as_ref)
    }
}

/// Time-indexed observation table.
///
/// Columns are `time` followed by one column per observed port, in the
/// order they were added. Rows are strictly increasing in time; writing
/// again at the time of the last row updates that row in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Matrix {
    columns: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    rows: Vec<MatrixRow>,
}

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value column, returning its index. Adding an existing name is a no-op.
    pub fn add_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.index.get(name) {
            return *index;
        }
        let index = self.columns.len();
        self.columns.push(name.to_string());
        self.index.insert(name.to_string(), index);
        index
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// All column names, `time` first
    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(TIME_COLUMN)
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    /// Number of value columns (the time column excluded)
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[MatrixRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn last_time(&self) -> Option<Time> {
        self.rows.last().map(|row| row.time)
    }

    /// Write one sample.
    ///
    /// Appends a row when `time` is past the last row, updates the last row
    /// when equal, and refuses to go back in time.
    pub fn add_value(&mut self, time: Time, column: &str, value: Value) -> Result<(), DataError> {
        let column_index = self
            .column_index(column)
            .ok_or_else(|| DataError::UnknownColumn(column.to_string()))?;

        match self.rows.last() {
            Some(last) if time < last.time => {
                return Err(DataError::OutOfOrder {
                    time,
                    last: last.time,
                });
            }
            Some(last) if time == last.time => {}
            _ => self.rows.push(MatrixRow {
                time,
                cells: Vec::new(),
            }),
        }

        let width = self.columns.len();
        if let Some(row) = self.rows.last_mut() {
            if row.cells.len() < width {
                row.cells.resize(width, None);
            }
            row.cells[column_index] = Some(value);
        }
        Ok(())
    }

    /// Make sure a row exists at `time`, appending an empty one when `time`
    /// is past the last row
    pub fn ensure_row(&mut self, time: Time) -> Result<(), DataError> {
        match self.rows.last() {
            Some(last) if time < last.time => Err(DataError::OutOfOrder {
                time,
                last: last.time,
            }),
            Some(last) if time == last.time => Ok(()),
            _ => {
                self.rows.push(MatrixRow {
                    time,
                    cells: Vec::new(),
                });
                Ok(())
            }
        }
    }

    /// Value at a row for a column name; `None` if missing
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let column = self.column_index(column)?;
        self.rows.get(row)?.cell(column)
    }

    /// The whole column as optional values, one per row
    pub fn column(&self, name: &str) -> Option<Vec<Option<&Value>>> {
        let column = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row.cell(column)).collect())
    }

    pub fn times(&self) -> Vec<Time> {
        self.rows.iter().map(|row| row.time).collect()
    }

    /// Render as delimited text; missing cells are written as `NA`
    pub fn to_csv(&self, separator: char) -> String {
        let sep = separator.to_string();
        let mut out = self.column_names().join(&sep);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.time.to_string());
            for column in 0..self.columns.len() {
                out.push(separator);
                match row.cell(column) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => out.push_str("NA"),
                }
            }
            out.push('\n');
        }
        out
    }
}
