use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::value::Value;
use crate::error::{ConsolidatorError, Result};

/// One row viewed as a field-name → value mapping
pub type Row = BTreeMap<String, Value>;

/// A named column of cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Share of non-null cells; an empty column is fully incomplete.
    pub fn completeness(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        1.0 - self.null_count() as f64 / self.values.len() as f64
    }

    pub fn is_all_null(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }
}

/// Rectangular, column-oriented table with a dynamic column catalog.
///
/// Columns keep their insertion order; every column holds exactly
/// `row_count` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map(|c| c.values.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.values.len() != row_count) {
            return Err(ConsolidatorError::Validation(format!(
                "column '{}' has {} cells, expected {}",
                bad.name,
                bad.values.len(),
                row_count
            )));
        }
        let mut dataset = Self {
            columns: Vec::with_capacity(columns.len()),
            row_count,
        };
        for column in columns {
            dataset.set_column(column.name, column.values)?;
        }
        Ok(dataset)
    }

    /// Build from header + records, as produced by delimited-text readers.
    pub fn from_records(headers: &[String], records: Vec<Vec<Value>>) -> Self {
        let mut columns: Vec<Column> = headers
            .iter()
            .map(|h| Column::new(h.clone(), Vec::with_capacity(records.len())))
            .collect();
        let row_count = records.len();
        for mut record in records {
            record.resize(headers.len(), Value::Null);
            for (column, value) in columns.iter_mut().zip(record) {
                column.values.push(value);
            }
        }
        let mut dataset = Self {
            columns: Vec::new(),
            row_count,
        };
        for column in columns {
            // Duplicate headers: later ones overwrite earlier ones.
            let _ = dataset.set_column(column.name, column.values);
        }
        dataset
    }

    pub fn from_rows<I: IntoIterator<Item = Row>>(rows: I) -> Self {
        let mut dataset = Self::new();
        for row in rows {
            dataset.push_row(row);
        }
        dataset
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.position(name).map(|i| self.columns[i].values.as_slice())
    }

    pub fn column_entry(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<Value>> {
        let idx = self.position(name)?;
        Some(&mut self.columns[idx].values)
    }

    /// Insert or replace a column. The first column of an empty catalog fixes
    /// the row count.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        let name = name.into();
        if self.columns.is_empty() && self.row_count == 0 {
            self.row_count = values.len();
        }
        if values.len() != self.row_count {
            return Err(ConsolidatorError::Validation(format!(
                "column '{}' has {} cells, expected {}",
                name,
                values.len(),
                self.row_count
            )));
        }
        match self.position(&name) {
            Some(idx) => self.columns[idx].values = values,
            None => self.columns.push(Column::new(name, values)),
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<Value>> {
        let idx = self.position(name)?;
        Some(self.columns.remove(idx).values)
    }

    pub fn retain_columns<F: FnMut(&Column) -> bool>(&mut self, keep: F) {
        self.columns.retain(keep);
    }

    /// Move the named columns to the front in the given order; the rest keep
    /// their relative order.
    pub fn reorder_columns(&mut self, order: &[String]) {
        let mut front = Vec::new();
        for name in order {
            if let Some(idx) = self.position(name) {
                front.push(self.columns.remove(idx));
            }
        }
        front.append(&mut self.columns);
        self.columns = front;
    }

    pub fn row(&self, idx: usize) -> Option<Row> {
        if idx >= self.row_count {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|c| (c.name.clone(), c.values[idx].clone()))
                .collect(),
        )
    }

    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.row_count).filter_map(move |i| self.row(i))
    }

    /// Cells of one row in column order.
    pub fn row_values(&self, idx: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[idx]).collect()
    }

    /// Append a row; unseen fields become new columns back-filled with nulls.
    pub fn push_row(&mut self, mut row: Row) {
        for column in &mut self.columns {
            let value = row.remove(&column.name).unwrap_or(Value::Null);
            column.values.push(value);
        }
        for (name, value) in row {
            let mut values = vec![Value::Null; self.row_count];
            values.push(value);
            self.columns.push(Column::new(name, values));
        }
        self.row_count += 1;
    }

    /// Keep rows whose mask entry is `true`.
    pub fn retain_rows(&mut self, mask: &[bool]) {
        for column in &mut self.columns {
            let mut idx = 0;
            column.values.retain(|_| {
                let keep = mask.get(idx).copied().unwrap_or(true);
                idx += 1;
                keep
            });
        }
        self.row_count = (0..self.row_count)
            .filter(|i| mask.get(*i).copied().unwrap_or(true))
            .count();
    }

    /// Concatenate another dataset below this one, unioning the catalogs.
    pub fn append(&mut self, other: Dataset) {
        if self.columns.is_empty() && self.row_count == 0 {
            *self = other;
            return;
        }
        let other_rows = other.row_count;
        let mut incoming: BTreeMap<String, Vec<Value>> = other
            .columns
            .into_iter()
            .map(|c| (c.name, c.values))
            .collect();
        for column in &mut self.columns {
            match incoming.remove(&column.name) {
                Some(values) => column.values.extend(values),
                None => column
                    .values
                    .extend(std::iter::repeat(Value::Null).take(other_rows)),
            }
        }
        for (name, values) in incoming {
            let mut padded = vec![Value::Null; self.row_count];
            padded.extend(values);
            self.columns.push(Column::new(name, padded));
        }
        self.row_count += other_rows;
    }

    pub fn completeness(&self, name: &str) -> Option<f64> {
        self.column_entry(name).map(Column::completeness)
    }

    pub fn total_cells(&self) -> usize {
        self.row_count * self.columns.len()
    }

    pub fn null_cells(&self) -> usize {
        self.columns.iter().map(Column::null_count).sum()
    }

    /// Records as JSON objects, for the JSON exporter.
    pub fn to_json_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        (0..self.row_count)
            .map(|i| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[i].to_json()))
                    .collect()
            })
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}
