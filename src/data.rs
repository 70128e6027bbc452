//! The tabular subject dataset consumed by the training core.
//!
//! `Frame` is a lightweight named-column numeric table: a subject/scan id
//! index, column names, and an `ndarray` value matrix, with a side set of
//! columns flagged categorical (integer-coded). It supports the row/column
//! selection the pipeline steps need and a CSV round-trip for the persisted
//! artifacts. Column lookups by name fail with the offending column rather
//! than silently truncating.

use std::collections::BTreeSet;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};

use crate::error::PredageError;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: Vec<i64>,
    columns: Vec<String>,
    values: Array2<f64>,
    categorical: BTreeSet<String>,
}

impl Frame {
    pub fn new(
        index: Vec<i64>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, PredageError> {
        if values.nrows() != index.len() {
            return Err(PredageError::LengthMismatch {
                expected: values.nrows(),
                got: index.len(),
            });
        }
        if values.ncols() != columns.len() {
            return Err(PredageError::LengthMismatch {
                expected: values.ncols(),
                got: columns.len(),
            });
        }
        let unique: BTreeSet<&String> = columns.iter().collect();
        if unique.len() != columns.len() {
            return Err(PredageError::ShapeMismatch(
                "duplicate column names".to_string(),
            ));
        }
        Ok(Frame {
            index,
            columns,
            values,
            categorical: BTreeSet::new(),
        })
    }

    /// A one-row frame, as produced by the weight extractor.
    pub fn single_row(columns: Vec<String>, values: Vec<f64>) -> Result<Self, PredageError> {
        let n = values.len();
        let values = Array2::from_shape_vec((1, n), values)
            .map_err(|e| PredageError::ShapeMismatch(e.to_string()))?;
        Frame::new(vec![0], columns, values)
    }

    /// Build a frame from per-row records.
    pub fn from_rows(
        index: Vec<i64>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, PredageError> {
        let ncols = columns.len();
        let nrows = rows.len();
        let mut flat = Vec::with_capacity(nrows * ncols);
        for row in &rows {
            if row.len() != ncols {
                return Err(PredageError::LengthMismatch {
                    expected: ncols,
                    got: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let values = Array2::from_shape_vec((nrows, ncols), flat)
            .map_err(|e| PredageError::ShapeMismatch(e.to_string()))?;
        Frame::new(index, columns, values)
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn col_position(&self, name: &str) -> Result<usize, PredageError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PredageError::MissingColumn(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<Array1<f64>, PredageError> {
        let pos = self.col_position(name)?;
        Ok(self.values.column(pos).to_owned())
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.values[(row, col)] = value;
    }

    pub fn set_column(&mut self, name: &str, values: Array1<f64>) -> Result<(), PredageError> {
        let pos = self.col_position(name)?;
        if values.len() != self.nrows() {
            return Err(PredageError::LengthMismatch {
                expected: self.nrows(),
                got: values.len(),
            });
        }
        self.values.column_mut(pos).assign(&values);
        Ok(())
    }

    pub fn push_column(&mut self, name: &str, values: Array1<f64>) -> Result<(), PredageError> {
        if self.has_column(name) {
            return Err(PredageError::ShapeMismatch(format!(
                "column '{}' already exists",
                name
            )));
        }
        if values.len() != self.nrows() {
            return Err(PredageError::LengthMismatch {
                expected: self.nrows(),
                got: values.len(),
            });
        }
        self.values
            .push_column(values.view())
            .map_err(|e| PredageError::ShapeMismatch(e.to_string()))?;
        self.columns.push(name.to_string());
        Ok(())
    }

    pub fn mark_categorical(&mut self, name: &str) -> Result<(), PredageError> {
        self.col_position(name)?;
        self.categorical.insert(name.to_string());
        Ok(())
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.categorical.contains(name)
    }

    /// Select rows by position, keeping row order as given.
    pub fn select_rows(&self, rows: &[usize]) -> Frame {
        Frame {
            index: rows.iter().map(|&i| self.index[i]).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), rows),
            categorical: self.categorical.clone(),
        }
    }

    /// Select columns by name, preserving the requested order.
    pub fn select_columns(&self, names: &[String]) -> Result<Frame, PredageError> {
        let positions = names
            .iter()
            .map(|n| self.col_position(n))
            .collect::<Result<Vec<_>, _>>()?;
        let values = self.values.select(Axis(1), &positions);
        let categorical = self
            .categorical
            .iter()
            .filter(|c| names.contains(c))
            .cloned()
            .collect();
        Ok(Frame {
            index: self.index.clone(),
            columns: names.to_vec(),
            values,
            categorical,
        })
    }

    /// Drop the named columns; names absent from the frame are ignored.
    pub fn drop_columns(&self, names: &[String]) -> Frame {
        let kept: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !names.contains(c))
            .cloned()
            .collect();
        self.select_columns(&kept)
            .expect("kept columns are a subset of existing columns")
    }

    pub fn to_csv(&self, path: &Path) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut header = vec!["id".to_string()];
        header.extend(self.columns.iter().cloned());
        writer.write_record(&header)?;
        for (i, row) in self.values.axis_iter(Axis(0)).enumerate() {
            let mut record = vec![self.index[i].to_string()];
            record.extend(row.iter().map(|v| format!("{}", v)));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn from_csv(path: &Path) -> anyhow::Result<Frame> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
        let mut index = Vec::new();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let id = record
                .get(0)
                .ok_or_else(|| anyhow::anyhow!("empty record in {}", path.display()))?
                .parse::<i64>()?;
            index.push(id);
            let row: Vec<f64> = record
                .iter()
                .skip(1)
                .map(|field| field.parse::<f64>())
                .collect::<Result<_, _>>()?;
            rows.push(row);
        }
        Ok(Frame::from_rows(index, columns, rows)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_frame() -> Frame {
        Frame::new(
            vec![10, 11, 12],
            vec!["pet_a".to_string(), "pet_b".to_string(), "age".to_string()],
            array![[1.0, 2.0, 60.0], [3.0, 4.0, 62.0], [5.0, 6.0, 64.0]],
        )
        .unwrap()
    }

    #[test]
    fn column_lookup_and_selection() {
        let frame = sample_frame();
        assert_eq!(frame.column("pet_b").unwrap(), array![2.0, 4.0, 6.0]);

        let sub = frame.select_rows(&[2, 0]);
        assert_eq!(sub.index(), &[12, 10]);
        assert_eq!(sub.column("age").unwrap(), array![64.0, 60.0]);

        let cols = frame
            .select_columns(&["age".to_string(), "pet_a".to_string()])
            .unwrap();
        assert_eq!(cols.columns(), &["age".to_string(), "pet_a".to_string()]);
        assert_eq!(cols.values().column(0).to_owned(), array![60.0, 62.0, 64.0]);
    }

    #[test]
    fn missing_column_is_explicit() {
        let frame = sample_frame();
        let err = frame.column("mri_a").unwrap_err();
        assert!(err.to_string().contains("mri_a"));
    }

    #[test]
    fn duplicate_columns_rejected() {
        let result = Frame::new(
            vec![0, 1],
            vec!["a".to_string(), "a".to_string()],
            array![[1.0, 2.0], [3.0, 4.0]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn push_column_appends() {
        let mut frame = sample_frame();
        frame
            .push_column("tracer", array![1.0, 0.0, 1.0])
            .unwrap();
        assert_eq!(frame.ncols(), 4);
        assert_eq!(frame.column("tracer").unwrap(), array![1.0, 0.0, 1.0]);
    }

    #[test]
    fn csv_round_trip() {
        let frame = sample_frame();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.csv");
        frame.to_csv(&path).unwrap();
        let reloaded = Frame::from_csv(&path).unwrap();
        assert_eq!(reloaded, frame);
    }
}
