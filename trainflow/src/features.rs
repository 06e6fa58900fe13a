//! Feature table loading and fold partitioning.
//!
//! Datasets arrive as CSV files with a header row: one row-identity
//! column, one label column, and any number of numeric feature columns.
//! Excluded columns are dropped before the matrix is built; an exclusion
//! naming a column that does not exist is ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or slicing a feature table.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The dataset file could not be opened or parsed.
    #[error("failed to read dataset {path}: {source}")]
    Read {
        /// The dataset path.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// A required column is not present in the header.
    #[error("column '{column}' not found in dataset")]
    MissingColumn {
        /// The missing column name.
        column: String,
    },

    /// A cell failed to parse as a number.
    #[error("row {row}, column '{column}': '{value}' is not numeric")]
    BadValue {
        /// Zero-based data row index.
        row: usize,
        /// The column name.
        column: String,
        /// The offending cell content.
        value: String,
    },

    /// A fold references a row outside the dataset.
    #[error("partition references row {index} outside dataset of {len} rows")]
    IndexOutOfRange {
        /// The out-of-range row index.
        index: usize,
        /// The dataset row count.
        len: usize,
    },
}

/// An in-memory numeric feature table with its target labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
    targets: Vec<f64>,
    row_ids: Vec<String>,
}

impl FeatureTable {
    /// Loads a feature table from a CSV file on disk.
    pub fn from_csv_path(
        path: &Path,
        index_column: &str,
        target_column: &str,
        exclude_columns: &BTreeSet<String>,
    ) -> Result<Self, FeatureError> {
        let reader = csv::Reader::from_path(path).map_err(|source| FeatureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(reader, path, index_column, target_column, exclude_columns)
    }

    /// Loads a feature table from any CSV reader.
    pub fn from_reader<R: Read>(
        reader: R,
        index_column: &str,
        target_column: &str,
        exclude_columns: &BTreeSet<String>,
    ) -> Result<Self, FeatureError> {
        let reader = csv::Reader::from_reader(reader);
        Self::from_csv_reader(
            reader,
            Path::new("<memory>"),
            index_column,
            target_column,
            exclude_columns,
        )
    }

    fn from_csv_reader<R: Read>(
        mut reader: csv::Reader<R>,
        path: &Path,
        index_column: &str,
        target_column: &str,
        exclude_columns: &BTreeSet<String>,
    ) -> Result<Self, FeatureError> {
        let headers = reader
            .headers()
            .map_err(|source| FeatureError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .clone();

        let index_pos = position_of(&headers, index_column)?;
        let target_pos = position_of(&headers, target_column)?;

        let mut feature_positions = Vec::new();
        let mut feature_names = Vec::new();
        for (pos, name) in headers.iter().enumerate() {
            if pos == index_pos || pos == target_pos || exclude_columns.contains(name) {
                continue;
            }
            feature_positions.push(pos);
            feature_names.push(name.to_string());
        }

        let mut rows = Vec::new();
        let mut targets = Vec::new();
        let mut row_ids = Vec::new();

        for (row_index, record) in reader.records().enumerate() {
            let record = record.map_err(|source| FeatureError::Read {
                path: path.to_path_buf(),
                source,
            })?;

            row_ids.push(record.get(index_pos).unwrap_or_default().to_string());
            targets.push(parse_cell(&record, target_pos, target_column, row_index)?);

            let mut row = Vec::with_capacity(feature_positions.len());
            for (&pos, name) in feature_positions.iter().zip(&feature_names) {
                row.push(parse_cell(&record, pos, name, row_index)?);
            }
            rows.push(row);
        }

        Ok(Self {
            feature_names,
            rows,
            targets,
            row_ids,
        })
    }

    /// Returns the number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the feature column names in table order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Returns the identity values of the index column.
    #[must_use]
    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    /// Returns the full feature matrix.
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Returns the full target vector.
    #[must_use]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Selects the feature rows and targets at the given indices.
    pub fn select(&self, indices: &[usize]) -> Result<(Vec<Vec<f64>>, Vec<f64>), FeatureError> {
        let mut features = Vec::with_capacity(indices.len());
        let mut targets = Vec::with_capacity(indices.len());
        for &index in indices {
            let row = self
                .rows
                .get(index)
                .ok_or(FeatureError::IndexOutOfRange {
                    index,
                    len: self.rows.len(),
                })?;
            features.push(row.clone());
            targets.push(self.targets[index]);
        }
        Ok((features, targets))
    }
}

fn position_of(headers: &csv::StringRecord, column: &str) -> Result<usize, FeatureError> {
    headers
        .iter()
        .position(|name| name == column)
        .ok_or_else(|| FeatureError::MissingColumn {
            column: column.to_string(),
        })
}

fn parse_cell(
    record: &csv::StringRecord,
    pos: usize,
    column: &str,
    row: usize,
) -> Result<f64, FeatureError> {
    let value = record.get(pos).unwrap_or_default();
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| FeatureError::BadValue {
            row,
            column: column.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CSV: &str = "\
id,height,weight,notes,label
a,1.0,10.0,7,0
b,2.0,20.0,7,1
c,3.0,30.0,7,1
d,4.0,40.0,7,0
";

    fn load(exclude: &[&str]) -> FeatureTable {
        let exclude: BTreeSet<String> = exclude.iter().map(|s| (*s).to_string()).collect();
        FeatureTable::from_reader(CSV.as_bytes(), "id", "label", &exclude).unwrap()
    }

    #[test]
    fn test_loads_features_and_targets() {
        let table = load(&[]);

        assert_eq!(table.len(), 4);
        assert_eq!(table.feature_names(), &["height", "weight", "notes"]);
        assert_eq!(table.targets(), &[0.0, 1.0, 1.0, 0.0]);
        assert_eq!(table.row_ids(), &["a", "b", "c", "d"]);
    }

    #[test]
    fn test_excluded_columns_are_dropped() {
        let table = load(&["notes"]);

        assert_eq!(table.feature_names(), &["height", "weight"]);
        assert_eq!(table.features()[1], vec![2.0, 20.0]);
    }

    #[test]
    fn test_unknown_excluded_column_is_ignored() {
        let table = load(&["does-not-exist"]);
        assert_eq!(table.feature_names(), &["height", "weight", "notes"]);
    }

    #[test]
    fn test_missing_target_column() {
        let err =
            FeatureTable::from_reader(CSV.as_bytes(), "id", "outcome", &BTreeSet::new())
                .unwrap_err();
        assert!(matches!(err, FeatureError::MissingColumn { column } if column == "outcome"));
    }

    #[test]
    fn test_non_numeric_cell() {
        let csv = "id,x,label\na,oops,0\n";
        let err = FeatureTable::from_reader(csv.as_bytes(), "id", "label", &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, FeatureError::BadValue { row: 0, .. }));
    }

    #[test]
    fn test_select_partitions_rows() {
        let table = load(&["notes"]);
        let (features, targets) = table.select(&[2, 0]).unwrap();

        assert_eq!(features, vec![vec![3.0, 30.0], vec![1.0, 10.0]]);
        assert_eq!(targets, vec![1.0, 0.0]);
    }

    #[test]
    fn test_select_out_of_range() {
        let table = load(&[]);
        let err = table.select(&[9]).unwrap_err();
        assert!(matches!(err, FeatureError::IndexOutOfRange { index: 9, len: 4 }));
    }
}
