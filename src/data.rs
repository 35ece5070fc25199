//! # Data Loading and Validation Module
//!
//! This module is the exclusive entry point for user-provided CSV files. It
//! reads header-carrying CSV, checks the file against the fixed column
//! schema, and runs every row through field validation before anything
//! downstream sees it.
//!
//! - Strict schema: column names are not configurable. The loader requires
//!   `age`, `job`, ..., `campaign` (plus `deposit` for training) and ignores
//!   any extra columns.
//! - User-centric errors: failures are assumed to be user-input errors. The
//!   `DataError` enum reports the offending row (1-based, header excluded)
//!   and column wherever it can.
//! - No imputation: a row that fails validation rejects the whole file
//!   rather than being silently dropped.

use crate::schema::{self, RawRecord, Record, ValidationError};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Columns every input file must carry, in any order.
const BASE_COLUMNS: [&str; 10] = [
    "age",
    "job",
    "marital",
    "education",
    "balance",
    "housing",
    "loan",
    "contact",
    "month",
    "campaign",
];
/// Label column, required for training only.
const LABEL_COLUMN: &str = "deposit";

/// Validated rows with their 0/1 labels, ready for fitting or evaluation.
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub records: Vec<Record>,
    pub labels: Array1<f64>,
}

/// The two sides of a stratified train/test split.
#[derive(Debug)]
pub struct SplitData {
    pub train: TrainingData,
    pub test: TrainingData,
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Error from the underlying CSV reader: {0}")]
    CsvError(#[from] csv::Error),

    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),

    #[error("Row {row}, column '{column}': expected 'yes' or 'no', found '{found}'.")]
    InvalidYesNo {
        row: usize,
        column: &'static str,
        found: String,
    },

    #[error("Row {row} was rejected: {source}")]
    InvalidRow {
        row: usize,
        source: ValidationError,
    },

    #[error(
        "Input file contains only {found} data rows, but at least {required} are required to train."
    )]
    InsufficientRows { found: usize, required: usize },

    #[error("The input file contains no data rows.")]
    Empty,
}

/// Loads and validates a labeled file for model training.
pub fn load_training_data(path: &Path) -> Result<TrainingData, DataError> {
    let loaded = internal::load_rows(path, true)?;
    let found = loaded.records.len();
    if found < internal::MINIMUM_TRAINING_ROWS {
        return Err(DataError::InsufficientRows {
            found,
            required: internal::MINIMUM_TRAINING_ROWS,
        });
    }
    // This unwrap is safe because we passed `include_label: true`.
    let labels = loaded.labels.unwrap();
    Ok(TrainingData {
        records: loaded.records,
        labels,
    })
}

/// Loads and validates an unlabeled file for batch prediction. A `deposit`
/// column, if present, is ignored.
pub fn load_prediction_data(path: &Path) -> Result<Vec<Record>, DataError> {
    let loaded = internal::load_rows(path, false)?;
    if loaded.records.is_empty() {
        return Err(DataError::Empty);
    }
    Ok(loaded.records)
}

/// Splits per class so both sides keep the original label mix: each class is
/// shuffled with its own slice of the seeded RNG stream and the rounded test
/// share is taken from it. A class with fewer than two rows stays entirely in
/// the training side. Row order within each side follows the input file.
pub fn stratified_split(data: TrainingData, test_fraction: f64, seed: u64) -> SplitData {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut test_indices: HashSet<usize> = HashSet::new();
    for class in [0.0, 1.0] {
        let mut class_indices: Vec<usize> = (0..data.records.len())
            .filter(|&i| data.labels[i] == class)
            .collect();
        class_indices.shuffle(&mut rng);
        let take = test_count(class_indices.len(), test_fraction);
        test_indices.extend(class_indices.into_iter().take(take));
    }

    let mut train_records = Vec::new();
    let mut train_labels = Vec::new();
    let mut test_records = Vec::new();
    let mut test_labels = Vec::new();
    for (i, record) in data.records.iter().enumerate() {
        if test_indices.contains(&i) {
            test_records.push(*record);
            test_labels.push(data.labels[i]);
        } else {
            train_records.push(*record);
            train_labels.push(data.labels[i]);
        }
    }

    SplitData {
        train: TrainingData {
            records: train_records,
            labels: Array1::from_vec(train_labels),
        },
        test: TrainingData {
            records: test_records,
            labels: Array1::from_vec(test_labels),
        },
    }
}

fn test_count(class_size: usize, test_fraction: f64) -> usize {
    if class_size < 2 {
        return 0;
    }
    let ideal = (class_size as f64 * test_fraction).round() as usize;
    // Both sides keep at least one row of the class.
    ideal.clamp(1, class_size - 1)
}

/// Internal module for shared row loading logic.
mod internal {
    use super::*;

    pub(super) const MINIMUM_TRAINING_ROWS: usize = 20;

    /// Raw CSV row as serde sees it. Strings stay untyped here; coercion and
    /// range checks happen against the schema afterwards.
    #[derive(Debug, Deserialize)]
    struct CsvRow {
        age: i64,
        job: String,
        marital: String,
        education: String,
        balance: f64,
        housing: String,
        loan: String,
        contact: String,
        month: String,
        campaign: i64,
        #[serde(default)]
        deposit: Option<String>,
    }

    pub(super) struct LoadedRows {
        pub records: Vec<Record>,
        pub labels: Option<Array1<f64>>,
    }

    /// The single, unified row loading function behind both public loaders.
    pub(super) fn load_rows(path: &Path, include_label: bool) -> Result<LoadedRows, DataError> {
        let file = File::open(path)?;
        let mut reader = csv::Reader::from_reader(file);

        let headers = reader.headers()?.clone();
        let mut required: Vec<&str> = BASE_COLUMNS.to_vec();
        if include_label {
            required.push(LABEL_COLUMN);
        }
        for column in required {
            if !headers.iter().any(|h| h == column) {
                return Err(DataError::ColumnNotFound(column.to_string()));
            }
        }

        let mut records = Vec::new();
        let mut labels = if include_label { Some(Vec::new()) } else { None };
        for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
            let row_number = index + 1;
            let row = result?;

            let raw = RawRecord {
                age: row.age,
                job: row.job,
                marital: row.marital,
                education: row.education,
                balance: row.balance,
                housing: yes_no(&row.housing, row_number, "housing")?,
                loan: yes_no(&row.loan, row_number, "loan")?,
                contact: row.contact,
                month: row.month,
                campaign: row.campaign,
            };
            let record = schema::validate(&raw)
                .map_err(|source| DataError::InvalidRow {
                    row: row_number,
                    source,
                })?;

            if let Some(labels) = labels.as_mut() {
                let value = row.deposit.as_deref().unwrap_or("");
                let positive = yes_no(value, row_number, "deposit")?;
                labels.push(if positive { 1.0 } else { 0.0 });
            }
            records.push(record);
        }

        Ok(LoadedRows {
            records,
            labels: labels.map(Array1::from_vec),
        })
    }

    /// Exact-match coercion; the source data is lowercase and anything else
    /// is treated as a data error, consistent with category handling.
    fn yes_no(value: &str, row: usize, column: &'static str) -> Result<bool, DataError> {
        match value {
            "yes" => Ok(true),
            "no" => Ok(false),
            other => Err(DataError::InvalidYesNo {
                row,
                column,
                found: other.to_string(),
            }),
        }
    }
}
