//! # Preprocessing Pipeline
//!
//! Deterministic mapping from a validated [`Record`] to the fixed-width
//! feature vector the classifier consumes. All data-dependent state (category
//! lists, scale factors) is discovered once during training, frozen into the
//! serialized artifact, and replayed unchanged at prediction time; `transform`
//! never recomputes statistics from incoming requests.
//!
//! Column layout, in order: one-hot blocks for job, marital, education,
//! contact, month (categories sorted lexicographically within each block),
//! then age, balance, campaign divided by their frozen scale factors, then
//! housing and loan as 0/1. A category value absent from the frozen list
//! encodes as an all-zero block rather than an error.

use crate::schema::Record;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Categorical fields in frozen block order.
pub const CATEGORICAL_FIELDS: [&str; 5] = ["job", "marital", "education", "contact", "month"];
/// Numeric fields in frozen column order.
pub const NUMERIC_FIELDS: [&str; 3] = ["age", "balance", "campaign"];
/// Boolean passthrough fields in frozen column order.
pub const BOOLEAN_FIELDS: [&str; 2] = ["housing", "loan"];

/// The frozen one-hot column list for one categorical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBlock {
    pub field: String,
    /// Category values observed in training data, sorted lexicographically.
    pub categories: Vec<String>,
}

impl CategoryBlock {
    fn observe<'a>(field: &str, values: impl Iterator<Item = &'a str>) -> Self {
        let unique: BTreeSet<&str> = values.collect();
        Self {
            field: field.to_string(),
            categories: unique.into_iter().map(String::from).collect(),
        }
    }
}

/// The frozen scale factor for one numeric field.
///
/// The factor is the population standard deviation of the training values;
/// transformation divides by it without centering, so a zero balance stays
/// zero. A degenerate (zero-variance) column keeps a factor of 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScale {
    pub field: String,
    pub scale: f64,
}

impl NumericScale {
    fn observe(field: &str, values: impl Iterator<Item = f64>) -> Self {
        let values: Vec<f64> = values.collect();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let std = variance.sqrt();
        Self {
            field: field.to_string(),
            scale: if std > 0.0 { std } else { 1.0 },
        }
    }
}

/// Inconsistencies in a frozen preprocessor layout, detected when an artifact
/// is loaded from disk.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("expected categorical blocks {expected:?} in order, found {found:?}")]
    UnexpectedBlocks {
        expected: Vec<&'static str>,
        found: Vec<String>,
    },
    #[error("categorical block '{0}' has no categories")]
    EmptyBlock(String),
    #[error("categorical block '{0}' must list categories in strictly increasing order")]
    UnsortedBlock(String),
    #[error("expected numeric scales {expected:?} in order, found {found:?}")]
    UnexpectedScales {
        expected: Vec<&'static str>,
        found: Vec<String>,
    },
    #[error("scale factor for '{field}' must be positive and finite, found {value}")]
    InvalidScale { field: String, value: f64 },
}

/// The fitted preprocessing pipeline: the single implementation shared by
/// training evaluation and serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub blocks: Vec<CategoryBlock>,
    pub scales: Vec<NumericScale>,
}

impl FittedPreprocessor {
    /// Discovers category lists and scale factors from training records and
    /// freezes the output column layout.
    ///
    /// The per-field order here and in [`Self::transform`] is the column
    /// contract; both must stay in lockstep.
    pub fn fit(records: &[Record]) -> Self {
        let blocks = vec![
            CategoryBlock::observe("job", records.iter().map(|r| r.job.as_str())),
            CategoryBlock::observe("marital", records.iter().map(|r| r.marital.as_str())),
            CategoryBlock::observe("education", records.iter().map(|r| r.education.as_str())),
            CategoryBlock::observe("contact", records.iter().map(|r| r.contact.as_str())),
            CategoryBlock::observe("month", records.iter().map(|r| r.month.as_str())),
        ];
        let scales = vec![
            NumericScale::observe("age", records.iter().map(|r| f64::from(r.age))),
            NumericScale::observe("balance", records.iter().map(|r| r.balance)),
            NumericScale::observe("campaign", records.iter().map(|r| f64::from(r.campaign))),
        ];
        Self { blocks, scales }
    }

    /// Number of columns in the encoded vector. Fixed once fitting completes.
    pub fn width(&self) -> usize {
        let one_hot: usize = self.blocks.iter().map(|b| b.categories.len()).sum();
        one_hot + self.scales.len() + BOOLEAN_FIELDS.len()
    }

    /// Encodes one record into the frozen column layout.
    ///
    /// Pure and idempotent; the output length always equals [`Self::width`],
    /// regardless of which categories the record holds.
    pub fn transform(&self, record: &Record) -> Array1<f64> {
        let mut out = Array1::zeros(self.width());
        let mut offset = 0;

        for (block, value) in self.blocks.iter().zip(categorical_values(record)) {
            // Unseen categories resolve to "no column": the block stays zero.
            if let Some(idx) = block.categories.iter().position(|c| c == value) {
                out[offset + idx] = 1.0;
            }
            offset += block.categories.len();
        }

        for (scale, value) in self.scales.iter().zip(numeric_values(record)) {
            out[offset] = value / scale.scale;
            offset += 1;
        }

        out[offset] = if record.housing { 1.0 } else { 0.0 };
        out[offset + 1] = if record.loan { 1.0 } else { 0.0 };
        out
    }

    /// Encodes a batch of records row-parallel into an `[n, width]` matrix.
    pub fn transform_batch(&self, records: &[Record]) -> Array2<f64> {
        let rows: Vec<Array1<f64>> = records.par_iter().map(|r| self.transform(r)).collect();
        let mut out = Array2::zeros((records.len(), self.width()));
        for (i, row) in rows.into_iter().enumerate() {
            out.row_mut(i).assign(&row);
        }
        out
    }

    /// Column names in output order, `job_admin.`-style for one-hot columns.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width());
        for block in &self.blocks {
            for category in &block.categories {
                names.push(format!("{}_{}", block.field, category));
            }
        }
        for scale in &self.scales {
            names.push(scale.field.clone());
        }
        names.extend(BOOLEAN_FIELDS.iter().map(|f| f.to_string()));
        names
    }

    /// Checks that a deserialized layout matches the contract `transform`
    /// assumes. Called when an artifact is loaded.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.blocks.len() != CATEGORICAL_FIELDS.len()
            || self
                .blocks
                .iter()
                .zip(CATEGORICAL_FIELDS)
                .any(|(block, field)| block.field != field)
        {
            return Err(EncodeError::UnexpectedBlocks {
                expected: CATEGORICAL_FIELDS.to_vec(),
                found: self.blocks.iter().map(|b| b.field.clone()).collect(),
            });
        }
        for block in &self.blocks {
            if block.categories.is_empty() {
                return Err(EncodeError::EmptyBlock(block.field.clone()));
            }
            if block.categories.windows(2).any(|w| w[0] >= w[1]) {
                return Err(EncodeError::UnsortedBlock(block.field.clone()));
            }
        }

        if self.scales.len() != NUMERIC_FIELDS.len()
            || self
                .scales
                .iter()
                .zip(NUMERIC_FIELDS)
                .any(|(scale, field)| scale.field != field)
        {
            return Err(EncodeError::UnexpectedScales {
                expected: NUMERIC_FIELDS.to_vec(),
                found: self.scales.iter().map(|s| s.field.clone()).collect(),
            });
        }
        for scale in &self.scales {
            if !(scale.scale.is_finite() && scale.scale > 0.0) {
                return Err(EncodeError::InvalidScale {
                    field: scale.field.clone(),
                    value: scale.scale,
                });
            }
        }
        Ok(())
    }
}

fn categorical_values(record: &Record) -> [&'static str; 5] {
    [
        record.job.as_str(),
        record.marital.as_str(),
        record.education.as_str(),
        record.contact.as_str(),
        record.month.as_str(),
    ]
}

fn numeric_values(record: &Record) -> [f64; 3] {
    [
        f64::from(record.age),
        record.balance,
        f64::from(record.campaign),
    ]
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Contact, Education, Job, Marital, Month};
    use approx::assert_abs_diff_eq;

    fn base_record() -> Record {
        Record {
            age: 30,
            job: Job::Technician,
            marital: Marital::Single,
            education: Education::Tertiary,
            balance: 1000.0,
            housing: true,
            loan: false,
            contact: Contact::Cellular,
            month: Month::May,
            campaign: 1,
        }
    }

    fn training_records() -> Vec<Record> {
        let mut records = Vec::new();
        for i in 0..6u8 {
            let mut r = base_record();
            r.age = 25 + 5 * i;
            r.balance = 200.0 * f64::from(i);
            r.campaign = 1 + i;
            r.job = if i % 2 == 0 {
                Job::Technician
            } else {
                Job::Management
            };
            r.month = if i % 3 == 0 { Month::May } else { Month::Jul };
            r.housing = i % 2 == 0;
            records.push(r);
        }
        records
    }

    #[test]
    fn categories_are_discovered_sorted() {
        let mut records = training_records();
        records[0].job = Job::Student;
        records[1].job = Job::Admin;
        let fitted = FittedPreprocessor::fit(&records);
        assert_eq!(fitted.blocks[0].field, "job");
        assert_eq!(
            fitted.blocks[0].categories,
            vec!["admin.", "management", "student", "technician"]
        );
    }

    #[test]
    fn width_is_fixed_and_matches_feature_names() {
        let fitted = FittedPreprocessor::fit(&training_records());
        // job {management, technician}, marital {single}, education {tertiary},
        // contact {cellular}, month {jul, may} = 7 one-hot columns.
        assert_eq!(fitted.width(), 7 + 3 + 2);
        let names = fitted.feature_names();
        assert_eq!(names.len(), fitted.width());
        assert_eq!(names[0], "job_management");
        assert_eq!(names[1], "job_technician");
        assert_eq!(names[7], "age");
        assert_eq!(names[8], "balance");
        assert_eq!(names[9], "campaign");
        assert_eq!(names[10], "housing");
        assert_eq!(names[11], "loan");
    }

    #[test]
    fn unseen_category_encodes_as_zero_block() {
        let fitted = FittedPreprocessor::fit(&training_records());
        let mut record = base_record();
        record.job = Job::Housemaid;
        let encoded = fitted.transform(&record);
        assert_eq!(encoded.len(), fitted.width());
        // The job block is the first two columns; both must be zero.
        assert_eq!(encoded[0], 0.0);
        assert_eq!(encoded[1], 0.0);
        // The rest of the record still encodes normally.
        assert_eq!(encoded[2], 1.0, "marital_single");
    }

    #[test]
    fn scaling_divides_by_population_std_without_centering() {
        let records = training_records();
        let fitted = FittedPreprocessor::fit(&records);

        let ages: Vec<f64> = records.iter().map(|r| f64::from(r.age)).collect();
        let n = ages.len() as f64;
        let mean = ages.iter().sum::<f64>() / n;
        let std = (ages.iter().map(|a| (a - mean) * (a - mean)).sum::<f64>() / n).sqrt();

        let encoded = fitted.transform(&records[0]);
        let age_col = fitted.width() - 5;
        assert_abs_diff_eq!(encoded[age_col], f64::from(records[0].age) / std, epsilon = 1e-12);
    }

    #[test]
    fn zero_variance_column_keeps_scale_one() {
        let records = vec![base_record(); 4];
        let fitted = FittedPreprocessor::fit(&records);
        assert_eq!(fitted.scales[0].field, "age");
        assert_eq!(fitted.scales[0].scale, 1.0);
        let encoded = fitted.transform(&records[0]);
        let age_col = fitted.width() - 5;
        assert_eq!(encoded[age_col], 30.0);
    }

    #[test]
    fn booleans_pass_through_as_last_columns() {
        let fitted = FittedPreprocessor::fit(&training_records());
        let mut record = base_record();
        record.housing = true;
        record.loan = false;
        let encoded = fitted.transform(&record);
        let w = fitted.width();
        assert_eq!(encoded[w - 2], 1.0);
        assert_eq!(encoded[w - 1], 0.0);

        record.housing = false;
        record.loan = true;
        let encoded = fitted.transform(&record);
        assert_eq!(encoded[w - 2], 0.0);
        assert_eq!(encoded[w - 1], 1.0);
    }

    #[test]
    fn transform_is_deterministic() {
        let fitted = FittedPreprocessor::fit(&training_records());
        let record = base_record();
        assert_eq!(fitted.transform(&record), fitted.transform(&record));
    }

    #[test]
    fn batch_matches_single_row_transforms() {
        let records = training_records();
        let fitted = FittedPreprocessor::fit(&records);
        let batch = fitted.transform_batch(&records);
        assert_eq!(batch.shape(), &[records.len(), fitted.width()]);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(batch.row(i).to_owned(), fitted.transform(record));
        }
    }

    #[test]
    fn validate_accepts_a_fitted_layout() {
        let fitted = FittedPreprocessor::fit(&training_records());
        assert!(fitted.validate().is_ok());
    }

    #[test]
    fn validate_rejects_tampered_layouts() {
        let fitted = FittedPreprocessor::fit(&training_records());

        let mut wrong_order = fitted.clone();
        wrong_order.blocks.swap(0, 1);
        assert!(matches!(
            wrong_order.validate(),
            Err(EncodeError::UnexpectedBlocks { .. })
        ));

        let mut empty = fitted.clone();
        empty.blocks[2].categories.clear();
        assert!(matches!(empty.validate(), Err(EncodeError::EmptyBlock(_))));

        let mut unsorted = fitted.clone();
        unsorted.blocks[0].categories.reverse();
        assert!(matches!(
            unsorted.validate(),
            Err(EncodeError::UnsortedBlock(_))
        ));

        let mut bad_scale = fitted.clone();
        bad_scale.scales[1].scale = 0.0;
        assert!(matches!(
            bad_scale.validate(),
            Err(EncodeError::InvalidScale { .. })
        ));
    }
}
