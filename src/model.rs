//! # Trained Artifact
//!
//! The serialized product of training: the fitted preprocessor, the logistic
//! coefficients, and the held-out evaluation numbers, stored together as one
//! TOML document so the serving path can never pair a classifier with the
//! wrong encoding. Loading validates the document before anything is allowed
//! to predict with it.

use crate::encode::{EncodeError, FittedPreprocessor};
use crate::metrics::EvaluationSummary;
use crate::schema::Record;
use chrono::{DateTime, Utc};
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Bumped whenever the artifact layout changes incompatibly.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// Fixed cut-off for the bare classifier decision. Serving clients may
/// re-threshold the returned probability themselves.
pub const DECISION_THRESHOLD: f64 = 0.5;

const ETA_LIMIT: f64 = 700.0;
const PROB_EPS: f64 = 1e-8;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("could not read or write artifact file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse artifact TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("failed to serialize artifact to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("unsupported artifact schema version {found} (this build reads version {expected})")]
    UnsupportedSchemaVersion { found: u32, expected: u32 },

    #[error("classifier holds {found} coefficients but the preprocessor produces {expected} columns")]
    MismatchedFeatureCount { found: usize, expected: usize },

    #[error("artifact preprocessor failed validation: {0}")]
    InvalidPreprocessor(#[from] EncodeError),

    #[error("artifact holds non-finite classifier coefficients")]
    NonFiniteCoefficients,
}

/// Intercept and per-column coefficients over the encoded feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
}

impl LogisticModel {
    /// Probability of the positive class for one encoded row. The linear
    /// predictor is clamped before the sigmoid and the output is kept inside
    /// the open unit interval.
    pub fn predict_proba(&self, features: &Array1<f64>) -> f64 {
        let eta = self.intercept + self.coefficients.dot(features);
        let eta = eta.clamp(-ETA_LIMIT, ETA_LIMIT);
        let proba = 1.0 / (1.0 + (-eta).exp());
        proba.clamp(PROB_EPS, 1.0 - PROB_EPS)
    }
}

/// One scored record: the hard class at [`DECISION_THRESHOLD`] and the raw
/// probability behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class: u8,
    pub proba_yes: f64,
}

/// Everything training produces, in the order the TOML document lays it out.
///
/// Scalar fields stay ahead of the table-valued ones so the serializer can
/// emit them at the document top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub schema_version: u32,
    pub trained_at: DateTime<Utc>,
    /// Seed of the train/test split the metrics were computed on.
    pub seed: u64,
    pub preprocessor: FittedPreprocessor,
    pub classifier: LogisticModel,
    pub metrics: EvaluationSummary,
}

impl TrainedArtifact {
    /// Serializes to pretty TOML and moves it into place atomically: the
    /// document is written to a temporary file in the destination directory
    /// and renamed over the target, so a crash mid-write never leaves a
    /// truncated artifact behind.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let serialized = toml::to_string_pretty(self)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)?;
                parent
            }
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(serialized.as_bytes())?;
        staged.persist(path).map_err(|e| ModelError::IoError(e.error))?;
        Ok(())
    }

    /// Reads and validates an artifact. A document that parses but fails
    /// validation is rejected here rather than surfacing as garbage
    /// predictions later.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path)?;
        let artifact: TrainedArtifact = toml::from_str(&content)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Structural checks: supported schema version, a coherent preprocessor
    /// layout, coefficient width matching that layout, and finite numbers.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(ModelError::UnsupportedSchemaVersion {
                found: self.schema_version,
                expected: ARTIFACT_SCHEMA_VERSION,
            });
        }
        self.preprocessor.validate()?;

        let expected = self.preprocessor.width();
        let found = self.classifier.coefficients.len();
        if found != expected {
            return Err(ModelError::MismatchedFeatureCount { found, expected });
        }
        if !self.classifier.intercept.is_finite()
            || !self.classifier.coefficients.iter().all(|c| c.is_finite())
        {
            return Err(ModelError::NonFiniteCoefficients);
        }
        Ok(())
    }

    /// Scores one validated record through the frozen preprocessor and the
    /// classifier.
    pub fn predict(&self, record: &Record) -> Prediction {
        let features = self.preprocessor.transform(record);
        let proba_yes = self.classifier.predict_proba(&features);
        Prediction {
            class: u8::from(proba_yes >= DECISION_THRESHOLD),
            proba_yes,
        }
    }

    /// Scores a batch row-parallel.
    pub fn predict_batch(&self, records: &[Record]) -> Vec<Prediction> {
        records.par_iter().map(|r| self.predict(r)).collect()
    }
}
