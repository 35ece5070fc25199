//! # Training Pipeline
//!
//! One call that takes a labeled CSV to a persisted artifact: load and
//! validate, stratified split, freeze the preprocessor on the training side
//! only, fit the balanced logistic classifier, evaluate on the held-out
//! side, and write the artifact atomically. The returned report carries the
//! per-class breakdown and coefficient ranking for the CLI to print.

use crate::data::{self, DataError};
use crate::encode::FittedPreprocessor;
use crate::fit::{self, FitError, IrlsOptions};
use crate::metrics::{self, ClassificationReport, EvaluationSummary, RankedFeature};
use crate::model::{
    LogisticModel, ModelError, TrainedArtifact, ARTIFACT_SCHEMA_VERSION, DECISION_THRESHOLD,
};
use chrono::Utc;
use ndarray::Array1;
use std::path::PathBuf;
use thiserror::Error;

/// Default train/test split seed.
pub const DEFAULT_SEED: u64 = 83;
/// Default held-out share of the labeled data.
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
/// How many coefficients to surface from each end of the ranking.
const TOP_FEATURES: usize = 10;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("failed to load training data: {0}")]
    Data(#[from] DataError),

    #[error("failed to fit the classifier: {0}")]
    Fit(#[from] FitError),

    #[error("failed to write the trained artifact: {0}")]
    Artifact(#[from] ModelError),
}

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub data_path: PathBuf,
    pub model_path: PathBuf,
    pub seed: u64,
    pub test_fraction: f64,
}

/// The persisted artifact plus the training-time-only diagnostics.
#[derive(Debug)]
pub struct TrainReport {
    pub artifact: TrainedArtifact,
    pub classification: ClassificationReport,
    pub top_positive: Vec<RankedFeature>,
    pub top_negative: Vec<RankedFeature>,
}

/// Runs the whole training pipeline and persists the artifact to
/// `options.model_path`.
pub fn train(options: &TrainOptions) -> Result<TrainReport, TrainError> {
    log::info!("Loading training data from {}", options.data_path.display());
    let data = data::load_training_data(&options.data_path)?;
    log::info!(
        "Loaded {} rows ({} subscribed)",
        data.records.len(),
        data.labels.sum() as usize
    );

    let split = data::stratified_split(data, options.test_fraction, options.seed);
    let n_train = split.train.records.len();
    let n_test = split.test.records.len();
    log::info!(
        "Stratified split with seed {}: {n_train} training rows, {n_test} held-out rows",
        options.seed
    );

    // The preprocessor only ever sees the training side; the held-out rows
    // are encoded with the frozen layout like any serving request would be.
    let preprocessor = FittedPreprocessor::fit(&split.train.records);
    log::info!(
        "Preprocessor frozen with {} feature columns",
        preprocessor.width()
    );

    let x_train = preprocessor.transform_batch(&split.train.records);
    let x_test = preprocessor.transform_batch(&split.test.records);

    let prior_weights = fit::balanced_class_weights(&split.train.labels)?;
    let fitted = fit::fit_logistic(
        &x_train,
        &split.train.labels,
        &prior_weights,
        &IrlsOptions::default(),
    )?;
    log::info!(
        "IRLS converged after {} iterations (deviance {:.4})",
        fitted.iterations,
        fitted.deviance
    );
    let classifier = LogisticModel {
        intercept: fitted.intercept,
        coefficients: fitted.coefficients,
    };

    let scores = Array1::from_iter(
        x_test
            .outer_iter()
            .map(|row| classifier.predict_proba(&row.to_owned())),
    );
    let predictions: Vec<u8> = scores
        .iter()
        .map(|&p| u8::from(p >= DECISION_THRESHOLD))
        .collect();
    let roc_auc = metrics::roc_auc(&split.test.labels, &scores);
    let classification = metrics::classification_report(&split.test.labels, &predictions);
    log::info!(
        "Held-out ROC-AUC {roc_auc:.4}, macro F1 {:.4}",
        classification.macro_f1
    );

    let (top_positive, top_negative) = metrics::top_signed_coefficients(
        &preprocessor.feature_names(),
        &classifier.coefficients,
        TOP_FEATURES,
    );

    let artifact = TrainedArtifact {
        schema_version: ARTIFACT_SCHEMA_VERSION,
        trained_at: Utc::now(),
        seed: options.seed,
        preprocessor,
        classifier,
        metrics: EvaluationSummary {
            roc_auc,
            f1_macro: classification.macro_f1,
            n_train,
            n_test,
        },
    };
    artifact.save(&options.model_path)?;
    log::info!("Artifact written to {}", options.model_path.display());

    Ok(TrainReport {
        artifact,
        classification,
        top_positive,
        top_negative,
    })
}
