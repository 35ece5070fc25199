//! # Inference Service
//!
//! The serving core shared by the HTTP layer and the test suite: it holds
//! the loaded artifact (or an explicit record of why none is loaded),
//! validates incoming raw records, and scores them.
//!
//! Startup never fails because the artifact is absent or unreadable; the
//! service comes up degraded, says so through readiness, and answers every
//! prediction with a model-unavailable error until it is restarted with a
//! valid artifact. The state is fixed at startup, so no locking is needed.

use crate::model::{Prediction, TrainedArtifact};
use crate::schema::{self, RawRecord, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// The artifact slot: either a model ready to score or the reason there is
/// none. There is no implicit "empty" state.
#[derive(Debug)]
pub enum ModelState {
    Ready(Box<TrainedArtifact>),
    Unavailable { reason: String },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    /// The request payload failed field validation. Client error, never a
    /// service fault.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The service is running without a loaded model.
    #[error("model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    /// The model accepted the record but could not produce a usable score.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Body of a successful `/predict` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: u8,
    pub proba_yes: Option<f64>,
}

impl From<Prediction> for PredictionResponse {
    fn from(prediction: Prediction) -> Self {
        Self {
            prediction: prediction.class,
            proba_yes: Some(prediction.proba_yes),
        }
    }
}

/// Body of `/health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
}

pub struct InferenceService {
    state: ModelState,
}

impl InferenceService {
    /// Loads the artifact if possible, otherwise comes up degraded with the
    /// load failure recorded as the reason.
    pub fn open(path: &Path) -> Self {
        match TrainedArtifact::load(path) {
            Ok(artifact) => {
                log::info!(
                    "Model loaded from {} (trained {}, held-out ROC-AUC {:.4})",
                    path.display(),
                    artifact.trained_at,
                    artifact.metrics.roc_auc
                );
                Self {
                    state: ModelState::Ready(Box::new(artifact)),
                }
            }
            Err(err) => {
                log::warn!(
                    "Serving degraded: could not load model from {}: {err}",
                    path.display()
                );
                Self {
                    state: ModelState::Unavailable {
                        reason: err.to_string(),
                    },
                }
            }
        }
    }

    /// Wraps an already-loaded artifact.
    pub fn from_artifact(artifact: TrainedArtifact) -> Self {
        Self {
            state: ModelState::Ready(Box::new(artifact)),
        }
    }

    pub fn model_loaded(&self) -> bool {
        matches!(self.state, ModelState::Ready(_))
    }

    /// Why the service is degraded, or `None` when a model is loaded.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            ModelState::Ready(_) => None,
            ModelState::Unavailable { reason } => Some(reason),
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            model_loaded: self.model_loaded(),
        }
    }

    /// Validates one raw record and scores it with the loaded model.
    ///
    /// Validation runs before the model state is consulted, so a degraded
    /// service still rejects malformed payloads as client errors.
    pub fn predict(&self, raw: &RawRecord) -> Result<Prediction, ServiceError> {
        let record = schema::validate(raw)?;

        let artifact = match &self.state {
            ModelState::Ready(artifact) => artifact,
            ModelState::Unavailable { reason } => {
                return Err(ServiceError::ModelUnavailable {
                    reason: reason.clone(),
                });
            }
        };

        let prediction = artifact.predict(&record);
        if !prediction.proba_yes.is_finite() {
            return Err(ServiceError::Inference(format!(
                "model produced a non-finite probability ({})",
                prediction.proba_yes
            )));
        }
        Ok(prediction)
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::FittedPreprocessor;
    use crate::metrics::EvaluationSummary;
    use crate::model::{LogisticModel, ARTIFACT_SCHEMA_VERSION};
    use crate::schema::{Contact, Education, Job, Marital, Month, Record};
    use chrono::Utc;
    use ndarray::Array1;
    use std::path::PathBuf;

    fn training_records() -> Vec<Record> {
        let mut records = Vec::new();
        for i in 0..8u8 {
            records.push(Record {
                age: 24 + 6 * i,
                job: if i % 2 == 0 { Job::Technician } else { Job::Admin },
                marital: Marital::Single,
                education: Education::Tertiary,
                balance: 500.0 * f64::from(i),
                housing: i % 2 == 0,
                loan: false,
                contact: Contact::Cellular,
                month: if i % 2 == 0 { Month::May } else { Month::Oct },
                campaign: 1 + i % 5,
            });
        }
        records
    }

    fn ready_service() -> InferenceService {
        let preprocessor = FittedPreprocessor::fit(&training_records());
        let width = preprocessor.width();
        InferenceService::from_artifact(TrainedArtifact {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            trained_at: Utc::now(),
            seed: 83,
            preprocessor,
            classifier: LogisticModel {
                intercept: 0.2,
                coefficients: Array1::from_elem(width, -0.05),
            },
            metrics: EvaluationSummary {
                roc_auc: 0.8,
                f1_macro: 0.6,
                n_train: 6,
                n_test: 2,
            },
        })
    }

    fn sample_raw() -> RawRecord {
        RawRecord {
            age: 30,
            job: "technician".to_string(),
            marital: "single".to_string(),
            education: "tertiary".to_string(),
            balance: 1000.0,
            housing: true,
            loan: false,
            contact: "cellular".to_string(),
            month: "may".to_string(),
            campaign: 1,
        }
    }

    #[test]
    fn missing_artifact_starts_degraded_instead_of_failing() {
        let service = InferenceService::open(&PathBuf::from("/nonexistent/artifact.toml"));
        assert!(!service.model_loaded());
        assert!(service.unavailable_reason().is_some());

        let health = service.health();
        assert_eq!(health.status, "healthy");
        assert!(!health.model_loaded);

        assert!(matches!(
            service.predict(&sample_raw()),
            Err(ServiceError::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn validation_runs_before_model_availability() {
        let degraded = InferenceService::open(&PathBuf::from("/nonexistent/artifact.toml"));
        let mut raw = sample_raw();
        raw.age = 150;
        match degraded.predict(&raw) {
            Err(ServiceError::Validation(err)) => assert_eq!(err.field, "age"),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn loaded_service_scores_a_valid_record() {
        let service = ready_service();
        assert!(service.model_loaded());
        assert!(service.unavailable_reason().is_none());

        let prediction = service.predict(&sample_raw()).unwrap();
        assert!(prediction.class == 0 || prediction.class == 1);
        assert!(prediction.proba_yes > 0.0 && prediction.proba_yes < 1.0);
    }

    #[test]
    fn unknown_category_is_a_validation_error_with_the_field_name() {
        let service = ready_service();
        let mut raw = sample_raw();
        raw.job = "plumber".to_string();
        match service.predict(&raw) {
            Err(ServiceError::Validation(err)) => {
                assert_eq!(err.field, "job");
                assert!(err.reason.contains("plumber"));
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn response_wire_shape_is_stable() {
        let response = PredictionResponse::from(Prediction {
            class: 1,
            proba_yes: 0.75,
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"prediction": 1, "proba_yes": 0.75})
        );

        let health = HealthStatus {
            status: "healthy".to_string(),
            model_loaded: true,
        };
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"status": "healthy", "model_loaded": true})
        );
    }
}
