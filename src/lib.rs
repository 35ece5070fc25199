//! Term-deposit subscription prediction.
//!
//! Offline training produces a portable TOML artifact (fitted preprocessor,
//! logistic classifier, held-out evaluation metrics); an HTTP service and a
//! terminal front-end consume it for online scoring.

pub mod client;
pub mod data;
pub mod encode;
pub mod fit;
pub mod metrics;
pub mod model;
pub mod schema;
pub mod server;
pub mod service;
pub mod train;
pub mod tui;
