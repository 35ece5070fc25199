//! End-to-end coverage of the train -> artifact -> serve pipeline, including
//! a live HTTP round trip and the command-line entry points.

use std::fs;
use std::net::TcpListener;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use depomark::client::{ApiClient, ClientError};
use depomark::model::TrainedArtifact;
use depomark::schema::RawRecord;
use depomark::server::run_server;
use depomark::service::{InferenceService, ServiceError};
use depomark::train::{train, TrainOptions, DEFAULT_SEED, DEFAULT_TEST_FRACTION};

/// Writes a CSV with a planted signal: affluent customers (management job,
/// high balance) subscribe with probability 0.85, the rest with 0.15.
fn write_training_csv(path: &Path, rows: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut content = String::from(
        "age,job,marital,education,balance,housing,loan,contact,month,campaign,deposit\n",
    );
    for i in 0..rows {
        let affluent = i % 2 == 0;
        let balance = if affluent {
            2500.0 + 10.0 * i as f64
        } else {
            150.0 + 5.0 * i as f64
        };
        let p_yes = if affluent { 0.85 } else { 0.15 };
        let deposit = if rng.gen_bool(p_yes) { "yes" } else { "no" };
        let job = if affluent { "management" } else { "blue-collar" };
        let month = if i % 4 == 0 { "may" } else { "aug" };
        content.push_str(&format!(
            "{},{job},married,secondary,{balance},no,no,cellular,{month},{},{deposit}\n",
            28 + (i % 40),
            1 + (i % 3),
        ));
    }
    fs::write(path, content).expect("write training csv");
}

fn sample_record() -> RawRecord {
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
fn trained_artifact_serves_predictions() {
    let dir = tempdir().expect("temporary directory");
    let data_path = dir.path().join("train.csv");
    let model_path = dir.path().join("artifact.toml");
    write_training_csv(&data_path, 200, 3);

    let report = train(&TrainOptions {
        data_path: data_path.clone(),
        model_path: model_path.clone(),
        seed: DEFAULT_SEED,
        test_fraction: DEFAULT_TEST_FRACTION,
    })
    .expect("training succeeds");

    // The signal is strong enough that the held-out ranking must beat chance.
    assert!(
        report.artifact.metrics.roc_auc > 0.7,
        "AUC {} too low for the planted signal",
        report.artifact.metrics.roc_auc
    );

    // A fresh process would load the artifact from disk; do the same here.
    let artifact = TrainedArtifact::load(&model_path).expect("artifact loads");
    let service = InferenceService::from_artifact(artifact);
    assert!(service.model_loaded());

    let sample = service.predict(&sample_record()).expect("sample scores");
    assert!(sample.proba_yes > 0.0 && sample.proba_yes < 1.0);
    assert!(sample.class == 0 || sample.class == 1);

    // The planted signal must survive the round trip: an affluent record
    // scores above a low-balance one.
    let mut rich = sample_record();
    rich.job = "management".to_string();
    rich.balance = 5000.0;
    let mut poor = sample_record();
    poor.job = "blue-collar".to_string();
    poor.balance = 100.0;
    let rich_p = service.predict(&rich).expect("rich scores").proba_yes;
    let poor_p = service.predict(&poor).expect("poor scores").proba_yes;
    assert!(
        rich_p > poor_p,
        "expected affluent {rich_p} > low-balance {poor_p}"
    );
}

#[test]
fn degraded_service_reports_and_rejects() {
    let dir = tempdir().expect("temporary directory");
    let service = InferenceService::open(&dir.path().join("no-such-artifact.toml"));

    assert!(!service.model_loaded());
    assert!(service.unavailable_reason().is_some());

    // Still a validator: a malformed payload is the client's fault even
    // without a model.
    let mut bad = sample_record();
    bad.campaign = 99;
    let err = service.predict(&bad).expect_err("campaign out of range");
    assert!(matches!(err, ServiceError::Validation(ref v) if v.field == "campaign"));

    // A well-formed payload hits the missing model.
    let err = service.predict(&sample_record()).expect_err("no model");
    assert!(matches!(err, ServiceError::ModelUnavailable { .. }));
}

#[test]
fn http_round_trip_through_a_real_socket() {
    let dir = tempdir().expect("temporary directory");
    let data_path = dir.path().join("train.csv");
    let model_path = dir.path().join("artifact.toml");
    write_training_csv(&data_path, 120, 17);

    train(&TrainOptions {
        data_path,
        model_path: model_path.clone(),
        seed: DEFAULT_SEED,
        test_fraction: DEFAULT_TEST_FRACTION,
    })
    .expect("training succeeds");

    // Let the OS pick a free port, then hand that address to the server.
    let addr = TcpListener::bind("127.0.0.1:0")
        .expect("probe listener")
        .local_addr()
        .expect("local addr");

    let service = Arc::new(InferenceService::open(&model_path));
    let server_service = Arc::clone(&service);
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let _ = runtime.block_on(run_server(addr, server_service));
    });

    let client = ApiClient::new(&format!("http://{addr}"));

    // Wait for the listener to come up.
    let deadline = Instant::now() + Duration::from_secs(5);
    let health = loop {
        match client.health() {
            Ok(health) => break health,
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => panic!("server never came up: {e}"),
        }
    };
    assert!(health.model_loaded);

    let response = client.predict(&sample_record()).expect("live prediction");
    assert!(response.prediction == 0 || response.prediction == 1);
    let proba = response.proba_yes.expect("probability present");
    assert!(proba > 0.0 && proba < 1.0);

    // Field-level rejection surfaces through the client as an API error
    // carrying the offending field name.
    let mut bad = sample_record();
    bad.age = 150;
    let err = client.predict(&bad).expect_err("age out of range");
    match err {
        ClientError::Rejected { status, message } => {
            assert_eq!(status, 422);
            assert!(message.contains("age"), "message was: {message}");
        }
        other => panic!("expected a rejection, got {other}"),
    }
}

#[test]
fn cli_trains_and_batch_scores() {
    let dir = tempdir().expect("temporary directory");
    let data_path = dir.path().join("train.csv");
    let model_path = dir.path().join("artifact.toml");
    let out_path = dir.path().join("predictions.csv");
    write_training_csv(&data_path, 100, 29);

    let exe = env!("CARGO_BIN_EXE_depomark");

    let status = Command::new(exe)
        .current_dir(dir.path())
        .args([
            "train",
            data_path.to_str().expect("path str"),
            "--model",
            model_path.to_str().expect("path str"),
        ])
        .status()
        .expect("run train");
    assert!(status.success(), "train exited with {status:?}");
    assert!(model_path.is_file(), "artifact missing after training");

    // Score the same file; its label column must be ignored.
    let status = Command::new(exe)
        .current_dir(dir.path())
        .args([
            "infer",
            data_path.to_str().expect("path str"),
            "--model",
            model_path.to_str().expect("path str"),
            "--out",
            out_path.to_str().expect("path str"),
        ])
        .status()
        .expect("run infer");
    assert!(status.success(), "infer exited with {status:?}");

    let output = fs::read_to_string(&out_path).expect("read predictions");
    let mut lines = output.lines();
    assert_eq!(lines.next(), Some("row,prediction,proba_yes"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 100);
    for row in rows {
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 3);
        assert!(fields[1] == "0" || fields[1] == "1");
        let proba: f64 = fields[2].parse().expect("parsable probability");
        assert!((0.0..=1.0).contains(&proba));
    }
}

#[test]
fn serving_on_a_missing_artifact_returns_503_predictions() {
    let dir = tempdir().expect("temporary directory");

    let addr = TcpListener::bind("127.0.0.1:0")
        .expect("probe listener")
        .local_addr()
        .expect("local addr");

    let service = Arc::new(InferenceService::open(&dir.path().join("absent.toml")));
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let _ = runtime.block_on(run_server(addr, service));
    });

    let client = ApiClient::new(&format!("http://{addr}"));
    let deadline = Instant::now() + Duration::from_secs(5);
    let health = loop {
        match client.health() {
            Ok(health) => break health,
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => panic!("server never came up: {e}"),
        }
    };
    // Alive but degraded.
    assert!(!health.model_loaded);

    let err = client.predict(&sample_record()).expect_err("no model loaded");
    match err {
        ClientError::Rejected { status, message } => {
            assert_eq!(status, 503);
            assert!(
                message.contains("model unavailable"),
                "message was: {message}"
            );
        }
        other => panic!("expected a 503 rejection, got {other}"),
    }
}

/// Unused label columns and unknown categories must not break batch scoring.
#[test]
fn batch_inference_tolerates_unknown_categories() {
    let dir = tempdir().expect("temporary directory");
    let data_path = dir.path().join("train.csv");
    let model_path = dir.path().join("artifact.toml");
    write_training_csv(&data_path, 100, 41);

    train(&TrainOptions {
        data_path,
        model_path: model_path.clone(),
        seed: DEFAULT_SEED,
        test_fraction: DEFAULT_TEST_FRACTION,
    })
    .expect("training succeeds");

    let artifact = TrainedArtifact::load(&model_path).expect("artifact loads");
    let service = InferenceService::from_artifact(artifact);

    // "student" never appears in the synthetic training jobs; the one-hot
    // block encodes to all zeros and the score must still be a probability.
    let mut unseen = sample_record();
    unseen.job = "student".to_string();
    let prediction = service.predict(&unseen).expect("unseen category scores");
    assert!(prediction.proba_yes > 0.0 && prediction.proba_yes < 1.0);
}
