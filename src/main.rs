use clap::{Args, CommandFactory, Parser, Subcommand};
use std::env;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use depomark::client::ApiClient;
use depomark::data::load_prediction_data;
use depomark::metrics::{render_classification_report, render_feature_influence};
use depomark::model::TrainedArtifact;
use depomark::server::run_server;
use depomark::service::InferenceService;
use depomark::train::{self, TrainOptions, DEFAULT_SEED, DEFAULT_TEST_FRACTION};
use depomark::tui;

/// Fallback artifact location when neither --model nor MODEL_PATH is set.
const DEFAULT_MODEL_PATH: &str = "models/artifact.toml";
const MODEL_PATH_VAR: &str = "MODEL_PATH";

#[derive(Parser)]
#[command(
    name = "depomark",
    version,
    about = "Term-deposit subscription prediction toolkit",
    long_about = "Trains a preprocessing + logistic-regression pipeline on bank marketing \
                 data, persists it as a portable TOML artifact, and serves predictions \
                 over HTTP or through an interactive terminal console."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct TrainArgs {
    /// Path to the labeled training CSV (must include a `deposit` column)
    data: PathBuf,

    /// Where to write the trained artifact (default: $MODEL_PATH or models/artifact.toml)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Seed for the stratified train/test split
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value_t = DEFAULT_TEST_FRACTION)]
    test_fraction: f64,
}

#[derive(Args)]
struct InferArgs {
    /// Path to the CSV of records to score (a `deposit` column is ignored)
    data: PathBuf,

    /// Path to the trained artifact (default: $MODEL_PATH or models/artifact.toml)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Output CSV path; omitted means stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Path to the trained artifact (default: $MODEL_PATH or models/artifact.toml)
    #[arg(long)]
    model: Option<PathBuf>,
}

#[derive(Args)]
struct TuiArgs {
    /// Base URL of a running prediction server (default: $API_URL or the local default)
    #[arg(long)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and write the artifact
    #[command(about = "Train on a labeled CSV and persist the artifact")]
    Train(TrainArgs),

    /// Score a CSV of records with a trained artifact
    #[command(about = "Batch-score a CSV (outputs row, prediction, proba_yes)")]
    Infer(InferArgs),

    /// Serve predictions over HTTP
    #[command(about = "Run the synchronous HTTP prediction service")]
    Serve(ServeArgs),

    /// Interactive terminal console against a running server
    #[command(about = "Open the interactive prediction console")]
    Tui(TuiArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Train(args)) => run_train(args),
        Some(Commands::Infer(args)) => run_infer(args),
        Some(Commands::Serve(args)) => run_serve(args),
        Some(Commands::Tui(args)) => run_tui(args),
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Resolves the artifact path from the flag, the environment, or the default.
fn resolve_model_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var(MODEL_PATH_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH))
}

fn run_train(args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model_path = resolve_model_path(args.model);
    let options = TrainOptions {
        data_path: args.data,
        model_path: model_path.clone(),
        seed: args.seed,
        test_fraction: args.test_fraction,
    };

    let report = train::train(&options)?;

    println!("{}", render_classification_report(&report.classification));
    println!(
        "{}",
        render_feature_influence(&report.top_positive, &report.top_negative)
    );

    let metrics = &report.artifact.metrics;
    println!(
        "ROC-AUC {:.4} | macro F1 {:.4} | trained on {} rows, evaluated on {}",
        metrics.roc_auc, metrics.f1_macro, metrics.n_train, metrics.n_test
    );
    println!("Artifact written to {}", model_path.display());
    Ok(())
}

fn run_infer(args: InferArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model_path = resolve_model_path(args.model);
    let artifact = TrainedArtifact::load(&model_path)?;
    println!("Loaded artifact from {}", model_path.display());

    let records = load_prediction_data(&args.data)?;
    println!("Scoring {} records", records.len());

    let predictions = artifact.predict_batch(&records);

    let mut writer: csv::Writer<Box<dyn Write>> = match &args.out {
        Some(path) => csv::Writer::from_writer(Box::new(std::fs::File::create(path)?)),
        None => csv::Writer::from_writer(Box::new(std::io::stdout())),
    };
    writer.write_record(["row", "prediction", "proba_yes"])?;
    for (row, prediction) in predictions.iter().enumerate() {
        writer.write_record([
            (row + 1).to_string(),
            prediction.class.to_string(),
            format!("{:.6}", prediction.proba_yes),
        ])?;
    }
    writer.flush()?;

    if let Some(path) = &args.out {
        println!("Predictions written to {}", path.display());
    }
    Ok(())
}

fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model_path = resolve_model_path(args.model);
    // The artifact loads (or fails into degraded mode) before the socket
    // opens, so a reachable server always has a settled model state.
    let service = Arc::new(InferenceService::open(&model_path));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_server(args.bind, service))?;
    Ok(())
}

fn run_tui(args: TuiArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = match args.url {
        Some(url) => ApiClient::new(&url),
        None => ApiClient::from_env(),
    };
    tui::run(client)?;
    Ok(())
}
