//! HTTP API for the prediction service.
//!
//! Three routes: `GET /health` for liveness, `GET /ready` for readiness
//! (degraded serving answers 503 with the reason), and `POST /predict` for
//! scoring one record. Request handling is synchronous CPU work; the async
//! surface exists only for connection plumbing.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::schema::RawRecord;
use crate::service::{InferenceService, PredictionResponse, ServiceError};

type BoxBody = Full<Bytes>;

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let body_str = serde_json::to_string(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body_str)))
        .unwrap()
}

fn error_response(status: StatusCode, message: &str) -> Response<BoxBody> {
    json_response(status, &serde_json::json!({ "error": message }))
}

/// Start the prediction API server. Runs until the process is stopped.
pub async fn run_server(
    bind_addr: SocketAddr,
    service: Arc<InferenceService>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    log::info!("prediction API listening on http://{bind_addr}");
    if let Some(reason) = service.unavailable_reason() {
        log::warn!("serving degraded, predictions will return 503: {reason}");
    }

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let service = Arc::clone(&service);

        tokio::spawn(async move {
            let handler = service_fn(move |req| {
                let service = Arc::clone(&service);
                async move { handle_request(req, &service).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                if !e.to_string().contains("connection closed") {
                    log::warn!("HTTP connection error from {peer}: {e}");
                }
            }
        });
    }
}

/// Route an incoming HTTP request to the appropriate handler.
async fn handle_request<B>(
    req: Request<B>,
    service: &InferenceService,
) -> Result<Response<BoxBody>, hyper::Error>
where
    B: Body,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") => handle_health(service),
        (Method::GET, "/ready") => handle_ready(service),
        (Method::POST, "/predict") => handle_predict(req, service).await,
        _ => error_response(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}

/// GET /health: liveness. Always 200 while the process runs; the body says
/// whether a model is loaded.
fn handle_health(service: &InferenceService) -> Response<BoxBody> {
    json_response(StatusCode::OK, &service.health())
}

/// GET /ready: readiness to serve predictions.
fn handle_ready(service: &InferenceService) -> Response<BoxBody> {
    match service.unavailable_reason() {
        None => json_response(StatusCode::OK, &serde_json::json!({ "ready": true })),
        Some(reason) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &serde_json::json!({ "ready": false, "detail": reason }),
        ),
    }
}

/// POST /predict: validate and score one record.
async fn handle_predict<B>(req: Request<B>, service: &InferenceService) -> Response<BoxBody>
where
    B: Body,
    B::Error: Display,
{
    let body = match read_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let raw: RawRecord = match parse_json(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match service.predict(&raw) {
        Ok(prediction) => json_response(StatusCode::OK, &PredictionResponse::from(prediction)),
        Err(ServiceError::Validation(err)) => {
            // Client mistake, not a service fault; keep it off the warn log.
            log::debug!("rejected record: {err}");
            json_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &serde_json::json!({ "error": { "field": err.field, "reason": err.reason } }),
            )
        }
        Err(ServiceError::ModelUnavailable { reason }) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &format!("model unavailable: {reason}"),
        ),
        Err(err @ ServiceError::Inference(_)) => {
            log::error!("inference failure: {err}");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

/// Read the full request body as bytes.
async fn read_body<B>(req: Request<B>) -> Result<Bytes, Response<BoxBody>>
where
    B: Body,
    B::Error: Display,
{
    match req.collect().await {
        Ok(body) => Ok(body.to_bytes()),
        Err(e) => {
            log::error!("failed to read request body: {e}");
            Err(error_response(
                StatusCode::BAD_REQUEST,
                "failed to read request body",
            ))
        }
    }
}

/// Parse a JSON body into a type. Malformed or structurally wrong JSON is a
/// client error against the `body` field.
#[allow(clippy::result_large_err)]
fn parse_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, Response<BoxBody>> {
    serde_json::from_slice(bytes).map_err(|e| {
        json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &serde_json::json!({ "error": { "field": "body", "reason": format!("invalid JSON: {e}") } }),
        )
    })
}
