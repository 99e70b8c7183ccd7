//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Metrics collection and Prometheus export
//! - Structured logging with configurable levels (plain or JSON)
//! - Liveness/readiness endpoints for monitoring
//!
//! The metrics server is a tiny hyper service exposing `/metrics`,
//! `/health/live`, and `/health/ready` on `METRICS_PORT` (default 9090).

use std::net::SocketAddr;

use anyhow::Result;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

/// Initialize structured logging
///
/// Respects `RUST_LOG` for filtering and `LOG_FORMAT=json` for JSON output
/// (useful when logs are shipped to a collector).
pub fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json_output = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
    }

    Ok(())
}

/// Initialize the metrics recorder and start the metrics server
pub async fn init_metrics() -> Result<()> {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    let port = std::env::var("METRICS_PORT")
        .unwrap_or_else(|_| "9090".to_string())
        .parse::<u16>()
        .map_err(|_| anyhow::anyhow!("METRICS_PORT must be a valid port number"))?;

    start_metrics_server(handle, port).await
}

async fn start_metrics_server(metrics_handle: PrometheusHandle, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on {}", addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let metrics_handle = metrics_handle.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                async move {
                                    match (req.method(), req.uri().path()) {
                                        (&hyper::Method::GET, "/metrics") => {
                                            let metrics = metrics_handle.render();
                                            Ok::<_, std::convert::Infallible>(hyper::Response::new(
                                                metrics,
                                            ))
                                        }
                                        (&hyper::Method::GET, "/health/live") => {
                                            Ok(hyper::Response::new("OK".to_string()))
                                        }
                                        (&hyper::Method::GET, "/health/ready") => {
                                            Ok(hyper::Response::new("OK".to_string()))
                                        }
                                        _ => {
                                            let mut response =
                                                hyper::Response::new("Not Found".to_string());
                                            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
                                            Ok(response)
                                        }
                                    }
                                }
                            },
                        );

                        if let Err(err) = hyper::server::conn::http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            tracing::error!("Error serving metrics connection: {:?}", err);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting metrics connection: {}", e);
                }
            }
        }
    });

    Ok(())
}

/// Create a tracing span for Telegram update handling
pub fn telegram_span(handler: &str, user_id: Option<i64>) -> tracing::Span {
    tracing::info_span!("telegram_update", handler = %handler, user_id = ?user_id)
}

/// Create a tracing span for an OCR operation
pub fn ocr_span(operation: &str) -> tracing::Span {
    tracing::info_span!("ocr_operation", operation = %operation)
}

/// Create a tracing span for an OpenAI request
pub fn openai_span(operation: &str) -> tracing::Span {
    tracing::info_span!("openai_request", operation = %operation)
}

/// Record an incoming Telegram message by type
pub fn record_telegram_message(message_type: &str) {
    metrics::counter!("telegram_messages_total", "type" => message_type.to_string()).increment(1);
}

/// Record handler timing
pub fn record_request_metrics(endpoint: &str, duration: std::time::Duration) {
    metrics::histogram!("request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(duration.as_secs_f64());
}

/// Record an OCR operation outcome
pub fn record_ocr_operation(success: bool, duration: std::time::Duration, image_size: u64) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("ocr_operations_total", "outcome" => outcome).increment(1);
    metrics::histogram!("ocr_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("ocr_image_size_bytes").record(image_size as f64);
}

/// Record an OpenAI request outcome
pub fn record_openai_request(operation: &str, success: bool, duration: std::time::Duration) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "openai_requests_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("openai_duration_seconds", "operation" => operation.to_string())
        .record(duration.as_secs_f64());
}

/// Record a generated quiz
pub fn record_quiz_generated(question_count: usize) {
    metrics::counter!("quizzes_generated_total").increment(1);
    metrics::histogram!("quiz_question_count").record(question_count as f64);
}
