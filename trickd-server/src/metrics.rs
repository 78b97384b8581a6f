//! Prometheus metrics for the trickd server.
//!
//! This module provides:
//! - Metrics registry with counters, gauges, and histograms
//! - HTTP server to expose metrics at `/metrics` and liveness at `/health`

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use trickd_core::EngineStats;

/// Request duration histogram buckets (in seconds).
const DURATION_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0];

/// Prometheus metrics for the trickd server.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total connections accepted.
    pub connections_total: Counter,
    /// Currently active connections.
    pub connections_active: Gauge,
    /// Total requests by operation.
    pub requests_total: CounterVec,
    /// Total errors by error code.
    pub errors_total: CounterVec,
    /// Request duration histogram by operation.
    pub request_duration: HistogramVec,
    /// Active watch subscriptions.
    pub subscriptions_active: Gauge,
    /// Game updates pushed to watchers.
    pub events_forwarded_total: Counter,
    /// Games in the store, finished or not.
    pub games_total: Gauge,
    /// Engine writes committed since start.
    pub engine_commits: Gauge,
    /// Engine compare-and-swap conflicts since start.
    pub engine_conflicts: Gauge,
    /// Engine requests rejected since start.
    pub engine_rejections: Gauge,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_total = Counter::with_opts(Opts::new(
            "trickd_connections_total",
            "Total number of connections accepted",
        ))?;
        registry.register(Box::new(connections_total.clone()))?;

        let connections_active = Gauge::with_opts(Opts::new(
            "trickd_connections_active",
            "Number of currently active connections",
        ))?;
        registry.register(Box::new(connections_active.clone()))?;

        let requests_total = CounterVec::new(
            Opts::new("trickd_requests_total", "Total requests by operation"),
            &["operation"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let errors_total = CounterVec::new(
            Opts::new("trickd_errors_total", "Total errors by error code"),
            &["code"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "trickd_request_duration_seconds",
                "Request duration in seconds by operation",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["operation"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let subscriptions_active = Gauge::with_opts(Opts::new(
            "trickd_subscriptions_active",
            "Active game watch subscriptions",
        ))?;
        registry.register(Box::new(subscriptions_active.clone()))?;

        let events_forwarded_total = Counter::with_opts(Opts::new(
            "trickd_events_forwarded_total",
            "Total game updates forwarded to watchers",
        ))?;
        registry.register(Box::new(events_forwarded_total.clone()))?;

        let games_total = Gauge::with_opts(Opts::new(
            "trickd_games_total",
            "Number of stored games",
        ))?;
        registry.register(Box::new(games_total.clone()))?;

        let engine_commits = Gauge::with_opts(Opts::new(
            "trickd_engine_commits",
            "Writes committed by the game engine",
        ))?;
        registry.register(Box::new(engine_commits.clone()))?;

        let engine_conflicts = Gauge::with_opts(Opts::new(
            "trickd_engine_conflicts",
            "Version conflicts retried by the game engine",
        ))?;
        registry.register(Box::new(engine_conflicts.clone()))?;

        let engine_rejections = Gauge::with_opts(Opts::new(
            "trickd_engine_rejections",
            "Requests rejected by the game engine",
        ))?;
        registry.register(Box::new(engine_rejections.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_active,
            requests_total,
            errors_total,
            request_duration,
            subscriptions_active,
            events_forwarded_total,
            games_total,
            engine_commits,
            engine_conflicts,
            engine_rejections,
        })
    }

    /// Copies engine counters into their gauges.
    pub fn update_engine_stats(&self, stats: &EngineStats, games: usize) {
        self.games_total.set(games as f64);
        self.engine_commits.set(stats.commits() as f64);
        self.engine_conflicts.set(stats.conflicts() as f64);
        self.engine_rejections.set(stats.rejections() as f64);
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Runs the HTTP metrics server until `shutdown` fires.
pub async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Metrics server shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Handles an HTTP request to the metrics server.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path(), &metrics))
}

fn route(path: &str, metrics: &Metrics) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => match metrics.encode() {
            Ok(body) => text_response(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                body,
            ),
            Err(e) => {
                tracing::error!("Failed to encode metrics: {}", e);
                text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    b"metrics unavailable".to_vec(),
                )
            }
        },
        "/health" | "/healthz" => text_response(StatusCode::OK, "text/plain", b"OK".to_vec()),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", b"Not Found".to_vec()),
    }
}
