//! TCP server implementation.

use crate::broadcast::GameUpdate;
use crate::config::Config;
use crate::error::ServerError;
use crate::handler::{CommandHandler, WatchSubscription};
use crate::metrics::Metrics;
use crate::session::{Session, SessionState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use trickd_protocol::message::{Operation, Request, Response, ResponseError, StreamEvent};
use trickd_protocol::{encode, ErrorCode, LineDecoder, ProtocolError};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Longest accepted request line.
    pub max_line_bytes: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_connections", &self.max_connections)
            .field("max_line_bytes", &self.max_line_bytes)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Takes the `network` section of a loaded config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            idle_timeout: config.network.idle_timeout(),
            max_connections: config.network.max_connections,
            max_line_bytes: config.network.max_line_bytes,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Update forwarded from a subscription task to the connection loop.
struct ForwardedUpdate {
    subscription_id: String,
    update: GameUpdate,
}

/// TCP server for trickd.
pub struct Server {
    config: ServerConfig,
    handler: Arc<CommandHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server around a configured handler.
    pub fn new(config: ServerConfig, handler: CommandHandler) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run_with_listener(listener).await
    }

    /// Runs on an already bound listener until shutdown.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        // Subscribe before flagging as running so a shutdown sent after
        // `is_running` turns true is never missed.
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        tracing::info!("Server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.stats.connections_active.load(Ordering::Relaxed)
            >= self.config.max_connections as u64
        {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            self.stats
                .connections_rejected
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.config.metrics {
            metrics.connections_total.inc();
            metrics.connections_active.inc();
        }

        let handler = self.handler.clone();
        let stats = self.stats.clone();
        let config = self.config.clone();
        let mut conn_shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let result =
                Self::handle_connection(stream, addr, handler, &config, &mut conn_shutdown).await;

            match result {
                Ok(()) | Err(ServerError::ShuttingDown) => {}
                Err(e) => {
                    tracing::debug!("Connection {} error: {}", addr, e);
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }
            }

            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            if let Some(ref metrics) = config.metrics {
                metrics.connections_active.dec();
            }

            tracing::info!("Client disconnected: {}", addr);
        });
    }

    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<CommandHandler>,
        config: &ServerConfig,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!("Client connected: {}", addr);

        let mut session = Session::new(addr);
        let mut decoder = LineDecoder::with_max_line(config.max_line_bytes);
        let mut buf = [0u8; 8192];

        // Forwarders push updates here; the loop below writes them out.
        let (update_tx, mut update_rx) = mpsc::channel::<ForwardedUpdate>(256);
        let mut forwarders: HashMap<String, JoinHandle<()>> = HashMap::new();

        let result = loop {
            tokio::select! {
                biased;

                Some(forwarded) = update_rx.recv() => {
                    if let Err(e) = Self::write_update(&mut stream, forwarded, config).await {
                        break Err(e);
                    }
                    session.touch();
                    continue;
                }

                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            break Ok(());
                        }
                        Ok(n) => {
                            tracing::trace!("[{}] Received {} bytes", addr, n);
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => break Err(ServerError::Io(e)),
                    }
                }

                _ = tokio::time::sleep(config.idle_timeout) => {
                    if session.idle_duration() >= config.idle_timeout {
                        tracing::debug!("[{}] Idle timeout", addr);
                        break Ok(());
                    }
                    continue;
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    break Err(ServerError::ShuttingDown);
                }
            }

            match Self::process_lines(
                &mut stream,
                &mut decoder,
                &mut session,
                &handler,
                &update_tx,
                &mut forwarders,
            )
            .await
            {
                Ok(()) if session.state() == SessionState::Closing => {
                    tracing::debug!("[{}] Session closing", addr);
                    break Ok(());
                }
                Ok(()) => {}
                Err(e) => break Err(e),
            }
        };

        for sub_id in session.subscriptions() {
            if let Some(broadcaster) = handler.broadcaster() {
                broadcaster.unsubscribe(&sub_id);
            }
        }
        for (_, task) in forwarders.drain() {
            task.abort();
        }
        handler.update_gauge_metrics();

        result
    }

    /// Answers every complete line in the decoder.
    async fn process_lines(
        stream: &mut TcpStream,
        decoder: &mut LineDecoder,
        session: &mut Session,
        handler: &CommandHandler,
        update_tx: &mpsc::Sender<ForwardedUpdate>,
        forwarders: &mut HashMap<String, JoinHandle<()>>,
    ) -> Result<(), ServerError> {
        loop {
            let line = match decoder.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(()),
                Err(ProtocolError::InvalidUtf8) => {
                    Self::write_response(stream, &bad_request("", "invalid UTF-8 in message"))
                        .await?;
                    continue;
                }
                Err(e) => {
                    // The rest of the stream cannot be framed; report and drop.
                    Self::write_response(stream, &bad_request("", e.to_string())).await?;
                    return Err(e.into());
                }
            };

            let request: Request = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    let id = request_id(&line);
                    Self::write_response(stream, &bad_request(id, e.to_string())).await?;
                    continue;
                }
            };

            tracing::debug!(
                session = %session.id,
                op = request.op.as_str(),
                id = %request.id,
                "request"
            );

            let response = match request.op {
                Operation::WatchGame => {
                    let (response, watch) = handler.handle_watch_game(session, &request);
                    if let Some(watch) = watch {
                        let sub_id = watch.subscription_id.clone();
                        let task = Self::spawn_forwarder(watch, update_tx.clone());
                        forwarders.insert(sub_id, task);
                    }
                    response
                }
                Operation::Unwatch => {
                    let response = handler.handle(session, &request);
                    // Only this session's own forwarders are in the map.
                    if let Some(sub_id) = request.params["subscription_id"].as_str() {
                        if let Some(task) = forwarders.remove(sub_id) {
                            task.abort();
                        }
                    }
                    response
                }
                _ => handler.handle(session, &request),
            };

            Self::write_response(stream, &response).await?;

            if session.state() == SessionState::Closing {
                return Ok(());
            }
        }
    }

    /// Forwards one subscription's updates to the connection loop.
    fn spawn_forwarder(
        watch: WatchSubscription,
        tx: mpsc::Sender<ForwardedUpdate>,
    ) -> JoinHandle<()> {
        let WatchSubscription {
            subscription_id,
            game_id,
            snapshot_version,
            mut receiver,
        } = watch;

        tokio::spawn(async move {
            // Commits may be published out of order. Each update carries the
            // whole game, so anything not newer than what was sent is dropped.
            let mut last_forwarded = snapshot_version;
            loop {
                match receiver.recv().await {
                    Ok(update) => {
                        let version = update.record.version;
                        if version <= last_forwarded {
                            tracing::trace!(
                                subscription_id = %subscription_id,
                                version,
                                last_forwarded,
                                "dropping stale update"
                            );
                            continue;
                        }
                        let forwarded = ForwardedUpdate {
                            subscription_id: subscription_id.clone(),
                            update,
                        };
                        if tx.send(forwarded).await.is_err() {
                            break;
                        }
                        last_forwarded = version;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            subscription_id = %subscription_id,
                            game_id = %game_id,
                            skipped = n,
                            "subscriber lagged"
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn write_update(
        stream: &mut TcpStream,
        forwarded: ForwardedUpdate,
        config: &ServerConfig,
    ) -> Result<(), ServerError> {
        let record = &forwarded.update.record;
        let event = StreamEvent::new(
            forwarded.subscription_id,
            record.value.id.clone(),
            record.version,
            forwarded.update.event.as_str(),
            record.value.phase.as_str(),
            serde_json::to_value(&record.value)?,
        );
        stream.write_all(&encode(&event)?).await?;

        if let Some(ref metrics) = config.metrics {
            metrics.events_forwarded_total.inc();
        }
        Ok(())
    }

    async fn write_response(stream: &mut TcpStream, response: &Response) -> Result<(), ServerError> {
        stream.write_all(&encode(response)?).await?;
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns a sender that triggers shutdown when signalled.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn handler(&self) -> &Arc<CommandHandler> {
        &self.handler
    }
}

fn bad_request(id: impl Into<String>, message: impl Into<String>) -> Response {
    Response::error(id, ResponseError::new(ErrorCode::BadRequest, message))
}

/// Best-effort id of a request that failed to parse.
fn request_id(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_default()
}
