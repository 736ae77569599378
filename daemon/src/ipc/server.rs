//! Unix domain socket server for IPC
//!
//! Provides request-response communication for UI collaborators and
//! pushes engine events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::BindingSummary;
use crate::events::EngineEvent;
use crate::state::EngineInput;

use super::protocol::{DaemonStatus, Request, Response};

/// Largest request body accepted from a client
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Where reload requests go
    engine_tx: mpsc::Sender<EngineInput>,
    /// Engine events, re-subscribed per subscribing client
    events: broadcast::Sender<EngineEvent>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
    bindings: Vec<BindingSummary>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
            bindings: Vec::new(),
        }
    }

    /// Fold an engine event into the status snapshot
    fn apply(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::CommandStarted { trigger, .. } => {
                self.status.armed = Some(trigger.clone());
            }
            EngineEvent::CommandStopped { .. } => {
                self.status.armed = None;
            }
            EngineEvent::ConfigurationReloaded {
                generation,
                strategy,
                bindings,
            } => {
                self.status.armed = None;
                self.status.generation = *generation;
                self.status.strategy = *strategy;
                self.status.bindings = bindings.len();
                self.bindings = bindings.clone();
            }
            EngineEvent::CommandFailed { .. }
            | EngineEvent::ActionLaunched { .. }
            | EngineEvent::RegistrationFailed { .. }
            | EngineEvent::BindingSkipped { .. }
            | EngineEvent::ConfigurationRejected { .. } => {}
        }
    }
}

/// Everything a client handler needs
#[derive(Clone)]
struct ClientContext {
    state: Arc<RwLock<ServerState>>,
    engine_tx: mpsc::Sender<EngineInput>,
    events: broadcast::Sender<EngineEvent>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        engine_tx: mpsc::Sender<EngineInput>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state: Arc::new(RwLock::new(ServerState::new())),
            shutdown_tx,
            engine_tx,
            events,
        })
    }

    /// Update the status snapshot from an engine event
    pub async fn record_event(&self, event: &EngineEvent) {
        let mut state = self.state.write().await;
        let before = state.status.armed.clone();
        state.apply(event);

        if before != state.status.armed {
            info!(
                from = ?before,
                to = ?state.status.armed,
                "IPC server: armed trigger updated"
            );
        }
    }

    fn context(&self) -> ClientContext {
        ClientContext {
            state: Arc::clone(&self.state),
            engine_tx: self.engine_tx.clone(),
            events: self.events.clone(),
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let ctx = self.context();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, ctx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
async fn handle_client<S>(mut stream: S, ctx: ClientContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut len_buf = [0u8; 4];

    loop {
        // Read message length (4-byte little-endian)
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_LEN {
            warn!(len, "message too large, disconnecting");
            return Ok(());
        }

        // Read message body
        let mut msg_buf = vec![0u8; len];
        stream.read_exact(&mut msg_buf).await?;

        let request: Request = match serde_json::from_slice(&msg_buf) {
            Ok(request) => request,
            Err(e) => {
                let response = Response::Error {
                    code: "bad_request".to_string(),
                    message: e.to_string(),
                };
                send_message(&mut stream, &response).await?;
                continue;
            }
        };

        debug!(?request, "received request");

        if matches!(request, Request::Subscribe) {
            // Subscribe before acknowledging so no event is missed
            let events = ctx.events.subscribe();
            send_message(&mut stream, &Response::Subscribed).await?;
            debug!("client subscribed to notifications");
            return push_events(stream, events).await;
        }

        let response = process_request(request, &ctx).await;
        send_message(&mut stream, &response).await?;
    }
}

/// Forward engine events to a subscribed client until either side closes
async fn push_events<S>(mut stream: S, mut events: broadcast::Receiver<EngineEvent>) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    loop {
        match events.recv().await {
            Ok(event) => send_message(&mut stream, &Response::Event { event }).await?,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

/// Send a length-prefixed JSON message
async fn send_message<S, T>(stream: &mut S, msg: &T) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    stream.write_all(&msg_len).await?;
    stream.write_all(&msg_bytes).await?;

    Ok(())
}

/// Process a request and return a response
async fn process_request(request: Request, ctx: &ClientContext) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => {
            let mut state = ctx.state.write().await;
            state.status.uptime_secs = state.start_time.elapsed().as_secs();
            Response::Status(state.status.clone())
        }

        Request::ListBindings => {
            let state = ctx.state.read().await;
            Response::Bindings {
                bindings: state.bindings.clone(),
            }
        }

        Request::Reload => match ctx.engine_tx.send(EngineInput::Reload).await {
            Ok(()) => {
                info!("reload requested via IPC");
                Response::ReloadQueued
            }
            Err(_) => Response::Error {
                code: "engine_stopped".to_string(),
                message: "hotkey engine is not running".to_string(),
            },
        },

        // Handled by the connection loop
        Request::Subscribe => Response::Subscribed,
    }
}
