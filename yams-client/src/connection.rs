//! Connection management.
//!
//! [`ConnectionManager`] owns the Unix socket to the daemon. Inbound bytes,
//! lifecycle changes and reconnect notifications are delivered as
//! [`ConnectionEvent`]s on a single-consumer channel handed out by
//! [`ConnectionManager::new`].

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::paths::resolve_socket_path;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lifecycle state of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disposed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Disposed => write!(f, "disposed"),
        }
    }
}

/// Notifications emitted by a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A stream was established. Any bytes buffered from an earlier stream
    /// are stale.
    Connected,
    /// Bytes read from the stream, in arrival order.
    Data(Bytes),
    /// A read failed; `Closed` follows.
    Error(String),
    /// The stream is gone.
    Closed,
    /// A reconnect attempt is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
}

/// Receiving end of a manager's event channel.
pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

type ConnectFuture = Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    Reconnect,
}

struct Status {
    state: ConnectionState,
    attempts: u32,
    backoff: Duration,
    /// Bumped on every connect and teardown so a stale read task cannot
    /// tear down its successor.
    generation: u64,
    read_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

struct Shared {
    config: ClientConfig,
    socket_path: PathBuf,
    status: Mutex<Status>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    /// Serializes connect attempts.
    connect_lock: tokio::sync::Mutex<()>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

/// A managed connection to the daemon socket.
///
/// Cloning is cheap; clones share the same underlying stream.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Creates a manager (not yet connected) and its event receiver.
    pub fn new(config: ClientConfig) -> (Self, ConnectionEvents) {
        let socket_path = resolve_socket_path(config.socket_path.as_deref());
        let (events, receiver) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            config,
            socket_path,
            status: Mutex::new(Status {
                state: ConnectionState::Disconnected,
                attempts: 0,
                backoff: Duration::ZERO,
                generation: 0,
                read_task: None,
                reconnect_task: None,
            }),
            writer: tokio::sync::Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            events,
        });

        (Self { shared }, receiver)
    }

    /// Returns the resolved daemon socket path.
    pub fn socket_path(&self) -> &Path {
        &self.shared.socket_path
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the number of reconnect attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.status.lock().attempts
    }

    /// Returns the delay used for the most recently scheduled reconnect.
    pub fn current_backoff(&self) -> Duration {
        self.shared.status.lock().backoff
    }

    /// Connects to the daemon.
    ///
    /// Does nothing when already connected. A failure or timeout is returned
    /// to the caller and does not schedule a retry, though a retry that is
    /// already scheduled stays armed.
    pub async fn connect(&self) -> Result<(), ClientError> {
        establish(self.shared.clone(), Origin::Caller).await
    }

    /// Writes a complete frame to the stream.
    ///
    /// Fails immediately unless connected; nothing is queued.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), ClientError> {
        match self.state() {
            ConnectionState::Connected => {}
            ConnectionState::Disposed => return Err(ClientError::Disposed),
            _ => return Err(ClientError::NotConnected),
        }

        let mut writer_guard = self.shared.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(bytes).await?;
        Ok(())
    }

    /// Closes the stream and cancels any scheduled reconnect.
    pub async fn disconnect(&self) {
        self.shared.shut_down(ConnectionState::Disconnected).await;
    }

    /// Disconnects and refuses every later connect.
    pub async fn dispose(&self) {
        self.shared.shut_down(ConnectionState::Disposed).await;
    }

    /// Drops the current stream as if the daemon had closed it, letting the
    /// reconnect policy take over.
    pub async fn reset(&self) {
        let (generation, read_task) = {
            let mut status = self.shared.status.lock();
            if status.state != ConnectionState::Connected {
                return;
            }
            (status.generation, status.read_task.take())
        };

        if let Some(task) = read_task {
            task.abort();
        }
        tracing::warn!("Resetting daemon connection");
        self.shared.handle_close(generation).await;
    }

    /// Stops background tasks without waiting. Used when the owner is dropped.
    pub(crate) fn abort(&self) {
        let mut status = self.shared.status.lock();
        status.state = ConnectionState::Disposed;
        status.generation += 1;
        if let Some(task) = status.read_task.take() {
            task.abort();
        }
        if let Some(task) = status.reconnect_task.take() {
            task.abort();
        }
    }
}

fn establish(shared: Arc<Shared>, origin: Origin) -> ConnectFuture {
    Box::pin(async move {
        let _connecting = shared.connect_lock.lock().await;

        let resumed = {
            let mut status = shared.status.lock();
            match status.state {
                ConnectionState::Disposed => return Err(ClientError::Disposed),
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Reconnecting => {}
                // The scheduled retry lost a race with disconnect().
                _ if origin == Origin::Reconnect => return Ok(()),
                _ => {}
            }
            let resumed = status.state == ConnectionState::Reconnecting;
            status.state = ConnectionState::Connecting;
            resumed
        };

        let path = shared.socket_path.clone();
        let timeout = shared.config.connect_timeout();
        tracing::debug!("Connecting to {}...", path.display());

        let stream = match tokio::time::timeout(timeout, UnixStream::connect(&path)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                tracing::debug!("Connection failed: {}", source);
                shared.connect_failed(origin, resumed);
                return Err(ClientError::Connect { path, source });
            }
            Err(_) => {
                tracing::debug!("Connection timeout");
                shared.connect_failed(origin, resumed);
                return Err(ClientError::ConnectTimeout { path, timeout });
            }
        };

        let (read_half, write_half) = stream.into_split();

        let mut writer = shared.writer.lock().await;
        let generation = {
            let mut status = shared.status.lock();
            match status.state {
                ConnectionState::Connecting => {}
                ConnectionState::Disposed => return Err(ClientError::Disposed),
                _ => return Err(ClientError::ConnectionClosed),
            }
            status.state = ConnectionState::Connected;
            status.attempts = 0;
            status.backoff = Duration::ZERO;
            status.generation += 1;
            status.generation
        };
        *writer = Some(write_half);
        drop(writer);

        tracing::info!("Connected to daemon at {}", path.display());
        let _ = shared.events.send(ConnectionEvent::Connected);

        let task = tokio::spawn(read_loop(shared.clone(), read_half, generation));
        let mut status = shared.status.lock();
        if status.generation == generation {
            status.read_task = Some(task);
        } else {
            task.abort();
        }

        Ok(())
    })
}

async fn read_loop(shared: Arc<Shared>, mut reader: OwnedReadHalf, generation: u64) {
    let mut buf = vec![0u8; shared.config.read_buffer_size];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("read_loop: connection closed by daemon");
                break;
            }
            Ok(n) => {
                tracing::trace!("read_loop: received {} bytes", n);
                let _ = shared
                    .events
                    .send(ConnectionEvent::Data(Bytes::copy_from_slice(&buf[..n])));
            }
            Err(e) => {
                tracing::warn!("read_loop: read failed: {}", e);
                let _ = shared.events.send(ConnectionEvent::Error(e.to_string()));
                break;
            }
        }
    }

    shared.handle_close(generation).await;
}

impl Shared {
    /// Advances the backoff if the policy allows another attempt.
    fn next_retry(&self, status: &mut Status) -> Option<(u32, Duration)> {
        let policy = &self.config.reconnect;
        if !policy.enabled || !policy.allows_attempt(status.attempts) {
            status.state = ConnectionState::Disconnected;
            return None;
        }

        status.attempts += 1;
        status.backoff = policy.delay_for_attempt(status.attempts);
        status.state = ConnectionState::Reconnecting;
        Some((status.attempts, status.backoff))
    }

    /// `resumed` marks a caller attempt made while a retry was already
    /// scheduled; that retry is still armed, so the state goes back to
    /// `Reconnecting`.
    fn connect_failed(self: &Arc<Self>, origin: Origin, resumed: bool) {
        let retry = {
            let mut status = self.status.lock();
            if status.state == ConnectionState::Disposed {
                return;
            }
            if origin == Origin::Reconnect {
                self.next_retry(&mut status)
            } else if resumed && status.state == ConnectionState::Connecting {
                status.state = ConnectionState::Reconnecting;
                None
            } else {
                status.state = ConnectionState::Disconnected;
                None
            }
        };

        if let Some((attempt, delay)) = retry {
            self.schedule_reconnect(attempt, delay);
        } else if origin == Origin::Reconnect {
            tracing::warn!("Giving up on reconnecting to daemon");
        }
    }

    /// Handles the end of the stream owned by `generation`.
    async fn handle_close(self: &Arc<Self>, generation: u64) {
        let mut writer = self.writer.lock().await;
        let retry = {
            let mut status = self.status.lock();
            if status.generation != generation || status.state != ConnectionState::Connected {
                return;
            }
            *writer = None;
            status.read_task = None;
            self.next_retry(&mut status)
        };
        drop(writer);

        tracing::info!("Connection to daemon closed");
        let _ = self.events.send(ConnectionEvent::Closed);

        if let Some((attempt, delay)) = retry {
            self.schedule_reconnect(attempt, delay);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, attempt: u32, delay: Duration) {
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect to daemon"
        );
        let _ = self
            .events
            .send(ConnectionEvent::Reconnecting { attempt, delay });

        let shared = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = establish(shared, Origin::Reconnect).await {
                tracing::debug!("Reconnect attempt {} failed: {}", attempt, e);
            }
        });

        // The previous handle may belong to the task running this call, so
        // it is detached rather than aborted.
        self.status.lock().reconnect_task = Some(task);
    }

    async fn shut_down(&self, final_state: ConnectionState) {
        let (read_task, reconnect_task, was_open) = {
            let mut status = self.status.lock();
            let was_open = status.state == ConnectionState::Connected;
            if status.state != ConnectionState::Disposed {
                status.state = final_state;
            }
            status.generation += 1;
            status.attempts = 0;
            status.backoff = Duration::ZERO;
            (
                status.read_task.take(),
                status.reconnect_task.take(),
                was_open,
            )
        };

        if let Some(task) = reconnect_task {
            task.abort();
        }
        if let Some(task) = read_task {
            task.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            tracing::debug!("Shutting down writer");
            let _ = writer.shutdown().await;
        }

        if was_open {
            tracing::info!("Disconnected from daemon ({})", final_state);
            let _ = self.events.send(ConnectionEvent::Closed);
        }
    }
}
