//! High-level client API.
//!
//! [`DaemonClient`] multiplexes concurrent requests over one
//! [`ConnectionManager`]. Every request gets a fresh id; a background
//! dispatcher task reads frames off the connection and completes the
//! matching pending request.

use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionEvents, ConnectionManager, ConnectionState};
use crate::error::ClientError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use yams_protocol::envelope::*;
use yams_protocol::{ErrorCode, Frame, FrameFlags, FrameReader};

type PendingMap = Mutex<HashMap<u64, PendingRequest>>;

struct PendingRequest {
    tx: oneshot::Sender<Result<Envelope, ClientError>>,
    /// Raw payloads of the chunks received so far.
    chunks: Vec<Bytes>,
}

/// Removes a pending entry when `send` returns or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    request_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.request_id);
    }
}

/// Client for the YAMS daemon.
///
/// Must be created inside a Tokio runtime. Dropping the client stops its
/// background tasks.
pub struct DaemonClient {
    conn: ConnectionManager,
    config: ClientConfig,
    next_id: AtomicU64,
    pending: Arc<PendingMap>,
    disposed: AtomicBool,
    dispatcher: JoinHandle<()>,
}

impl DaemonClient {
    /// Creates a new client. Does not connect.
    pub fn new(config: ClientConfig) -> Self {
        let (conn, events) = ConnectionManager::new(config.clone());
        let pending: Arc<PendingMap> = Arc::default();

        let dispatcher = Dispatcher {
            conn: conn.clone(),
            pending: pending.clone(),
            reader: FrameReader::new(config.max_frame_size),
        };
        let dispatcher = tokio::spawn(dispatcher.run(events));

        Self {
            conn,
            config,
            next_id: AtomicU64::new(1),
            pending,
            disposed: AtomicBool::new(false),
            dispatcher,
        }
    }

    /// Creates a client and connects it.
    pub async fn connect_with(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Self::new(config);
        client.connect().await?;
        Ok(client)
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    pub async fn disconnect(&self) {
        self.conn.disconnect().await;
    }

    /// Rejects every outstanding request and shuts the connection down for good.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        let rejected = reject_all(&self.pending, || ClientError::Disposed);
        if rejected > 0 {
            tracing::debug!("Rejected {} pending requests on dispose", rejected);
        }
        self.conn.dispose().await;
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn socket_path(&self) -> &Path {
        self.conn.socket_path()
    }

    /// Returns the number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends a request and waits for its response.
    ///
    /// `timeout` bounds both the write and the wait; `None` uses the
    /// configured request timeout. The returned envelope never carries an
    /// error payload: daemon errors surface as [`ClientError::Daemon`].
    pub async fn send(
        &self,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ClientError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ClientError::Disposed);
        }

        let timeout = timeout.unwrap_or_else(|| self.config.request_timeout());
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let case = payload.case();
        let envelope = Envelope::new(request_id, self.config.client_version.clone(), payload);
        let frame = envelope.encode_frame(FrameFlags::empty())?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            request_id,
            PendingRequest {
                tx,
                chunks: Vec::new(),
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id,
        };

        tracing::debug!(request_id, %case, "Sending request");

        let exchange = async {
            self.conn.write(&frame).await?;
            rx.await.map_err(|_| ClientError::ConnectionClosed)?
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(request_id, "Request timed out after {:?}", timeout);
                Err(ClientError::Timeout {
                    request_id,
                    timeout,
                })
            }
        }
    }

    async fn request(&self, payload: Payload) -> Result<Payload, ClientError> {
        Ok(self.send(payload, None).await?.payload)
    }

    // =========================================================================
    // Typed operations
    // =========================================================================

    /// Pings the daemon.
    pub async fn ping(&self) -> Result<PingResponse, ClientError> {
        match self.request(Payload::PingRequest(PingRequest {})).await? {
            Payload::PingResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::PingResponse, &other)),
        }
    }

    /// Gets daemon status.
    pub async fn status(&self, detailed: bool) -> Result<StatusResponse, ClientError> {
        let request = StatusRequest { detailed };
        match self.request(Payload::StatusRequest(request)).await? {
            Payload::StatusResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::StatusResponse, &other)),
        }
    }

    /// Adds a document (or a directory of documents) to the store.
    pub async fn add_document(
        &self,
        request: AddDocumentRequest,
    ) -> Result<AddDocumentResponse, ClientError> {
        match self.request(Payload::AddDocumentRequest(request)).await? {
            Payload::AddDocumentResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::AddDocumentResponse, &other)),
        }
    }

    /// Fetches document content by hash or name.
    pub async fn cat(&self, request: CatRequest) -> Result<CatResponse, ClientError> {
        match self.request(Payload::CatRequest(request)).await? {
            Payload::CatResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::CatResponse, &other)),
        }
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, ClientError> {
        match self.request(Payload::SearchRequest(request)).await? {
            Payload::SearchResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::SearchResponse, &other)),
        }
    }

    pub async fn list(&self, request: ListRequest) -> Result<ListResponse, ClientError> {
        match self.request(Payload::ListRequest(request)).await? {
            Payload::ListResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::ListResponse, &other)),
        }
    }

    pub async fn grep(&self, request: GrepRequest) -> Result<GrepResponse, ClientError> {
        match self.request(Payload::GrepRequest(request)).await? {
            Payload::GrepResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::GrepResponse, &other)),
        }
    }

    /// Updates document content, tags or metadata.
    pub async fn update_document(
        &self,
        request: UpdateDocumentRequest,
    ) -> Result<UpdateDocumentResponse, ClientError> {
        match self.request(Payload::UpdateDocumentRequest(request)).await? {
            Payload::UpdateDocumentResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::UpdateDocumentResponse, &other)),
        }
    }

    /// Walks the knowledge graph around a document.
    pub async fn graph_query(
        &self,
        request: GraphQueryRequest,
    ) -> Result<GraphQueryResponse, ClientError> {
        match self.request(Payload::GraphQueryRequest(request)).await? {
            Payload::GraphQueryResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::GraphQueryResponse, &other)),
        }
    }

    /// Switches the daemon's active session.
    pub async fn switch_session(
        &self,
        name: impl Into<String>,
    ) -> Result<SwitchSessionResponse, ClientError> {
        let request = SwitchSessionRequest { name: name.into() };
        match self.request(Payload::SwitchSessionRequest(request)).await? {
            Payload::SwitchSessionResponse(response) => Ok(response),
            other => Err(unexpected(PayloadCase::SwitchSessionResponse, &other)),
        }
    }
}

impl Drop for DaemonClient {
    fn drop(&mut self) {
        self.dispatcher.abort();
        self.conn.abort();
    }
}

fn unexpected(expected: PayloadCase, actual: &Payload) -> ClientError {
    ClientError::UnexpectedResponse {
        expected,
        actual: actual.case(),
    }
}

/// Fails every pending request. Returns how many were pending.
fn reject_all(pending: &PendingMap, make_error: impl Fn() -> ClientError) -> usize {
    let drained: Vec<_> = pending.lock().drain().collect();
    let count = drained.len();
    for (_, request) in drained {
        let _ = request.tx.send(Err(make_error()));
    }
    count
}

/// Routes one frame to its pending request.
fn dispatch(pending: &PendingMap, frame: Frame) {
    let envelope = match Envelope::from_bytes(&frame.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!("Dropping undecodable frame: {}", e);
            return;
        }
    };

    let request_id = envelope.request_id;
    let flags = frame.flags();

    let completed = {
        let mut map = pending.lock();
        let Some(entry) = map.get_mut(&request_id) else {
            tracing::debug!(request_id, "Dropping response for unknown request");
            return;
        };

        if flags.is_chunked() && !flags.is_error() && !envelope.payload.is_error() {
            entry.chunks.push(frame.payload.clone());
            if !flags.is_last_chunk() {
                tracing::trace!(request_id, chunks = entry.chunks.len(), "Buffered chunk");
                return;
            }
            tracing::debug!(request_id, chunks = entry.chunks.len(), "Chunked response complete");
        }

        map.remove(&request_id)
    };

    let Some(request) = completed else {
        return;
    };

    let result = if flags.is_error() || envelope.payload.is_error() {
        Err(daemon_error(envelope.payload))
    } else {
        Ok(envelope)
    };

    if request.tx.send(result).is_err() {
        tracing::debug!(request_id, "Requester went away before the response arrived");
    }
}

fn daemon_error(payload: Payload) -> ClientError {
    match payload {
        Payload::Error(error) => ClientError::Daemon {
            code: error.error_code(),
            message: error.message,
        },
        other => ClientError::Daemon {
            code: ErrorCode::Unknown,
            message: format!("daemon flagged {} as an error", other.case()),
        },
    }
}

/// Background task consuming connection events.
struct Dispatcher {
    conn: ConnectionManager,
    pending: Arc<PendingMap>,
    reader: FrameReader,
}

impl Dispatcher {
    async fn run(mut self, mut events: ConnectionEvents) {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Connected => self.reader.clear(),
                ConnectionEvent::Data(bytes) => self.on_data(&bytes).await,
                ConnectionEvent::Error(message) => {
                    tracing::warn!("Connection error: {}", message);
                }
                ConnectionEvent::Closed => {
                    self.reader.clear();
                    let rejected = reject_all(&self.pending, || ClientError::ConnectionClosed);
                    if rejected > 0 {
                        tracing::warn!("Connection closed with {} requests pending", rejected);
                    }
                }
                ConnectionEvent::Reconnecting { attempt, delay } => {
                    tracing::debug!(attempt, "Waiting {:?} before reconnecting", delay);
                }
            }
        }
        tracing::debug!("Dispatcher stopped");
    }

    async fn on_data(&mut self, bytes: &[u8]) {
        self.reader.append(bytes);

        let mut fatal = None;
        for result in self.reader.drain() {
            match result {
                Ok(frame) => dispatch(&self.pending, frame),
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = fatal {
            let reason = e.to_string();
            tracing::error!("Frame stream corrupted: {}", reason);
            reject_all(&self.pending, || ClientError::StreamCorrupted {
                reason: reason.clone(),
            });
            self.reader.clear();
            self.conn.reset().await;
        }
    }
}
