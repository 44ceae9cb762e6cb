//! End-to-end tests against an in-process mock daemon.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use yams_client::{
    ClientConfig, ClientError, ConnectionState, DaemonClient, ReconnectConfig,
};
use yams_protocol::envelope::*;
use yams_protocol::{ErrorCode, FrameFlags, FrameReader, PayloadCase, FRAME_HEADER_SIZE};

/// Server side of one accepted connection.
struct MockDaemon {
    stream: UnixStream,
    reader: FrameReader,
}

impl MockDaemon {
    async fn accept(listener: &UnixListener) -> Self {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("no client connected")
            .unwrap();
        Self {
            stream,
            reader: FrameReader::default(),
        }
    }

    async fn next_request(&mut self) -> Envelope {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.reader.try_read_frame().unwrap() {
                return Envelope::from_bytes(&frame.payload).unwrap();
            }
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed the connection");
            self.reader.append(&buf[..n]);
        }
    }

    async fn reply(&mut self, request_id: u64, payload: Payload, flags: FrameFlags) {
        let frame = Envelope::new(request_id, "mock-daemon", payload)
            .encode_frame(flags)
            .unwrap();
        self.write_raw(&frame).await;
    }

    async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }
}

fn bind() -> (TempDir, UnixListener, ClientConfig) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yams-daemon.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let config = ClientConfig::new()
        .with_socket_path(path)
        .with_reconnect(ReconnectConfig::disabled());
    (dir, listener, config)
}

async fn connected(config: ClientConfig, listener: &UnixListener) -> (DaemonClient, MockDaemon) {
    let client = DaemonClient::connect_with(config).await.unwrap();
    let daemon = MockDaemon::accept(listener).await;
    (client, daemon)
}

#[tokio::test]
async fn test_ping_round_trip() {
    let (_dir, listener, config) = bind();
    let (client, mut daemon) = connected(config, &listener).await;

    let (response, _) = tokio::join!(client.ping(), async {
        let request = daemon.next_request().await;
        assert_eq!(request.case(), PayloadCase::PingRequest);
        assert_eq!(request.request_id, 1);
        assert_eq!(request.version, yams_protocol::PROTOCOL_VERSION);
        daemon
            .reply(
                request.request_id,
                Payload::PingResponse(PingResponse {
                    server_time_ms: Some(42),
                }),
                FrameFlags::empty(),
            )
            .await;
    });

    assert_eq!(response.unwrap().server_time_ms, Some(42));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_out_of_order_responses() {
    let (_dir, listener, config) = bind();
    let (client, mut daemon) = connected(config, &listener).await;

    let search = SearchRequest {
        query: "rust".to_string(),
        limit: 10,
        ..Default::default()
    };
    let cat = CatRequest {
        name: Some("notes.md".to_string()),
        ..Default::default()
    };

    let (searched, listed, fetched, _) = tokio::join!(
        client.search(search),
        client.list(ListRequest::default()),
        client.cat(cat),
        async {
            let mut requests = Vec::new();
            for _ in 0..3 {
                requests.push(daemon.next_request().await);
            }

            // Answer in reverse arrival order.
            for request in requests.into_iter().rev() {
                let payload = match request.payload {
                    Payload::SearchRequest(req) => Payload::SearchResponse(SearchResponse {
                        total_count: 1,
                        results: vec![SearchResult {
                            id: req.query,
                            score: 0.9,
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    Payload::ListRequest(_) => Payload::ListResponse(ListResponse {
                        total_count: 7,
                        ..Default::default()
                    }),
                    Payload::CatRequest(req) => Payload::CatResponse(CatResponse {
                        name: req.name.unwrap_or_default(),
                        content: "hello".to_string(),
                        ..Default::default()
                    }),
                    other => panic!("unexpected request {:?}", other.case()),
                };
                daemon
                    .reply(request.request_id, payload, FrameFlags::empty())
                    .await;
            }
        }
    );

    assert_eq!(searched.unwrap().results[0].id, "rust");
    assert_eq!(listed.unwrap().total_count, 7);
    let fetched = fetched.unwrap();
    assert_eq!(fetched.name, "notes.md");
    assert_eq!(fetched.content, "hello");
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_timeout_does_not_affect_other_requests() {
    let (_dir, listener, config) = bind();
    let (client, mut daemon) = connected(config, &listener).await;

    let (timed_out, answered, _) = tokio::join!(
        client.send(
            Payload::PingRequest(PingRequest {}),
            Some(Duration::from_millis(50))
        ),
        client.send(
            Payload::StatusRequest(StatusRequest::default()),
            Some(Duration::from_secs(5))
        ),
        async {
            let first = daemon.next_request().await;
            let second = daemon.next_request().await;
            tokio::time::sleep(Duration::from_millis(200)).await;

            for request in [first, second] {
                let payload = match request.case() {
                    PayloadCase::PingRequest => Payload::PingResponse(PingResponse::default()),
                    _ => Payload::StatusResponse(StatusResponse {
                        running: true,
                        ..Default::default()
                    }),
                };
                daemon
                    .reply(request.request_id, payload, FrameFlags::empty())
                    .await;
            }
        }
    );

    match timed_out {
        Err(ClientError::Timeout {
            request_id,
            timeout,
        }) => {
            assert_eq!(request_id, 1);
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {:?}", other),
    }

    let answered = answered.unwrap();
    assert!(matches!(
        answered.payload,
        Payload::StatusResponse(StatusResponse { running: true, .. })
    ));
    assert_eq!(client.pending_count(), 0);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_dispose_rejects_every_pending_request() {
    let (_dir, listener, config) = bind();
    let (client, _daemon) = connected(config, &listener).await;
    let client = Arc::new(client);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.ping().await })
        })
        .collect();

    tokio::time::timeout(Duration::from_secs(5), async {
        while client.pending_count() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    client.dispose().await;

    for handle in handles {
        assert!(matches!(handle.await.unwrap(), Err(ClientError::Disposed)));
    }
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.state(), ConnectionState::Disposed);
    assert!(matches!(client.connect().await, Err(ClientError::Disposed)));
}

#[tokio::test]
async fn test_daemon_error_payload() {
    let (_dir, listener, config) = bind();
    let (client, mut daemon) = connected(config, &listener).await;

    let request = CatRequest {
        hash: Some("deadbeef".to_string()),
        ..Default::default()
    };
    let (result, _) = tokio::join!(client.cat(request), async {
        let request = daemon.next_request().await;
        daemon
            .reply(
                request.request_id,
                Payload::Error(ErrorResponse::new(ErrorCode::NotFound, "no such document")),
                FrameFlags::empty().with_error(),
            )
            .await;
    });

    match result {
        Err(ClientError::Daemon { code, message }) => {
            assert_eq!(code, ErrorCode::NotFound);
            assert_eq!(message, "no such document");
        }
        other => panic!("expected daemon error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chunked_response_resolves_on_last_chunk() {
    let (_dir, listener, config) = bind();
    let (client, mut daemon) = connected(config, &listener).await;

    let request = GrepRequest {
        pattern: "fn main".to_string(),
        ..Default::default()
    };
    let (result, _) = tokio::join!(client.grep(request), async {
        let request = daemon.next_request().await;
        let chunked = FrameFlags::empty().with_chunked();
        for total in 1..=3u64 {
            let flags = if total == 3 {
                chunked.with_last_chunk()
            } else {
                chunked
            };
            let payload = Payload::GrepResponse(GrepResponse {
                total_matches: total,
                ..Default::default()
            });
            daemon.reply(request.request_id, payload, flags).await;
        }
    });

    assert_eq!(result.unwrap().total_matches, 3);
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_mismatched_response_case() {
    let (_dir, listener, config) = bind();
    let (client, mut daemon) = connected(config, &listener).await;

    let (result, _) = tokio::join!(client.search(SearchRequest::default()), async {
        let request = daemon.next_request().await;
        daemon
            .reply(
                request.request_id,
                Payload::ListResponse(ListResponse::default()),
                FrameFlags::empty(),
            )
            .await;
    });

    match result {
        Err(ClientError::UnexpectedResponse { expected, actual }) => {
            assert_eq!(expected, PayloadCase::SearchResponse);
            assert_eq!(actual, PayloadCase::ListResponse);
        }
        other => panic!("expected unexpected-response error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_split_and_garbage_prefixed_frames() {
    let (_dir, listener, config) = bind();
    let (client, mut daemon) = connected(config, &listener).await;

    let (result, _) = tokio::join!(client.switch_session("research"), async {
        let request = daemon.next_request().await;
        let frame = Envelope::new(
            request.request_id,
            "mock-daemon",
            Payload::SwitchSessionResponse(SwitchSessionResponse {
                name: "research".to_string(),
                previous: Some("default".to_string()),
            }),
        )
        .encode_frame(FrameFlags::empty())
        .unwrap();

        // Unknown id first, then stray bytes, then the real frame in two writes.
        daemon
            .reply(
                9_999,
                Payload::PingResponse(PingResponse::default()),
                FrameFlags::empty(),
            )
            .await;
        daemon.write_raw(b"\x00\x01\x02").await;
        daemon.write_raw(&frame[..FRAME_HEADER_SIZE + 3]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        daemon.write_raw(&frame[FRAME_HEADER_SIZE + 3..]).await;
    });

    let response = result.unwrap();
    assert_eq!(response.name, "research");
    assert_eq!(response.previous.as_deref(), Some("default"));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_send_while_disconnected() {
    let (_dir, _listener, config) = bind();
    let client = DaemonClient::new(config);

    let result = client.status(false).await;
    assert!(matches!(result, Err(ClientError::NotConnected)));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_daemon_close_rejects_pending() {
    let (_dir, listener, config) = bind();
    let (client, mut daemon) = connected(config, &listener).await;

    let (result, _) = tokio::join!(client.ping(), async move {
        daemon.next_request().await;
        drop(daemon);
    });

    assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_checksum_mismatch_resets_connection() {
    let (_dir, listener, config) = bind();
    let (client, mut daemon) = connected(config, &listener).await;

    let (result, _) = tokio::join!(client.ping(), async {
        let request = daemon.next_request().await;
        let mut frame = Envelope::new(
            request.request_id,
            "mock-daemon",
            Payload::PingResponse(PingResponse::default()),
        )
        .encode_frame(FrameFlags::empty())
        .unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        daemon.write_raw(&frame).await;
    });

    assert!(matches!(result, Err(ClientError::StreamCorrupted { .. })));
    assert_eq!(client.pending_count(), 0);

    tokio::time::timeout(Duration::from_secs(5), async {
        while client.state() != ConnectionState::Disconnected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_requests_resume_after_reconnect() {
    let (_dir, listener, config) = bind();
    let config = config.with_reconnect(ReconnectConfig {
        enabled: true,
        base_delay_ms: 10,
        max_delay_ms: 50,
        max_attempts: None,
    });
    let (client, daemon) = connected(config, &listener).await;

    drop(daemon);
    let mut daemon = MockDaemon::accept(&listener).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while !client.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let (response, _) = tokio::join!(client.ping(), async {
        let request = daemon.next_request().await;
        daemon
            .reply(
                request.request_id,
                Payload::PingResponse(PingResponse::default()),
                FrameFlags::empty(),
            )
            .await;
    });

    assert!(response.is_ok());
    assert_eq!(client.connection().reconnect_attempts(), 0);
}
