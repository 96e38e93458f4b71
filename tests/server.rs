//! End-to-end tests over loopback TCP

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use httpflv_rs::protocol::HTTP_RESPONSE_HEADER;
use httpflv_rs::registry::RegistryConfig;
use httpflv_rs::server::TcpSubscriberSession;
use httpflv_rs::{FlvTag, HttpFlvServer, ServerConfig, StreamKey, SubscriberHandler, FLV_HEADER};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

struct TokenHandler;

impl SubscriberHandler for TokenHandler {
    async fn on_subscribe(&self, session: &TcpSubscriberSession) -> bool {
        session.raw_query() == Some("token=secret")
    }
}

async fn start_server<H: SubscriberHandler>(
    handler: H,
    registry_config: RegistryConfig,
) -> (Arc<HttpFlvServer<H>>, SocketAddr, oneshot::Sender<()>) {
    start_server_with(ServerConfig::default(), handler, registry_config).await
}

async fn start_server_with<H: SubscriberHandler>(
    config: ServerConfig,
    handler: H,
    registry_config: RegistryConfig,
) -> (Arc<HttpFlvServer<H>>, SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(HttpFlvServer::with_registry_config(
        config.bind(addr),
        handler,
        registry_config,
    ));

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let running = Arc::clone(&server);
    tokio::spawn(async move {
        running
            .serve_until(listener, async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    (server, addr, shutdown_tx)
}

async fn request(addr: SocketAddr, path: &str) -> TcpStream {
    let mut client = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
    client.write_all(req.as_bytes()).await.unwrap();
    client
}

async fn read_n(client: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .unwrap();
    buf
}

/// Bytes the server sent before closing
async fn read_until_closed(client: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("connection not closed");
        match read {
            Ok(0) | Err(_) => return out,
            Ok(n) => out.extend_from_slice(&buf[..n]),
        }
    }
}

async fn wait_for_sessions<H: SubscriberHandler>(server: &HttpFlvServer<H>, expected: usize) {
    for _ in 0..250 {
        if server.session_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session count never reached {}", expected);
}

#[tokio::test]
async fn test_subscriber_receives_catchup_and_live_tags() {
    let (server, addr, _shutdown) = start_server((), RegistryConfig::default()).await;
    let registry = Arc::clone(server.registry());
    let key = StreamKey::new("live", "room1");

    registry.register_publisher(&key, 1).await.unwrap();
    let metadata = FlvTag::script(0, &[0x02, 0x00, 0x0A]).unwrap();
    let video_header = FlvTag::video(0, &[0x17, 0x00, 0x00, 0x00, 0x00, 0x01]).unwrap();
    let keyframe = FlvTag::video(40, &[0x17, 0x01, 0x00, 0x00, 0x00, 0xAB]).unwrap();
    registry.broadcast(&key, metadata.clone()).await;
    registry.broadcast(&key, video_header.clone()).await;
    registry.broadcast(&key, keyframe.clone()).await;

    let mut client = request(addr, "/live/room1.flv?token=abc").await;

    let preamble = read_n(&mut client, HTTP_RESPONSE_HEADER.len()).await;
    assert_eq!(preamble, HTTP_RESPONSE_HEADER);
    assert_eq!(read_n(&mut client, FLV_HEADER.len()).await, FLV_HEADER);
    for tag in [&metadata, &video_header, &keyframe] {
        assert_eq!(read_n(&mut client, tag.raw().len()).await, &tag.raw()[..]);
    }

    let stats = server.session_stats().await;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].protocol, "HTTP-FLV");
    assert!(stats[0].session_id.starts_with("FLVSUB"));
    assert_eq!(stats[0].remote_addr, client.local_addr().unwrap().to_string());

    let live = FlvTag::audio(60, &[0xAF, 0x01, 0x21, 0x10]).unwrap();
    assert_eq!(registry.broadcast(&key, live.clone()).await, 1);
    assert_eq!(read_n(&mut client, live.raw().len()).await, &live.raw()[..]);

    // Viewer hangs up
    drop(client);
    wait_for_sessions(&server, 0).await;
    let stats = registry.get_stream_stats(&key).await.unwrap();
    assert_eq!(stats.subscriber_count, 0);
}

#[tokio::test]
async fn test_bad_request_gets_no_response() {
    let (server, addr, _shutdown) = start_server((), RegistryConfig::default()).await;
    let key = StreamKey::new("live", "room1");
    server.registry().register_publisher(&key, 1).await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"POST /live/room1.flv HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    assert!(read_until_closed(&mut client).await.is_empty());

    let mut client = request(addr, "/live/room1.mp4").await;
    assert!(read_until_closed(&mut client).await.is_empty());

    assert_eq!(server.session_count().await, 0);
}

#[tokio::test]
async fn test_unknown_stream_gets_no_response() {
    let (server, addr, _shutdown) = start_server((), RegistryConfig::default()).await;

    let mut client = request(addr, "/live/nobody.flv").await;
    assert!(read_until_closed(&mut client).await.is_empty());
    assert_eq!(server.session_count().await, 0);
}

#[tokio::test]
async fn test_handler_rejects_subscriber() {
    let (server, addr, _shutdown) = start_server(TokenHandler, RegistryConfig::default()).await;
    let key = StreamKey::new("live", "room1");
    server.registry().register_publisher(&key, 1).await.unwrap();

    let mut client = request(addr, "/live/room1.flv?token=wrong").await;
    assert!(read_until_closed(&mut client).await.is_empty());

    let mut client = request(addr, "/live/room1.flv?token=secret").await;
    let preamble = read_n(&mut client, HTTP_RESPONSE_HEADER.len()).await;
    assert_eq!(preamble, HTTP_RESPONSE_HEADER);
}

#[tokio::test]
async fn test_stream_end_closes_viewer() {
    let registry_config = RegistryConfig::default()
        .publisher_grace_period(Duration::from_millis(10))
        .cleanup_interval(Duration::from_secs(3600));
    let (server, addr, _shutdown) = start_server((), registry_config).await;
    let registry = Arc::clone(server.registry());
    let key = StreamKey::new("live", "room1");
    registry.register_publisher(&key, 7).await.unwrap();

    let mut client = request(addr, "/live/room1.flv").await;
    read_n(&mut client, HTTP_RESPONSE_HEADER.len() + FLV_HEADER.len()).await;

    registry.unregister_publisher(&key, 7).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    registry.cleanup().await;

    assert!(read_until_closed(&mut client).await.is_empty());
    wait_for_sessions(&server, 0).await;
}

#[tokio::test]
async fn test_idle_viewer_disposed_by_monitor() {
    let config = ServerConfig::default().monitor_interval(Duration::from_secs(1));
    let (server, addr, _shutdown) = start_server_with(config, (), RegistryConfig::default()).await;
    let key = StreamKey::new("live", "quiet");
    server.registry().register_publisher(&key, 1).await.unwrap();

    let mut client = request(addr, "/live/quiet.flv").await;
    read_n(&mut client, HTTP_RESPONSE_HEADER.len() + FLV_HEADER.len()).await;
    assert_eq!(server.session_count().await, 1);

    // Nothing is broadcast: the first check sets the baseline, the next
    // one sees no write progress and tears the session down
    assert!(read_until_closed(&mut client).await.is_empty());
    wait_for_sessions(&server, 0).await;

    // The stream itself is untouched
    assert!(server.registry().has_active_stream(&key).await);
}
