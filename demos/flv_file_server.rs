//! FLV File Server - Serves an FLV file as a live HTTP-FLV stream
//!
//! Run with: cargo run --example flv_file_server -- <file.flv> [BIND_ADDR]
//!
//! The file is published as `live/<file stem>` and replayed in real time,
//! following tag timestamps, over and over.
//!
//! ## Playing
//!
//! With ffplay:
//!   ffplay http://localhost:8080/live/<file stem>.flv
//!
//! With VLC:
//!   vlc http://localhost:8080/live/<file stem>.flv
//!
//! # Architecture
//!
//! ```text
//!   file.flv ──► FlvReader ──► replay task ──► StreamRegistry
//!                                                   │
//!                         HttpFlvServer ◄───────────┘
//!                              │
//!                  ┌───────────┼───────────┐
//!                  ▼           ▼           ▼
//!               ffplay        VLC       browser
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use httpflv_rs::server::TcpSubscriberSession;
use httpflv_rs::{
    FlvReader, FlvTag, HttpFlvServer, ServerConfig, StreamKey, StreamRegistry, SubscriberHandler,
};
use tokio::fs::File;
use tokio::io::BufReader;

/// Publisher id used for the replayed file
const FILE_PUBLISHER_ID: u64 = 1;

/// Gap inserted between two loops of the file, in milliseconds
const LOOP_GAP_MS: u32 = 40;

/// Handler that logs every viewer
struct LoggingHandler;

impl SubscriberHandler for LoggingHandler {
    async fn on_subscribe(&self, session: &TcpSubscriberSession) -> bool {
        println!(
            "[{}] Play: {}/{} from {}",
            session.unique_key(),
            session.app_name().unwrap_or_default(),
            session.stream_name().unwrap_or_default(),
            session.remote_addr()
        );
        true
    }

    async fn on_session_closed(&self, session: &TcpSubscriberSession) {
        let stat = session.get_stat();
        println!(
            "[{}] Closed after {} bytes",
            stat.session_id, stat.wrote_bytes_sum
        );
    }
}

/// Replay one pass of the file, shifting timestamps by `offset`
///
/// Returns the last timestamp written.
async fn replay_once(
    path: &Path,
    registry: &StreamRegistry,
    key: &StreamKey,
    offset: u32,
) -> httpflv_rs::Result<u32> {
    let file = File::open(path).await?;
    let mut reader = FlvReader::new(BufReader::new(file));
    reader.read_header().await?;

    let started = Instant::now();
    let mut first_ts = None;
    let mut last_ts = offset;

    while let Some(tag) = reader.read_tag().await? {
        let base = *first_ts.get_or_insert(tag.timestamp);
        let relative = tag.timestamp.saturating_sub(base);

        // Pace the replay by the tag timestamps
        let due = started + Duration::from_millis(u64::from(relative));
        tokio::time::sleep_until(due.into()).await;

        last_ts = offset.wrapping_add(relative);
        let tag = FlvTag::new(tag.tag_type, last_ts, &tag.data())?;
        registry.broadcast(key, tag).await;
    }

    Ok(last_ts)
}

async fn replay_forever(path: PathBuf, registry: Arc<StreamRegistry>, key: StreamKey) {
    let mut offset = 0u32;
    loop {
        match replay_once(&path, &registry, &key, offset).await {
            Ok(last) => {
                tracing::info!(stream = %key, "Reached end of file, looping");
                offset = last.wrapping_add(LOOP_GAP_MS);
            }
            Err(e) => {
                eprintln!("Replay of {} failed: {}", path.display(), e);
                registry.unregister_publisher(&key, FILE_PUBLISHER_ID).await;
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("httpflv_rs=info".parse()?)
                .add_directive("flv_file_server=info".parse()?),
        )
        .init();

    let path = match std::env::args().nth(1) {
        Some(p) => PathBuf::from(p),
        None => {
            eprintln!("usage: flv_file_server <file.flv> [BIND_ADDR]");
            std::process::exit(2);
        }
    };

    let mut config = ServerConfig::default();
    if let Some(addr) = std::env::args().nth(2) {
        let addr: SocketAddr = addr.parse()?;
        config = config.bind(addr);
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or("file name is not valid UTF-8")?
        .to_string();
    let key = StreamKey::new("live", stem.as_str());

    println!("HTTP-FLV File Server");
    println!("====================");
    println!("Serving:      {}", path.display());
    println!("Listening on: {}", config.bind_addr);
    println!();
    println!("Play with:");
    println!("  ffplay http://localhost:{}/live/{}.flv", config.bind_addr.port(), stem);
    println!();
    println!("Press Ctrl+C to stop the server...");
    println!();

    let server = Arc::new(HttpFlvServer::new(config, LoggingHandler));
    let registry = Arc::clone(server.registry());
    registry.register_publisher(&key, FILE_PUBLISHER_ID).await?;

    let replay = tokio::spawn(replay_forever(path, Arc::clone(&registry), key));

    // Run until Ctrl+C
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    replay.abort();
    Ok(())
}
