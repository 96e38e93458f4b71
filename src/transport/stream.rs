//! Transport over any tokio byte stream
//!
//! The stream is split into independently locked read and write halves so
//! the relay path (writes), the hang-up detector (reads) and the monitor
//! (close) never wait on each other. Closing flips a `watch` flag that wakes
//! any pending read or write.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

use super::{Transport, TransportStat};

/// [`Transport`] implementation backed by an `AsyncRead + AsyncWrite` stream
pub struct IoTransport<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    remote_addr: String,
    read_bytes_sum: AtomicU64,
    wrote_bytes_sum: AtomicU64,
    closed: watch::Sender<bool>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<S> IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a stream. No timeouts are applied until configured.
    pub fn new(stream: S, remote_addr: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (closed, _) = watch::channel(false);

        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            remote_addr: remote_addr.into(),
            read_bytes_sum: AtomicU64::new(0),
            wrote_bytes_sum: AtomicU64::new(0),
            closed,
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Bound every read by `timeout`
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bound every write by `timeout`
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Check whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl IoTransport<TcpStream> {
    /// Wrap an accepted TCP connection, using its peer address as the remote address
    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self::new(stream, peer.to_string()))
    }
}

impl<S> Transport for IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let closed = self.closed.subscribe();
        if self.is_closed() {
            return Err(not_connected());
        }

        let mut reader = self.reader.lock().await;
        let read = async {
            match self.read_timeout {
                Some(limit) => match tokio::time::timeout(limit, reader.read(buf)).await {
                    Ok(res) => res,
                    Err(_) => Err(timed_out("read")),
                },
                None => reader.read(buf).await,
            }
        };

        let n = tokio::select! {
            res = read => res?,
            _ = wait_closed(closed) => return Err(not_connected()),
        };

        self.read_bytes_sum.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    async fn write(&self, buf: &[u8]) -> io::Result<()> {
        let closed = self.closed.subscribe();
        if self.is_closed() {
            return Err(not_connected());
        }

        let mut writer = self.writer.lock().await;
        // close() may have won the race while we waited for the lock
        if self.is_closed() {
            return Err(not_connected());
        }

        let write = async {
            match self.write_timeout {
                Some(limit) => match tokio::time::timeout(limit, writer.write_all(buf)).await {
                    Ok(res) => res,
                    Err(_) => Err(timed_out("write")),
                },
                None => writer.write_all(buf).await,
            }
        };

        // A write stuck on a peer that stopped reading is abandoned on close
        tokio::select! {
            res = write => res?,
            _ = wait_closed(closed) => return Err(not_connected()),
        }

        self.wrote_bytes_sum
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        if self.closed.send_replace(true) {
            return Ok(());
        }

        // An in-flight write holds the lock; it is woken by the closed flag
        // and drops the lock without shutting down. The stream itself is
        // released when the transport is dropped.
        match self.writer.try_lock() {
            Ok(mut writer) => writer.shutdown().await,
            Err(_) => Ok(()),
        }
    }

    fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    fn stat(&self) -> TransportStat {
        TransportStat {
            read_bytes_sum: self.read_bytes_sum.load(Ordering::Relaxed),
            wrote_bytes_sum: self.wrote_bytes_sum.load(Ordering::Relaxed),
        }
    }
}

/// Resolves once the closed flag is set or the sender is gone
async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            break;
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport closed")
}

fn timed_out(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} timed out", op))
}
