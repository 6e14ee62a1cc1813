//! Common test helpers and utilities
//!
//! A line-based test client plus helpers to start a server on an ephemeral
//! port.

#![allow(dead_code)]

use chatty::config::Config;
use chatty::server::{Registry, ServerListener};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long to wait for any single expected line
pub const LINE_TIMEOUT: Duration = Duration::from_secs(2);

/// Config with colours off and presence announcements on
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.chat.colors = false;
    config.chat.announce_presence = true;
    config.server.linger_ms = 500;
    config
}

/// A running server on 127.0.0.1 with an ephemeral port
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start(config: Config) -> Self {
        let server = ServerListener::new(config);
        let registry = server.registry();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

        Self {
            addr,
            registry,
            shutdown_tx,
            handle,
        }
    }

    pub async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        TestClient::new(stream)
    }

    /// Connect and complete name negotiation as `name`
    pub async fn join(&self, name: &str) -> TestClient {
        let mut client = self.connect().await;
        client.send(name).await;
        client.expect(&format!("Welcome {}!", name)).await;
        client
    }

    /// Stop the server and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let result = timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server should stop")
            .expect("server task should not panic");
        assert!(result.is_ok(), "server returned {:?}", result);
    }
}

/// Line-oriented client over any byte stream
pub struct TestClient {
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl TestClient {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
        }
    }

    /// Send one line with a telnet-style CR-LF ending
    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Send raw bytes as-is
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next line without its line ending, or `None` on EOF
    pub async fn next_line(&mut self) -> Option<String> {
        let mut buf = String::new();
        let read = timeout(LINE_TIMEOUT, self.reader.read_line(&mut buf))
            .await
            .expect("timed out waiting for a line");
        match read {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(buf.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// Read until a line containing `needle`; returns every line read
    pub async fn expect_lines(&mut self, needle: &str) -> Vec<String> {
        let mut seen = Vec::new();
        loop {
            match self.next_line().await {
                Some(line) => {
                    let found = line.contains(needle);
                    seen.push(line);
                    if found {
                        return seen;
                    }
                }
                None => panic!("EOF before {:?}; saw {:?}", needle, seen),
            }
        }
    }

    /// Read until a line containing `needle` and return that line
    pub async fn expect(&mut self, needle: &str) -> String {
        self.expect_lines(needle).await.pop().unwrap_or_default()
    }

    /// Read until a line containing one of `needles`; returns its index
    pub async fn expect_any(&mut self, needles: &[&str]) -> usize {
        loop {
            let line = self.next_line().await.expect("unexpected EOF");
            if let Some(i) = needles.iter().position(|n| line.contains(n)) {
                return i;
            }
        }
    }

    /// Read until the server closes the connection
    pub async fn expect_eof(&mut self) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(line) = self.next_line().await {
            seen.push(line);
        }
        seen
    }
}

/// Poll `check` until it returns true or the deadline passes
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + LINE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Server-side stream whose writes start failing once `broken` is set.
/// Reads pass through untouched.
pub struct BreakableStream {
    inner: DuplexStream,
    broken: Arc<AtomicBool>,
}

impl BreakableStream {
    pub fn new(inner: DuplexStream) -> (Self, Arc<AtomicBool>) {
        let broken = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                broken: Arc::clone(&broken),
            },
            broken,
        )
    }

    fn check(&self) -> io::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"))
        } else {
            Ok(())
        }
    }
}

impl AsyncRead for BreakableStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for BreakableStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Err(e) = self.check() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Err(e) = self.check() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
