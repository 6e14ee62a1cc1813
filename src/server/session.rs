//! Session management - one state machine per connection
//!
//! A session owns its connection for its whole life. The read half is driven
//! here; the write half belongs to a writer task fed by a bounded queue, so
//! nothing that delivers to this session ever waits on its socket.

use super::connection::client_writer_task;
use super::dispatcher::{dispatch, format_user_list};
use super::registry::Recipient;
use super::ServerContext;
use crate::protocol::{
    help_text, parse_line, validate_username, Command, ProtocolError, ServerLine,
    USERNAME_PROMPT,
};
use chrono::Utc;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, nothing sent yet
    Connecting,
    /// Waiting for a unique username
    NegotiatingName,
    /// Registered and chatting
    Active,
    /// Leaving the registry and flushing output
    Closing,
    /// Done; resources released
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent `/quit`
    Quit,
    /// The client closed its end
    Disconnected,
    /// Reading from the client failed
    ReadFailed,
    /// The client sent a line over the configured limit
    LineTooLong,
    /// Output could not be delivered: queue full or write failed
    Dropped,
    /// No input within the idle timeout
    IdleTimeout,
    /// The server is stopping
    Shutdown,
}

struct Writer {
    handle: JoinHandle<()>,
    finish: oneshot::Sender<()>,
}

/// Server-side state for one connected client
pub struct Session<R> {
    id: Uuid,
    username: Option<String>,
    status: String,
    state: SessionState,
    outbound: Recipient,
    lines: FramedRead<R, AnyDelimiterCodec>,
    ctx: ServerContext,
    kill: CancellationToken,
    shutdown: CancellationToken,
    writer: Option<Writer>,
}

impl<S> Session<ReadHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Take ownership of a live connection.
    ///
    /// Spawns the writer task for the write half. The session closes when
    /// `shutdown` is cancelled.
    pub fn new(stream: S, ctx: ServerContext, shutdown: &CancellationToken) -> Self {
        let id = Uuid::new_v4();
        let (reader, writer) = tokio::io::split(stream);
        let max_line_length = ctx.config.server.max_line_length;

        let kill = shutdown.child_token();
        let (tx, rx) = mpsc::channel::<ServerLine>(ctx.config.server.outbound_capacity());
        let (finish_tx, finish_rx) = oneshot::channel();

        let handle = tokio::spawn(client_writer_task(
            id,
            writer,
            rx,
            ctx.config.chat.colors,
            kill.clone(),
            finish_rx,
        ));

        Self {
            id,
            username: None,
            status: String::new(),
            state: SessionState::Connecting,
            outbound: Recipient::new(id, tx, kill.clone()),
            lines: FramedRead::new(
                reader,
                AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_line_length),
            ),
            ctx,
            kill,
            shutdown: shutdown.clone(),
            writer: Some(Writer {
                handle,
                finish: finish_tx,
            }),
        }
    }
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to completion and return its final state
    pub async fn run(mut self) -> SessionState {
        let reason = match self.drive().await {
            Ok(()) => CloseReason::Quit,
            Err(reason) => reason,
        };
        self.close(reason).await;
        self.state
    }

    async fn drive(&mut self) -> Result<(), CloseReason> {
        self.negotiate().await?;
        self.activate().await?;
        self.serve().await
    }

    /// Queue a line for this client without waiting
    fn send(&self, line: ServerLine) -> Result<(), CloseReason> {
        if self.outbound.deliver(line) {
            Ok(())
        } else {
            Err(CloseReason::Dropped)
        }
    }

    /// Wait for the next input line, or for a reason to stop
    async fn next_line(&mut self) -> Result<String, CloseReason> {
        let idle = self.ctx.config.server.idle_timeout();
        let kill = self.kill.clone();
        let shutdown = self.shutdown.clone();
        let lines = &mut self.lines;

        let read = async move {
            match idle {
                Some(limit) => tokio::time::timeout(limit, lines.next())
                    .await
                    .map_err(|_| CloseReason::IdleTimeout),
                None => Ok(lines.next().await),
            }
        };

        let next = tokio::select! {
            _ = kill.cancelled() => {
                return Err(if shutdown.is_cancelled() {
                    CloseReason::Shutdown
                } else {
                    CloseReason::Dropped
                });
            }
            next = read => next?,
        };

        match next {
            Some(Ok(chunk)) => Ok(decode_line(&chunk)),
            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                Err(CloseReason::LineTooLong)
            }
            Some(Err(AnyDelimiterCodecError::Io(e))) => {
                tracing::debug!(session = %self.id, "Read failed: {}", e);
                Err(CloseReason::ReadFailed)
            }
            None => Err(CloseReason::Disconnected),
        }
    }

    async fn negotiate(&mut self) -> Result<(), CloseReason> {
        self.state = SessionState::NegotiatingName;
        self.send(ServerLine::info("Welcome to chatty."))?;
        if let Some(motd) = self.ctx.config.chat.motd.clone() {
            self.send(ServerLine::info(motd))?;
        }

        let max_len = self.ctx.config.chat.max_username_len;
        loop {
            self.send(ServerLine::prompt(USERNAME_PROMPT))?;
            let line = self.next_line().await?;

            let name = match parse_line(&line, self.state) {
                Some(Command::ProposeName(name)) => name,
                Some(Command::Invalid(reason)) => {
                    self.send(ServerLine::error(reason))?;
                    continue;
                }
                _ => continue,
            };

            if let Err(e) = validate_username(&name, max_len) {
                self.send(ServerLine::error(e))?;
                continue;
            }

            match self.ctx.registry.claim(&name, self.outbound.clone()).await {
                Ok(()) => {
                    tracing::info!(session = %self.id, username = %name, "User joined");
                    self.username = Some(name);
                    self.state = SessionState::Active;
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(session = %self.id, "Name rejected: {}", e);
                    self.send(ServerLine::error(e))?;
                }
            }
        }
    }

    async fn activate(&mut self) -> Result<(), CloseReason> {
        let Some(username) = self.username.clone() else {
            return Err(CloseReason::Disconnected);
        };

        self.send(ServerLine::info(format!("Welcome {}! Get chatty.", username)))?;
        self.send(ServerLine::info(help_text()))?;
        let users = self.ctx.registry.snapshot().await;
        self.send(ServerLine::notice(format_user_list(&users)))?;

        if self.ctx.config.chat.announce_presence {
            let notice = ServerLine::notice(format!("* {} joined", username));
            self.ctx.registry.broadcast(&notice, Some(username.as_str())).await;
        }
        Ok(())
    }

    async fn serve(&mut self) -> Result<(), CloseReason> {
        let Some(username) = self.username.clone() else {
            return Err(CloseReason::Disconnected);
        };

        loop {
            let line = self.next_line().await?;
            let Some(command) = parse_line(&line, self.state) else {
                continue;
            };

            let outcome = dispatch(
                command,
                &username,
                &self.ctx.registry,
                &self.ctx.config.chat,
            )
            .await;

            if let Some(status) = outcome.status {
                self.status = status;
            }
            for reply in outcome.replies {
                self.send(reply)?;
            }
            if outcome.quit {
                return Ok(());
            }
        }
    }

    async fn close(&mut self, reason: CloseReason) {
        let was_active = self.state == SessionState::Active;
        self.state = SessionState::Closing;

        if let Some(username) = self.username.clone() {
            if let Some(joined_at) = self.ctx.registry.release(&username, self.id).await {
                let connected_secs = (Utc::now() - joined_at).num_seconds();
                tracing::info!(
                    session = %self.id,
                    username = %username,
                    status = %self.status,
                    reason = ?reason,
                    connected_secs,
                    "User left"
                );
                if was_active && self.ctx.config.chat.announce_presence {
                    let notice = ServerLine::notice(format!("* {} left", username));
                    self.ctx.registry.broadcast(&notice, None).await;
                }
            }
        } else {
            tracing::debug!(session = %self.id, reason = ?reason, "Connection closed before joining");
        }

        let farewell = match reason {
            CloseReason::IdleTimeout => Some(ServerLine::notice("Idle timeout, closing connection.")),
            CloseReason::Shutdown => Some(ServerLine::notice("Server is shutting down.")),
            CloseReason::LineTooLong => Some(ServerLine::error(ProtocolError::LineTooLong {
                max: self.ctx.config.server.max_line_length,
            })),
            _ => None,
        };
        if let Some(line) = farewell {
            let _ = self.send(line);
        }

        if let Some(Writer { mut handle, finish }) = self.writer.take() {
            let _ = finish.send(());
            let linger = self.ctx.config.server.linger();
            if tokio::time::timeout(linger, &mut handle).await.is_err() {
                tracing::debug!(session = %self.id, "Output did not flush in time, aborting writer");
                handle.abort();
            }
        }

        self.state = SessionState::Closed;
    }
}

/// Turn one raw input line into text.
///
/// Terminals that are not UTF-8 still get through: invalid bytes become
/// U+FFFD instead of failing the read.
fn decode_line(chunk: &[u8]) -> String {
    let chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
    String::from_utf8_lossy(chunk).into_owned()
}
