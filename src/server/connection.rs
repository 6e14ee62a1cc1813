//! Client connection output handling

use crate::protocol::ServerLine;
use anyhow::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Write one rendered line to a stream
pub async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    line: &ServerLine,
    colors: bool,
) -> Result<()> {
    writer.write_all(line.render(colors).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Task to write outgoing lines to the client
///
/// Runs until the queue closes or `finish` fires. After `finish` the queue
/// is closed and whatever is still buffered is written before the stream is
/// shut down. A write failure cancels `kill` so the session closes too.
pub async fn client_writer_task<W: AsyncWrite + Unpin>(
    session_id: Uuid,
    mut writer: W,
    mut receiver: mpsc::Receiver<ServerLine>,
    colors: bool,
    kill: CancellationToken,
    mut finish: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut finish => break,
            line = receiver.recv() => {
                let Some(line) = line else { break };
                if let Err(e) = write_line(&mut writer, &line, colors).await {
                    tracing::warn!(session = %session_id, "Failed to write to client: {}", e);
                    kill.cancel();
                    return;
                }
            }
        }
    }

    receiver.close();
    while let Some(line) = receiver.recv().await {
        if write_line(&mut writer, &line, colors).await.is_err() {
            return;
        }
    }
    let _ = writer.shutdown().await;

    tracing::debug!(session = %session_id, "Client writer task finished");
}
