//! State shared between a connection and its reader task.

use super::demux::PendingTable;
use crate::tool_server::domain::{ConnectionStateCell, CorrelationIdSequence};
use crate::tool_server::ports::{ToolServerError, ToolServerResult};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

/// Writable half of the server's stdin.
pub(super) type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

#[derive(Debug)]
pub(super) struct Channel {
    pub(super) state: ConnectionStateCell,
    pub(super) pending: Arc<PendingTable>,
    pub(super) ids: CorrelationIdSequence,
    writer: Mutex<Option<WriterSlot>>,
}

struct WriterSlot(BoxedWriter);

impl std::fmt::Debug for WriterSlot {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("WriterSlot")
    }
}

impl Channel {
    pub(super) fn new(writer: BoxedWriter) -> Self {
        Self {
            state: ConnectionStateCell::new(),
            pending: Arc::new(PendingTable::default()),
            ids: CorrelationIdSequence::new(),
            writer: Mutex::new(Some(WriterSlot(writer))),
        }
    }

    /// Writes one encoded line. Writers are serialized so lines from
    /// concurrent callers never interleave.
    pub(super) async fn write_line(&self, line: &[u8]) -> ToolServerResult<()> {
        let mut slot = self.writer.lock().await;
        let Some(WriterSlot(writer)) = slot.as_mut() else {
            return Err(ToolServerError::ConnectionLost(
                "server stdin is closed".to_owned(),
            ));
        };
        writer.write_all(line).await.map_err(ToolServerError::io)?;
        writer.flush().await.map_err(ToolServerError::io)
    }

    /// Closes the server's stdin, signalling end of input.
    pub(super) async fn close_writer(&self) {
        let taken = self.writer.lock().await.take();
        if let Some(WriterSlot(mut writer)) = taken {
            if let Err(err) = writer.shutdown().await {
                debug!(error = %err, "closing tool server stdin failed");
            }
        }
    }
}
