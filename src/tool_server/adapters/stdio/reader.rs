//! Background task that demultiplexes the server's stdout.

use super::channel::Channel;
use super::demux::Undeliverable;
use super::process::ExitWatch;
use crate::tool_server::protocol::{
    InboundLine, METHOD_NOT_FOUND, PING, ReplyEnvelope, RpcError, ServerRequest, classify_line,
    encode_line,
};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, trace, warn};

/// Reads lines until the stream ends, routing each to its waiter.
///
/// When the stream ends the connection is marked failed (unless teardown is
/// already under way) and every outstanding request fails with connection
/// loss.
pub(super) async fn run<R>(mut reader: R, channel: Arc<Channel>)
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut buffer = Vec::new();
    let reason = loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break "tool server closed its output stream".to_owned(),
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                dispatch(&channel, &line);
            }
            Err(err) => break format!("reading tool server output failed: {err}"),
        }
    };

    fail_connection(&channel, &reason);
}

/// Fails the connection as soon as the server process is reaped.
///
/// Exit is noticed even when a descendant of the server still holds its
/// stdout open, so the output stream never reaches end of file.
pub(super) async fn watch_exit(mut exited: ExitWatch, channel: Arc<Channel>) {
    let reason = match exited.wait_for(Option::is_some).await {
        Ok(status) => match *status {
            Some(code) => format!("tool server exited with {code}"),
            None => "tool server exited".to_owned(),
        },
        Err(_) => "tool server exit status is unavailable".to_owned(),
    };
    fail_connection(&channel, &reason);
}

fn fail_connection(channel: &Channel, reason: &str) {
    if channel.state.mark_failed() {
        warn!(%reason, "tool server connection failed");
    } else {
        debug!(%reason, "tool server connection already shutting down");
    }
    let failed = channel.pending.close_all(reason);
    if failed > 0 {
        warn!(failed, "failed outstanding requests after connection loss");
    }
}

fn dispatch(channel: &Arc<Channel>, line: &str) {
    match classify_line(line) {
        InboundLine::Blank => {}
        InboundLine::Noise { preview } => {
            debug!(%preview, "ignoring non-protocol output from tool server");
        }
        InboundLine::Response(envelope) => {
            let id = envelope.id;
            if !channel.pending.complete(id, Ok(envelope.outcome)) {
                warn!(%id, "dropping response with no waiting request");
            }
        }
        InboundLine::Malformed { id, reason } => {
            if !channel
                .pending
                .complete(id, Err(Undeliverable::Malformed(reason.clone())))
            {
                warn!(%id, %reason, "dropping malformed response with no waiting request");
            }
        }
        InboundLine::Notification { method } => {
            trace!(%method, "ignoring tool server notification");
        }
        InboundLine::ServerRequest(request) => {
            // Replies go out on their own task so the reader keeps draining
            // stdout while a caller holds the writer.
            tokio::spawn(answer(Arc::clone(channel), request));
        }
        InboundLine::Unroutable { reason } => {
            warn!(%reason, "dropping unroutable message from tool server");
        }
    }
}

async fn answer(channel: Arc<Channel>, request: ServerRequest) {
    let ServerRequest { id, method } = request;
    let reply = if method == PING {
        ReplyEnvelope::result(id, json!({}))
    } else {
        debug!(%method, "rejecting unsupported server request");
        ReplyEnvelope::error(
            id,
            RpcError::new(METHOD_NOT_FOUND, format!("method '{method}' is not supported")),
        )
    };

    let line = match encode_line(&reply) {
        Ok(line) => line,
        Err(err) => {
            warn!(error = %err, "failed to encode reply to server request");
            return;
        }
    };
    if let Err(err) = channel.write_line(&line).await {
        debug!(error = %err, "failed to reply to server request");
    }
}
