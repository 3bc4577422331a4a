//! Browser native-messaging transport.
//!
//! Every message is a 32-bit length in native byte order followed by that
//! many bytes of UTF-8 JSON. Requests may carry an `id`, echoed on the reply,
//! so an extension holding a long-lived port can match answers that complete
//! out of order.

use std::io::ErrorKind;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::ChannelError;
use crate::service::{CorrectionService, Request, Response};

/// Browsers refuse host replies larger than 1 MiB.
pub const MAX_OUTGOING_BYTES: usize = 1024 * 1024;
pub const MAX_INCOMING_BYTES: usize = 64 * 1024 * 1024;
const REPLY_QUEUE_CAPACITY: usize = 32;

/// Reads one framed message; `Ok(None)` on a clean end of stream.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, ChannelError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0_u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(ChannelError::Io(err.to_string())),
    }

    let length = u32::from_ne_bytes(header) as usize;
    if length > MAX_INCOMING_BYTES {
        return Err(ChannelError::TooLarge(length));
    }

    let mut payload = vec![0_u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|err| ChannelError::Io(err.to_string()))?;

    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|err| ChannelError::Malformed(err.to_string()))
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload =
        serde_json::to_vec(message).map_err(|err| ChannelError::Malformed(err.to_string()))?;
    if payload.len() > MAX_OUTGOING_BYTES {
        return Err(ChannelError::TooLarge(payload.len()));
    }

    let header = (payload.len() as u32).to_ne_bytes();
    writer
        .write_all(&header)
        .await
        .map_err(|err| ChannelError::Io(err.to_string()))?;
    writer
        .write_all(&payload)
        .await
        .map_err(|err| ChannelError::Io(err.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|err| ChannelError::Io(err.to_string()))
}

/// Splits an incoming envelope into its optional correlation id and request.
fn parse_envelope(mut value: Value) -> (Option<Value>, Result<Request, String>) {
    let id = value.as_object_mut().and_then(|object| object.remove("id"));
    let request = serde_json::from_value::<Request>(value).map_err(|err| err.to_string());
    (id, request)
}

fn reply_envelope(id: Option<Value>, response: &Response) -> Value {
    let mut value = serde_json::to_value(response)
        .unwrap_or_else(|err| serde_json::json!({ "error": err.to_string() }));
    if let (Some(id), Some(object)) = (id, value.as_object_mut()) {
        object.insert("id".to_string(), id);
    }
    value
}

/// Answers framed requests from `reader` until it closes, writing replies to `writer`.
pub async fn serve<R, W>(
    service: Arc<CorrectionService>,
    mut reader: R,
    mut writer: W,
) -> Result<(), ChannelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (reply_tx, mut reply_rx) = mpsc::channel::<Value>(REPLY_QUEUE_CAPACITY);

    let mut writer_task = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            match write_message(&mut writer, &reply).await {
                Ok(()) => {}
                Err(ChannelError::TooLarge(size)) => {
                    warn!(size, "reply exceeds native messaging limit; sending error instead");
                    let id = reply.get("id").cloned();
                    let fallback = reply_envelope(
                        id,
                        &Response::error("reply too large for native messaging"),
                    );
                    write_message(&mut writer, &fallback).await?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok::<(), ChannelError>(())
    });

    info!("native messaging host ready");
    // The writer only finishes early when output fails; nothing read after
    // that could be answered.
    let mut writer_outcome = None;
    let read_result = loop {
        let next = tokio::select! {
            next = read_message::<_, Value>(&mut reader) => next,
            outcome = &mut writer_task => {
                warn!("native messaging output stopped; no longer reading requests");
                writer_outcome = Some(outcome);
                break Ok(());
            }
        };
        let value = match next {
            Ok(Some(value)) => value,
            Ok(None) => break Ok(()),
            Err(ChannelError::Malformed(err)) => {
                warn!("dropping malformed native message: {err}");
                let _ = reply_tx.send(reply_envelope(None, &Response::error(err))).await;
                continue;
            }
            Err(err) => break Err(err),
        };

        let (id, request) = parse_envelope(value);
        let reply_tx = reply_tx.clone();
        match request {
            Ok(request) => {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    debug!(kind = request.kind(), "handling native request");
                    let response = service.handle(request).await;
                    let _ = reply_tx.send(reply_envelope(id, &response)).await;
                });
            }
            Err(err) => {
                let response = Response::error(format!("invalid request: {err}"));
                let _ = reply_tx.send(reply_envelope(id, &response)).await;
            }
        }
    };

    drop(reply_tx);
    let outcome = match writer_outcome {
        Some(outcome) => outcome,
        None => writer_task.await,
    };
    let write_result = outcome.map_err(|err| ChannelError::Io(err.to_string()))?;
    info!("native messaging input closed");

    read_result.and(write_result)
}
