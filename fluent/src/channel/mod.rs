pub mod native;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::service::{CorrectionService, Request, Response};

const REQUEST_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("correction service is unreachable")]
    Disconnected,
    #[error("correction service dropped the request without replying")]
    NoResponse,
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message of {0} bytes exceeds the channel limit")]
    TooLarge(usize),
    #[error("channel i/o failed: {0}")]
    Io(String),
}

/// Asynchronous request/response link between a page and the correction service.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    async fn send(&self, request: Request) -> Result<Response, ChannelError>;
}

#[async_trait]
impl<T: Channel + ?Sized> Channel for Arc<T> {
    async fn send(&self, request: Request) -> Result<Response, ChannelError> {
        (**self).send(request).await
    }
}

type Envelope = (Request, oneshot::Sender<Response>);

/// In-process channel to a service running on its own task.
#[derive(Clone)]
pub struct LocalChannel {
    tx: mpsc::Sender<Envelope>,
}

impl LocalChannel {
    /// Starts the service loop; each request is handled on its own task so a
    /// slow Gemini call never blocks a ping.
    pub fn spawn(service: Arc<CorrectionService>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Envelope>(REQUEST_QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some((request, reply_tx)) = rx.recv().await {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let kind = request.kind();
                    let response = service.handle(request).await;
                    if reply_tx.send(response).is_err() {
                        debug!(kind, "page went away before the reply was delivered");
                    }
                });
            }
            debug!("local channel closed");
        });

        (Self { tx }, handle)
    }
}

#[async_trait]
impl Channel for LocalChannel {
    async fn send(&self, request: Request) -> Result<Response, ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| ChannelError::Disconnected)?;
        reply_rx.await.map_err(|_| ChannelError::NoResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::GeminiClient;
    use crate::settings::MemorySettingsStore;

    fn service() -> Arc<CorrectionService> {
        let client = GeminiClient::with_base_url("http://127.0.0.1:9").expect("client should build");
        Arc::new(CorrectionService::new(
            Arc::new(MemorySettingsStore::default()),
            client,
        ))
    }

    #[tokio::test]
    async fn ping_round_trips_through_service_task() {
        let (channel, _worker) = LocalChannel::spawn(service());
        let response = channel.send(Request::Ping).await.expect("ping should succeed");
        assert_eq!(response, Response::pong());
    }

    #[tokio::test]
    async fn stopped_service_is_disconnected() {
        let (channel, worker) = LocalChannel::spawn(service());
        worker.abort();
        let _ = worker.await;

        let err = channel
            .send(Request::Ping)
            .await
            .expect_err("aborted service should be unreachable");
        assert_eq!(err, ChannelError::Disconnected);
    }

    #[tokio::test]
    async fn application_errors_are_payloads_not_channel_errors() {
        let (channel, _worker) = LocalChannel::spawn(service());
        let response = channel
            .send(Request::CheckGrammar {
                text: "some text to check".to_string(),
            })
            .await
            .expect("channel should deliver the error payload");
        assert!(matches!(response, Response::Error { .. }));
    }
}
