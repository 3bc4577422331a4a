mod protocol;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::{ServiceMetrics, ServiceReport};
use crate::network::{DEFAULT_MAX_RETRIES, GeminiClient, NetworkError};
use crate::prompt::{build_explain_prompt, build_system_prompt};
use crate::settings::{Settings, SettingsError, SettingsStore};
use crate::utils::preview;

pub use protocol::{Request, Response, StatusReport};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No API key configured. Open extension options to set it.")]
    MissingApiKey,
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionKind {
    Grammar,
    Explain,
}

/// One resolved unit of work: what to ask, about which text, under which settings.
#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    kind: CorrectionKind,
    text: String,
    settings: Settings,
}

impl CorrectionRequest {
    pub fn resolve(
        kind: CorrectionKind,
        text: String,
        settings: Settings,
    ) -> Result<Self, ServiceError> {
        if settings.api_key().is_none() {
            return Err(ServiceError::MissingApiKey);
        }
        Ok(Self {
            kind,
            text,
            settings,
        })
    }

    pub fn kind(&self) -> CorrectionKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn api_key(&self) -> &str {
        self.settings.api_key().unwrap_or_default()
    }

    pub fn system_prompt(&self) -> String {
        match self.kind {
            CorrectionKind::Grammar => build_system_prompt(
                &self.settings.language,
                self.settings.native_language.as_deref(),
                self.settings.tone,
            ),
            CorrectionKind::Explain => build_explain_prompt(self.settings.explain_language()),
        }
    }
}

/// Background-side handler: resolves settings per request and calls Gemini.
pub struct CorrectionService {
    settings: Arc<dyn SettingsStore>,
    client: GeminiClient,
    max_retries: u32,
    metrics: Mutex<ServiceMetrics>,
}

impl CorrectionService {
    pub fn new(settings: Arc<dyn SettingsStore>, client: GeminiClient) -> Self {
        Self {
            settings,
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            metrics: Mutex::new(ServiceMetrics::new()),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::pong(),
            Request::CheckGrammar { text } => match self.check_grammar(text).await {
                Ok(improved) => Response::Improved { improved },
                Err(err) => Response::error(err.to_string()),
            },
            Request::ExplainText { text } => match self.explain(text).await {
                Ok(explanation) => Response::Explanation { explanation },
                Err(err) => Response::error(err.to_string()),
            },
            Request::Status => Response::Status(self.status().await),
            Request::Unknown => Response::error("unknown message type"),
        }
    }

    pub async fn check_grammar(&self, text: String) -> Result<String, ServiceError> {
        self.run(CorrectionKind::Grammar, text).await
    }

    pub async fn explain(&self, text: String) -> Result<String, ServiceError> {
        self.run(CorrectionKind::Explain, text).await
    }

    pub async fn status(&self) -> StatusReport {
        let gemini_configured = match self.load_settings().await {
            Ok(settings) => settings.api_key().is_some(),
            Err(err) => {
                warn!("failed to load settings for status report: {err}");
                false
            }
        };

        StatusReport {
            status: "ok".to_string(),
            gemini_configured,
            model: self.client.model().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            metrics: self.report(),
        }
    }

    pub fn report(&self) -> ServiceReport {
        self.metrics().report()
    }

    /// Reads settings off the async workers; file and keyring access block.
    async fn load_settings(&self) -> Result<Settings, SettingsError> {
        let store = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|err| SettingsError::Read(err.to_string()))?
    }

    async fn run(&self, kind: CorrectionKind, text: String) -> Result<String, ServiceError> {
        let settings = self.load_settings().await?;
        let request = match CorrectionRequest::resolve(kind, text, settings) {
            Ok(request) => request,
            Err(err) => {
                if matches!(err, ServiceError::MissingApiKey) {
                    self.metrics().record_missing_key();
                }
                return Err(err);
            }
        };

        info!(
            kind = ?request.kind(),
            text = %preview(request.text(), 40),
            "forwarding request to Gemini"
        );
        let started = Instant::now();
        let result = self
            .client
            .call_with_prompt(
                request.text(),
                request.api_key(),
                &request.system_prompt(),
                self.max_retries,
            )
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut metrics = self.metrics();
        match result {
            Ok(output) => {
                match kind {
                    CorrectionKind::Grammar => metrics.record_grammar(elapsed_ms),
                    CorrectionKind::Explain => metrics.record_explain(elapsed_ms),
                }
                Ok(output)
            }
            Err(err) => {
                metrics.record_failure();
                warn!(kind = ?kind, elapsed_ms, "Gemini request failed: {err}");
                Err(err.into())
            }
        }
    }

    fn metrics(&self) -> std::sync::MutexGuard<'_, ServiceMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::prompt::Tone;
    use crate::settings::MemorySettingsStore;

    fn service_with(server_uri: &str, settings: Settings) -> CorrectionService {
        let client = GeminiClient::with_base_url(server_uri)
            .expect("client should build")
            .with_backoff_unit(Duration::from_millis(5));
        CorrectionService::new(Arc::new(MemorySettingsStore::new(settings)), client)
    }

    fn keyed_settings() -> Settings {
        Settings {
            gemini_api_key: "key".to_string(),
            native_language: Some("Portuguese".to_string()),
            tone: Tone::Professional,
            ..Settings::default()
        }
    }

    async fn mount_reply(server: &MockServer, marker: &str, reply: &str) {
        Mock::given(method("POST"))
            .and(body_string_contains(marker))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": reply }] } }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn ping_answers_ok() {
        let service = service_with("http://127.0.0.1:9", Settings::default());
        assert_eq!(service.handle(Request::Ping).await, Response::pong());
    }

    #[tokio::test]
    async fn missing_key_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let service = service_with(&server.uri(), Settings::default());
        let response = service
            .handle(Request::CheckGrammar {
                text: "some text here".to_string(),
            })
            .await;
        assert_eq!(
            response,
            Response::error("No API key configured. Open extension options to set it.")
        );
        assert_eq!(service.report().rejected_without_key, 1);
    }

    #[tokio::test]
    async fn grammar_uses_tone_prompt() {
        let server = MockServer::start().await;
        mount_reply(&server, "professional workplace communication", "I am 25 years old.").await;

        let service = service_with(&server.uri(), keyed_settings());
        let response = service
            .handle(Request::CheckGrammar {
                text: "I has 25 years".to_string(),
            })
            .await;
        assert_eq!(
            response,
            Response::Improved {
                improved: "I am 25 years old.".to_string()
            }
        );
        assert_eq!(service.report().grammar.samples, 1);
    }

    #[tokio::test]
    async fn explain_uses_native_language_prompt() {
        let server = MockServer::start().await;
        mount_reply(&server, "Reply ONLY in Portuguese", "significa olá").await;

        let service = service_with(&server.uri(), keyed_settings());
        let response = service
            .handle(Request::ExplainText {
                text: "hello".to_string(),
            })
            .await;
        assert_eq!(
            response,
            Response::Explanation {
                explanation: "significa olá".to_string()
            }
        );
    }

    #[tokio::test]
    async fn provider_error_becomes_error_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let service = service_with(&server.uri(), keyed_settings());
        let response = service
            .handle(Request::CheckGrammar {
                text: "some text here".to_string(),
            })
            .await;
        assert_eq!(response, Response::error("Gemini API 403: Forbidden"));
        assert_eq!(service.report().failed_requests, 1);
    }

    #[tokio::test]
    async fn settings_are_resolved_per_request() {
        let server = MockServer::start().await;
        mount_reply(&server, "Japanese writing assistant", "こんにちは").await;

        let store = Arc::new(MemorySettingsStore::default());
        let client = GeminiClient::with_base_url(server.uri()).expect("client should build");
        let service = CorrectionService::new(store.clone(), client);

        let before = service
            .handle(Request::CheckGrammar {
                text: "hello there".to_string(),
            })
            .await;
        assert!(matches!(before, Response::Error { .. }));

        store
            .update(&mut |settings| {
                settings.gemini_api_key = "key".to_string();
                settings.language = "Japanese".to_string();
            })
            .expect("update should succeed");

        let after = service
            .handle(Request::CheckGrammar {
                text: "hello there".to_string(),
            })
            .await;
        assert_eq!(
            after,
            Response::Improved {
                improved: "こんにちは".to_string()
            }
        );
    }

    #[tokio::test]
    async fn status_reports_configuration() {
        let service = service_with("http://127.0.0.1:9", keyed_settings());
        let Response::Status(report) = service.handle(Request::Status).await else {
            panic!("expected status response");
        };
        assert!(report.gemini_configured);
        assert_eq!(report.model, crate::network::GEMINI_MODEL);
    }

    /// Store whose reads block like a slow disk or keyring prompt.
    struct SlowStore {
        inner: MemorySettingsStore,
        delay: Duration,
    }

    impl SettingsStore for SlowStore {
        fn load(&self) -> Result<Settings, SettingsError> {
            std::thread::sleep(self.delay);
            self.inner.load()
        }

        fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
            self.inner.save(settings)
        }

        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Settings> {
            self.inner.subscribe()
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_settings_reads_leave_the_runtime_free() {
        let store = SlowStore {
            inner: MemorySettingsStore::new(Settings::default()),
            delay: Duration::from_millis(300),
        };
        let client = GeminiClient::with_base_url("http://127.0.0.1:9").expect("client should build");
        let service = Arc::new(CorrectionService::new(Arc::new(store), client));

        let started = std::time::Instant::now();
        let slow = tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                service
                    .handle(Request::CheckGrammar {
                        text: "some text here".to_string(),
                    })
                    .await
            }
        });
        tokio::task::yield_now().await;

        let pong = service.handle(Request::Ping).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pong, Response::pong());
        assert!(started.elapsed() < Duration::from_millis(200));

        let response = slow.await.expect("request task should join");
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn unknown_request_gets_error() {
        let service = service_with("http://127.0.0.1:9", keyed_settings());
        assert_eq!(
            service.handle(Request::Unknown).await,
            Response::error("unknown message type")
        );
    }
}
