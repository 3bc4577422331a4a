use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const GEMINI_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_MAX_RETRIES: u32 = 2;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;
const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
const TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 512;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to build http client: {0}")]
    ClientBuild(String),
    #[error("Gemini API {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Empty response from Gemini")]
    EmptyResponse,
    #[error("failed to decode Gemini response: {0}")]
    Decode(String),
    #[error("{0}")]
    Transport(String),
}

impl NetworkError {
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartList {
    pub parts: Vec<TextPart>,
}

impl PartList {
    fn single(text: &str) -> Self {
        Self {
            parts: vec![TextPart {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Body of a `generateContent` call. The system instruction key is snake_case on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateContentRequest {
    pub system_instruction: PartList,
    pub contents: Vec<PartList>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

pub fn build_request_body(text: &str, system_prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: PartList::single(system_prompt),
        contents: vec![PartList::single(text)],
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    }
}

/// Pulls the first candidate's text out of a response, `None` when there is nothing usable.
pub fn extract_result(data: &Value) -> Option<String> {
    let text = data
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()?
        .trim();

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    backoff_unit: Duration,
}

impl GeminiClient {
    pub fn new() -> Result<Self, NetworkError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS))
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(|err| NetworkError::ClientBuild(err.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: GEMINI_MODEL.to_string(),
            backoff_unit: Duration::from_millis(DEFAULT_BACKOFF_UNIT_MS),
        })
    }

    pub fn with_backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self, api_key: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        )
    }

    /// Sends `text` under `system_prompt`, retrying only rate-limited attempts.
    ///
    /// A 429 with attempts left waits `backoff_unit * (attempt + 1)` and tries
    /// again. Every other failure, transport errors included, is returned as is.
    pub async fn call_with_prompt(
        &self,
        text: &str,
        api_key: &str,
        system_prompt: &str,
        max_retries: u32,
    ) -> Result<String, NetworkError> {
        let url = self.endpoint(api_key);
        let body = build_request_body(text, system_prompt);

        let mut attempt = 0_u32;
        loop {
            debug!(attempt, model = %self.model, "sending Gemini generateContent request");
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|err| NetworkError::Transport(err.to_string()))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < max_retries {
                let wait = self.backoff_unit * (attempt + 1);
                let wait_ms = wait.as_millis() as u64;
                warn!(attempt, wait_ms, "Gemini rate limited; backing off");
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .map_err(|err| NetworkError::Transport(err.to_string()))?;
                return Err(NetworkError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let data = response
                .json::<Value>()
                .await
                .map_err(|err| NetworkError::Decode(err.to_string()))?;
            return extract_result(&data).ok_or(NetworkError::EmptyResponse);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn generate_path() -> String {
        format!("/v1beta/models/{GEMINI_MODEL}:generateContent")
    }

    fn success_body(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::with_base_url(server.uri())
            .expect("client should build")
            .with_backoff_unit(Duration::from_millis(5))
    }

    #[test]
    fn request_body_matches_wire_shape() {
        let body = build_request_body("hello world", "You are an assistant.");
        let serialized = serde_json::to_value(&body).expect("body should serialize");

        assert_eq!(
            serialized,
            json!({
                "system_instruction": { "parts": [{ "text": "You are an assistant." }] },
                "contents": [{ "parts": [{ "text": "hello world" }] }],
                "generationConfig": { "temperature": 0.3_f32, "maxOutputTokens": 512 },
            })
        );
    }

    #[test]
    fn request_body_preserves_unicode() {
        let body = build_request_body("日本語テスト", "prompt");
        assert_eq!(body.contents[0].parts[0].text, "日本語テスト");
    }

    #[test]
    fn endpoint_carries_model_and_key() {
        let client = GeminiClient::new().expect("client should build");
        let url = client.endpoint("test-key-123");
        assert!(url.starts_with("https://generativelanguage.googleapis.com/v1beta/models/"));
        assert!(url.contains(GEMINI_MODEL));
        assert!(url.contains(":generateContent"));
        assert!(url.ends_with("key=test-key-123"));
    }

    #[test]
    fn extract_result_trims_first_candidate() {
        assert_eq!(
            extract_result(&success_body("  Hello world \n")),
            Some("Hello world".to_string())
        );
    }

    #[test]
    fn extract_result_is_none_for_degenerate_payloads() {
        assert_eq!(extract_result(&Value::Null), None);
        assert_eq!(extract_result(&json!({})), None);
        assert_eq!(extract_result(&json!({ "candidates": [] })), None);
        assert_eq!(extract_result(&json!({ "candidates": [{ "content": {} }] })), None);
        assert_eq!(extract_result(&json!({ "candidates": [{ "content": { "parts": [] } }] })), None);
        assert_eq!(extract_result(&success_body("   ")), None);
    }

    #[tokio::test]
    async fn returns_text_and_sends_prompt_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .and(query_param("key", "my-key"))
            .and(body_partial_json(json!({
                "system_instruction": { "parts": [{ "text": "system prompt" }] },
                "contents": [{ "parts": [{ "text": "I has 25 years" }] }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("I am 25 years old")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .call_with_prompt("I has 25 years", "my-key", "system prompt", DEFAULT_MAX_RETRIES)
            .await
            .expect("call should succeed");
        assert_eq!(result, "I am 25 years old");
    }

    #[tokio::test]
    async fn retries_rate_limit_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limited"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("success")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .call_with_prompt("test", "key", "prompt", 2)
            .await
            .expect("second attempt should succeed");
        assert_eq!(result, "success");
    }

    #[tokio::test]
    async fn permanent_rate_limit_fails_after_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limited"))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .call_with_prompt("test", "key", "prompt", 1)
            .await
            .expect_err("rate limit should surface");
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().starts_with("Gemini API 429"));
    }

    #[tokio::test]
    async fn forbidden_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .call_with_prompt("test", "key", "prompt", 2)
            .await
            .expect_err("403 should fail");
        assert_eq!(err.to_string(), "Gemini API 403: Forbidden");
    }

    #[tokio::test]
    async fn empty_candidates_fail_explicitly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .call_with_prompt("test", "key", "prompt", 2)
            .await
            .expect_err("empty response should fail");
        assert!(matches!(err, NetworkError::EmptyResponse));
        assert_eq!(err.to_string(), "Empty response from Gemini");
    }

    // Three 429s cost 1 + 2 + 3 units of waiting. Doubling would cost 7 and a
    // fixed delay 3, so the window only admits the linear schedule.
    #[tokio::test]
    async fn rate_limit_backoff_grows_linearly() {
        let unit = Duration::from_millis(250);
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limited"))
            .up_to_n_times(3)
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(generate_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("done")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(server.uri())
            .expect("client should build")
            .with_backoff_unit(unit);
        let started = std::time::Instant::now();
        let result = client
            .call_with_prompt("test", "key", "prompt", 3)
            .await
            .expect("fourth attempt should succeed");
        let elapsed = started.elapsed();

        assert_eq!(result, "done");
        assert!(elapsed >= unit * 6, "waited only {elapsed:?}");
        assert!(elapsed < unit * 7, "waited {elapsed:?}");
    }

    // Transport failures are surfaced on the first attempt even with budget left;
    // only 429 responses are retried.
    #[tokio::test]
    async fn transport_error_is_not_retried() {
        let client = GeminiClient::with_base_url("http://127.0.0.1:9")
            .expect("client should build")
            .with_backoff_unit(Duration::from_millis(5));

        let err = client
            .call_with_prompt("test", "key", "prompt", 2)
            .await
            .expect_err("unreachable host should fail");
        assert!(matches!(err, NetworkError::Transport(_)));
    }
}
