mod gemini_client;

pub use gemini_client::{
    DEFAULT_MAX_RETRIES, GEMINI_MODEL, GeminiClient, GenerateContentRequest, NetworkError,
    build_request_body, extract_result,
};
