use serde::{Deserialize, Serialize};

use crate::metrics::ServiceReport;

/// Messages sent from a page to the correction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    Ping,
    CheckGrammar { text: String },
    ExplainText { text: String },
    Status,
    #[serde(other)]
    Unknown,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::CheckGrammar { .. } => "check-grammar",
            Request::ExplainText { .. } => "explain-text",
            Request::Status => "status",
            Request::Unknown => "unknown",
        }
    }
}

/// Replies are distinguished by their single payload key, as the extension expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Pong { ok: bool },
    Improved { improved: String },
    Explanation { explanation: String },
    Error { error: String },
    Status(StatusReport),
}

impl Response {
    pub fn pong() -> Self {
        Response::Pong { ok: true }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: String,
    pub gemini_configured: bool,
    pub model: String,
    pub version: String,
    pub metrics: ServiceReport,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn requests_use_kebab_case_type_tags() {
        let request: Request =
            serde_json::from_value(json!({ "type": "check-grammar", "text": "hi there" }))
                .expect("request should parse");
        assert_eq!(
            request,
            Request::CheckGrammar {
                text: "hi there".to_string()
            }
        );

        let ping: Request =
            serde_json::from_value(json!({ "type": "ping" })).expect("ping should parse");
        assert_eq!(ping, Request::Ping);

        let explain = serde_json::to_value(Request::ExplainText {
            text: "x".to_string(),
        })
        .expect("request should serialize");
        assert_eq!(explain, json!({ "type": "explain-text", "text": "x" }));
    }

    #[test]
    fn unknown_request_type_is_tolerated() {
        let request: Request = serde_json::from_value(json!({ "type": "rewrite", "text": "x" }))
            .expect("unknown type should parse");
        assert_eq!(request, Request::Unknown);
    }

    #[test]
    fn responses_serialize_to_single_key_objects() {
        assert_eq!(
            serde_json::to_value(Response::pong()).expect("serialize"),
            json!({ "ok": true })
        );
        assert_eq!(
            serde_json::to_value(Response::Improved {
                improved: "fixed".to_string()
            })
            .expect("serialize"),
            json!({ "improved": "fixed" })
        );
        assert_eq!(
            serde_json::to_value(Response::error("boom")).expect("serialize"),
            json!({ "error": "boom" })
        );
    }

    #[test]
    fn responses_parse_by_payload_key() {
        let parsed: Response =
            serde_json::from_value(json!({ "explanation": "means hello" })).expect("parse");
        assert_eq!(
            parsed,
            Response::Explanation {
                explanation: "means hello".to_string()
            }
        );
        let parsed: Response = serde_json::from_value(json!({ "error": "nope" })).expect("parse");
        assert_eq!(parsed, Response::error("nope"));
    }
}
