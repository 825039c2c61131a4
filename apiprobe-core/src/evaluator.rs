//! Response evaluation against the `{data, status: {code, message}}` envelope.

use serde::Deserialize;
use serde_json::Value;

use crate::token::Token;

pub const NOT_JSON: &str = "response is not JSON";
pub const NO_ENVELOPE: &str = "response has no status envelope";

/// The uniform JSON wrapper of every API response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub data: Option<Value>,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Status {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of comparing one response against the expected code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub pass: bool,
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl Evaluation {
    pub fn fail(message: impl Into<String>) -> Evaluation {
        Evaluation {
            pass: false,
            code: None,
            message: Some(message.into()),
        }
    }
}

/// Compare the status code carried by `response_text` with `expected_code`.
pub fn evaluate(response_text: &str, expected_code: u16) -> Evaluation {
    let Ok(value) = serde_json::from_str::<Value>(response_text) else {
        return Evaluation::fail(NOT_JSON);
    };
    let Ok(envelope) = ApiEnvelope::deserialize(value) else {
        return Evaluation::fail(NO_ENVELOPE);
    };

    Evaluation {
        pass: envelope.status.code == i64::from(expected_code),
        code: Some(envelope.status.code),
        message: envelope.status.message,
    }
}

/// Token carried in `data.token` of a user endpoint response.
pub fn issued_token(response_text: &str) -> Option<Token> {
    let envelope: ApiEnvelope = serde_json::from_str(response_text).ok()?;
    let token = envelope.data?.get("token")?.as_str()?.to_string();
    (!token.is_empty()).then(|| Token::new(token))
}
