//! The `{response, error, friendly_error}` JSON envelope every handler in
//! this plane returns (§4.D, §6).

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize, Default)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_error: Option<String>,
}

impl Envelope {
    pub fn ok(response: Value) -> Self {
        Self { response: Some(response), error: None, friendly_error: None }
    }

    pub fn err(error: impl Into<String>, friendly_error: impl Into<String>) -> Self {
        Self { response: None, error: Some(error.into()), friendly_error: Some(friendly_error.into()) }
    }
}
