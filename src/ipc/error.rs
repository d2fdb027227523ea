use crate::error::{EngineError, ValidationError};
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}

/// Failure of one handler, rendered into the `error` object of the response.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        tracing::warn!(code = e.code(), "{}", e);
        Self {
            code: e.code(),
            details: e.details(),
            message: e.to_string(),
        }
    }
}

impl From<ValidationError> for HandlerErr {
    fn from(e: ValidationError) -> Self {
        EngineError::from(e).into()
    }
}
