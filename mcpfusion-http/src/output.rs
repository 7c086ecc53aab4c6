//! The shaped result of one tool call (spec §4.6 step 8), serializable so
//! the response cache can store and replay it regardless of response type.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use mcpfusion_config::ResponseType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HttpEngineError, HttpResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    Json(Value),
    Text(String),
    Binary { base64: String },
}

impl ToolOutput {
    pub fn from_bytes(response_type: ResponseType, bytes: &[u8]) -> HttpResult<Self> {
        Ok(match response_type {
            ResponseType::Json => {
                let value = serde_json::from_slice::<Value>(bytes).map_err(|e| HttpEngineError::InvalidBody {
                    expected: "json",
                    detail: e.to_string(),
                })?;
                ToolOutput::Json(value)
            }
            ResponseType::Text => ToolOutput::Text(String::from_utf8_lossy(bytes).into_owned()),
            ResponseType::Binary => ToolOutput::Binary { base64: STANDARD.encode(bytes) },
        })
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ToolOutput::Json(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpfusion_config::ResponseType;

    #[test]
    fn json_response_is_parsed() {
        let output = ToolOutput::from_bytes(ResponseType::Json, br#"{"ok":true}"#).unwrap();
        assert!(matches!(output, ToolOutput::Json(_)));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(ToolOutput::from_bytes(ResponseType::Json, b"not json").is_err());
    }

    #[test]
    fn binary_response_is_base64_encoded() {
        let output = ToolOutput::from_bytes(ResponseType::Binary, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert!(matches!(output, ToolOutput::Binary { .. }));
    }
}
