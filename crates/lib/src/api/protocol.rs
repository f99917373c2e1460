//! Response wire type shared by the server and the client.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Error,
}

/// Wire response: `{ "status", "message" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    pub message: String,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ApiStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let v = serde_json::to_value(ApiResponse::error("Method not allowed")).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"status": "error", "message": "Method not allowed"})
        );
        let r: ApiResponse =
            serde_json::from_str(r#"{"status":"success","message":"ok"}"#).unwrap();
        assert!(r.is_success());
    }
}
