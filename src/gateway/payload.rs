use serde::{Deserialize, Serialize};

pub const CODE_OK: &str = "OK";
pub const MESSAGE_SUCCESS: &str = "Success";

/// Response envelope shared by every endpoint outcome.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: CODE_OK.to_string(),
            message: MESSAGE_SUCCESS.to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScoreRequest {
    pub inputs: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ScoreData {
    pub dec_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::ok(ScoreData { dec_score: 0.1732 })).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"code": "OK", "message": "Success", "data": {"dec_score": 0.1732}})
        );
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let body =
            serde_json::to_value(ApiResponse::<ScoreData>::error("TIMEOUT", "too slow")).unwrap();
        assert_eq!(body, serde_json::json!({"code": "TIMEOUT", "message": "too slow"}));
    }

    #[test]
    fn test_error_envelope_parses_without_data() {
        let parsed: ApiResponse<ScoreData> =
            serde_json::from_str(r#"{"code":"BAD_REQUEST","message":"nope"}"#).unwrap();
        assert!(parsed.data.is_none());
        assert!(!parsed.is_ok());
    }
}
