//! Uniform result shapes
//!
//! `ApiEnvelope` is what the backend sends; `ActionResponse` is what callers
//! of the fetch and mutation paths receive. Errors become data here and only
//! here.

use crate::error::{FieldError, SyncError};
use serde::{Deserialize, Serialize};

/// Backend response wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the payload of a successful envelope
    ///
    /// # Errors
    /// - `SyncError::Rejected` if `success` is false
    /// - `SyncError::Decode` if a successful envelope carries no data
    pub fn into_data(self) -> Result<T, SyncError> {
        if !self.success {
            return Err(SyncError::Rejected(if self.message.is_empty() {
                "request rejected".to_string()
            } else {
                self.message
            }));
        }
        self.data
            .ok_or_else(|| SyncError::Decode("successful response without data".to_string()))
    }
}

/// Result handed to callers of fetch and mutation operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse<T> {
    pub success: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Field-level problems for validation failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl<T> ActionResponse<T> {
    /// Successful response
    #[must_use]
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            errors: Vec::new(),
        }
    }

    /// Failed response with a message
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            errors: Vec::new(),
        }
    }

    /// Failed response with field-level errors
    #[must_use]
    pub fn invalid(errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors,
        }
    }

    /// Map the payload
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ActionResponse<U> {
        ActionResponse {
            success: self.success,
            data: self.data.map(f),
            message: self.message,
            errors: self.errors,
        }
    }
}

impl<T> From<SyncError> for ActionResponse<T> {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::Validation(errors) => Self::invalid(errors.0),
            other => Self::failure(other.user_message()),
        }
    }
}

impl<T> From<Result<T, SyncError>> for ActionResponse<T> {
    fn from(result: Result<T, SyncError>) -> Self {
        match result {
            Ok(data) => Self::ok(data, "OK"),
            Err(error) => error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrors;
    use crate::types::AnalysisId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_envelope_rejected() {
        let envelope: ApiEnvelope<u32> =
            serde_json::from_str(r#"{"success": false, "message": "Analysis is running"}"#).unwrap();
        assert_eq!(
            envelope.into_data(),
            Err(SyncError::Rejected("Analysis is running".into()))
        );
    }

    #[test]
    fn test_envelope_success_without_data() {
        let envelope: ApiEnvelope<u32> =
            serde_json::from_str(r#"{"success": true, "message": "ok", "code": 200}"#).unwrap();
        assert!(matches!(envelope.into_data(), Err(SyncError::Decode(_))));
    }

    #[test]
    fn test_not_found_becomes_failure() {
        let response: ActionResponse<()> = SyncError::NotFound(AnalysisId::new()).into();
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Analysis not found"));
        assert!(response.data.is_none());
    }

    #[test]
    fn test_validation_becomes_field_errors() {
        let mut errors = ValidationErrors::default();
        errors.push("coefficient", "must be non-negative");

        let response: ActionResponse<()> = SyncError::Validation(errors).into();
        assert!(!response.success);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].field, "coefficient");
    }

    #[test]
    fn test_from_ok_result() {
        let response: ActionResponse<u8> = Ok::<_, SyncError>(7).into();
        assert!(response.success);
        assert_eq!(response.map(u32::from).data, Some(7));
    }
}
