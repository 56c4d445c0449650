use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::email::crypto::CryptoError;
use crate::mcp::ToolError;

/// Failures of the email credential and tool operations.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("no email credentials configured")]
    NoCredentials,
    #[error("email connection failed: {0}")]
    Connection(String),
    #[error("email tool failed: {0}")]
    Tool(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EmailError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Classifies a tool failure as a connection problem or a tool problem.
    pub fn from_tool(err: ToolError) -> Self {
        if err.is_connection_failure() {
            Self::Connection(err.to_string())
        } else {
            Self::Tool(err.to_string())
        }
    }
}

/// JSON error response: `{success:false, error, message, field?, details?}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub field: Option<&'static str>,
    pub details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "ValidationError", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "Conflict", message)
    }

    /// Generic 500; `details` only reaches the client when `expose` is set.
    pub fn internal(err: impl std::fmt::Display, expose: bool) -> Self {
        let mut api = Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalError",
            "Internal server error",
        );
        if expose {
            api.details = Some(err.to_string());
        }
        api
    }

    pub fn from_email(err: EmailError, expose: bool) -> Self {
        match err {
            EmailError::Validation { field, message } => Self {
                field: Some(field),
                ..Self::new(StatusCode::BAD_REQUEST, "ValidationError", message)
            },
            EmailError::NoCredentials => Self::new(
                StatusCode::UNAUTHORIZED,
                "EmailAuthError",
                "No email credentials configured. Please set up your email settings first.",
            ),
            EmailError::Connection(msg) => {
                let mut api = Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "EmailConnectionError",
                    "Could not connect to the email server",
                );
                if expose {
                    api.details = Some(msg);
                }
                api
            }
            EmailError::Tool(msg) => {
                let mut api = Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "EmailToolError",
                    "Email tool call failed",
                );
                if expose {
                    api.details = Some(msg);
                }
                api
            }
            EmailError::Crypto(e) => Self::internal(e, expose),
            EmailError::Internal(e) => Self::internal(format!("{:#}", e), expose),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.kind,
            message: &self.message,
            field: self.field,
            details: self.details.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn taxonomy_status_codes() {
        let cases = [
            (EmailError::invalid("port", "out of range"), StatusCode::BAD_REQUEST),
            (EmailError::NoCredentials, StatusCode::UNAUTHORIZED),
            (EmailError::Connection("refused".into()), StatusCode::SERVICE_UNAVAILABLE),
            (EmailError::Tool("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                EmailError::Internal(anyhow::anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from_email(err, false).status, status);
        }
    }

    #[test]
    fn validation_error_names_the_field() {
        let api = ApiError::from_email(EmailError::invalid("host", "host is required"), false);
        assert_eq!(api.kind, "ValidationError");
        assert_eq!(api.field, Some("host"));
        assert_eq!(api.message, "host is required");
    }

    #[test]
    fn internal_details_only_in_development() {
        let hidden = ApiError::from_email(EmailError::Internal(anyhow::anyhow!("secret sauce")), false);
        assert!(hidden.details.is_none());
        let shown = ApiError::from_email(EmailError::Internal(anyhow::anyhow!("secret sauce")), true);
        assert_eq!(shown.details.as_deref(), Some("secret sauce"));
    }

    #[test]
    fn connection_details_only_in_development() {
        let msg = "failed to start tool server: /opt/tools/imap-mcp not found";
        let hidden = ApiError::from_email(EmailError::Connection(msg.into()), false);
        assert_eq!(hidden.kind, "EmailConnectionError");
        assert!(hidden.details.is_none());
        let shown = ApiError::from_email(EmailError::Connection(msg.into()), true);
        assert_eq!(shown.details.as_deref(), Some(msg));
    }

    #[test]
    fn tool_errors_split_by_connection_kind() {
        let conn = EmailError::from_tool(ToolError::Timeout(std::time::Duration::from_secs(1)));
        assert!(matches!(conn, EmailError::Connection(_)));
        let tool = EmailError::from_tool(ToolError::Failed("Unknown tool: x".into()));
        assert!(matches!(tool, EmailError::Tool(_)));
    }
}
