use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::email::repo_types::EmailCredentialConfig;

/// Body of save-credentials and test-connection. Fields stay untyped until
/// validation so a wrong type is reported against the field that carries it.
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub host: Option<Value>,
    #[serde(default)]
    pub port: Option<Value>,
    #[serde(default)]
    pub username: Option<Value>,
    #[serde(default)]
    pub password: Option<Value>,
    #[serde(default, alias = "useSsl")]
    pub use_ssl: Option<Value>,
}

/// Body of fetch, summarize and categorize.
#[derive(Debug, Default, Deserialize)]
pub struct MailboxRequest {
    #[serde(default)]
    pub folder: Option<Value>,
    #[serde(default)]
    pub days: Option<Value>,
    #[serde(default)]
    pub limit: Option<Value>,
    #[serde(default, alias = "unreadOnly")]
    pub unread_only: Option<Value>,
    #[serde(default, alias = "summaryType")]
    pub summary_type: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct SaveCredentialsResponse {
    pub success: bool,
    #[serde(rename = "hasCredentials")]
    pub has_credentials: bool,
}

/// Non-secret view of the stored settings.
#[derive(Debug, Serialize)]
pub struct CredentialSummary {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub use_ssl: bool,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "updatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<EmailCredentialConfig> for CredentialSummary {
    fn from(c: EmailCredentialConfig) -> Self {
        Self {
            host: c.host,
            port: c.port,
            username: c.username,
            use_ssl: c.use_ssl,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GetCredentialsResponse {
    pub success: bool,
    #[serde(rename = "hasCredentials")]
    pub has_credentials: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<CredentialSummary>,
}

#[derive(Debug, Serialize)]
pub struct FoldersResponse {
    pub success: bool,
    pub folders: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct EmailsResponse {
    pub success: bool,
    pub emails: Vec<Value>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub success: bool,
    pub summary: Value,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub success: bool,
    pub categories: Vec<Value>,
}
