use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::email::dto::CredentialSummary;
use crate::email::params::MailboxQuery;
use crate::email::repo_types::EmailCredentialConfig;
use crate::error::EmailError;
use crate::mcp::ImapCredentials;
use crate::state::AppState;

pub const TOOL_LIST_FOLDERS: &str = "list_folders";
pub const TOOL_FETCH_RECENT: &str = "fetch_recent_emails";
pub const TOOL_SUMMARIZE: &str = "summarize_emails";
pub const TOOL_CATEGORIZE: &str = "categorize_emails";

/// Encrypts the password and replaces the user's stored settings.
/// `createdAt` survives an overwrite.
pub async fn save_credentials(
    st: &AppState,
    user_id: Uuid,
    creds: &ImapCredentials,
) -> Result<(), EmailError> {
    let encrypted_password = st
        .cipher
        .encrypt(creds.password.expose_secret())?
        .ok_or_else(|| EmailError::invalid("password", "password must not be empty"))?;

    let now = OffsetDateTime::now_utc();
    // the store keeps an earlier createdAt
    let config = EmailCredentialConfig {
        host: creds.host.clone(),
        port: creds.port,
        username: creds.username.clone(),
        use_ssl: creds.use_ssl,
        encrypted_password,
        created_at: now,
        updated_at: now,
    };
    st.credentials.save(user_id, &config).await?;
    info!(%user_id, host = %config.host, "email credentials saved");
    Ok(())
}

pub async fn get_credentials(
    st: &AppState,
    user_id: Uuid,
) -> Result<Option<CredentialSummary>, EmailError> {
    Ok(st.credentials.load(user_id).await?.map(CredentialSummary::from))
}

pub async fn delete_credentials(st: &AppState, user_id: Uuid) -> Result<(), EmailError> {
    st.credentials.delete(user_id).await?;
    info!(%user_id, "email credentials deleted");
    Ok(())
}

/// Lists folders with credentials that have not been saved yet. Every failure
/// counts as a connection failure here.
pub async fn test_connection(st: &AppState, creds: &ImapCredentials) -> Result<Vec<Value>, EmailError> {
    let result = st
        .mail_tools
        .call_tool(
            &st.config.mail_tool.server_name,
            TOOL_LIST_FOLDERS,
            creds,
            Value::Object(Default::default()),
        )
        .await
        .map_err(|e| EmailError::Connection(e.to_string()))?;
    Ok(array_field(&result, "folders"))
}

pub async fn list_folders(st: &AppState, user_id: Uuid) -> Result<Vec<Value>, EmailError> {
    let result =
        call_with_stored(st, user_id, TOOL_LIST_FOLDERS, Value::Object(Default::default())).await?;
    Ok(array_field(&result, "folders"))
}

/// Returns the fetched emails and the count reported by the tool.
pub async fn fetch_emails(
    st: &AppState,
    user_id: Uuid,
    query: &MailboxQuery,
) -> Result<(Vec<Value>, usize), EmailError> {
    let result = call_with_stored(st, user_id, TOOL_FETCH_RECENT, query.fetch_arguments()).await?;
    let emails = array_field(&result, "emails");
    let count = result
        .get("count")
        .and_then(Value::as_u64)
        .map(|c| c as usize)
        .unwrap_or(emails.len());
    Ok((emails, count))
}

pub async fn summarize_emails(
    st: &AppState,
    user_id: Uuid,
    query: &MailboxQuery,
) -> Result<Value, EmailError> {
    let result = call_with_stored(st, user_id, TOOL_SUMMARIZE, query.summarize_arguments()).await?;
    Ok(result
        .get("summary")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default())))
}

pub async fn categorize_emails(
    st: &AppState,
    user_id: Uuid,
    query: &MailboxQuery,
) -> Result<Vec<Value>, EmailError> {
    let result = call_with_stored(st, user_id, TOOL_CATEGORIZE, query.categorize_arguments()).await?;
    Ok(array_field(&result, "categories"))
}

/// Decrypts the stored password into a payload owned by this call only.
async fn stored_credentials(st: &AppState, user_id: Uuid) -> Result<ImapCredentials, EmailError> {
    let stored = st
        .credentials
        .load(user_id)
        .await?
        .ok_or(EmailError::NoCredentials)?;
    let password = st.cipher.decrypt(&stored.encrypted_password)?;
    Ok(ImapCredentials {
        host: stored.host,
        port: stored.port,
        username: stored.username,
        password: SecretString::new(password.into()),
        use_ssl: stored.use_ssl,
    })
}

async fn call_with_stored(
    st: &AppState,
    user_id: Uuid,
    tool: &str,
    arguments: Value,
) -> Result<Value, EmailError> {
    let creds = stored_credentials(st, user_id).await?;
    debug!(%user_id, tool, "calling mail tool");
    st.mail_tools
        .call_tool(&st.config.mail_tool.server_name, tool, &creds, arguments)
        .await
        .map_err(EmailError::from_tool)
}

fn array_field(result: &Value, key: &str) -> Vec<Value> {
    match result.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}
