use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::services::AuthUser,
    email::{
        dto::{
            CategoriesResponse, CredentialsRequest, EmailsResponse, FoldersResponse,
            GetCredentialsResponse, MailboxRequest, SaveCredentialsResponse, SuccessResponse,
            SummaryResponse,
        },
        params::{validate_credentials, MailboxQuery},
        services,
    },
    error::{ApiError, EmailError},
    extract::JsonBody,
    state::AppState,
};

pub fn credential_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/email/credentials",
            post(save_credentials)
                .get(get_credentials)
                .delete(delete_credentials),
        )
        .route("/email/test-connection", post(test_connection))
}

pub fn tool_routes() -> Router<AppState> {
    Router::new()
        .route("/email/folders", get(get_folders))
        .route("/email/fetch", post(fetch_emails))
        .route("/email/summarize", post(summarize_emails))
        .route("/email/categorize", post(categorize_emails))
}

/// Logs with user and operation context, then maps to the HTTP taxonomy.
fn reject(state: &AppState, user_id: Uuid, operation: &'static str, err: EmailError) -> ApiError {
    match &err {
        EmailError::Validation { field, message } => {
            warn!(%user_id, operation, field, %message, "email request rejected")
        }
        EmailError::NoCredentials => warn!(%user_id, operation, "no email credentials stored"),
        EmailError::Connection(msg) => warn!(%user_id, operation, error = %msg, "email connection failed"),
        _ => error!(%user_id, operation, error = %err, "email operation failed"),
    }
    ApiError::from_email(err, state.config.expose_error_details)
}

#[instrument(skip(state, payload))]
pub async fn save_credentials(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> Result<Json<SaveCredentialsResponse>, ApiError> {
    let op = "save_credentials";
    let creds = validate_credentials(payload).map_err(|e| reject(&state, user_id, op, e))?;
    services::save_credentials(&state, user_id, &creds)
        .await
        .map_err(|e| reject(&state, user_id, op, e))?;
    Ok(Json(SaveCredentialsResponse {
        success: true,
        has_credentials: true,
    }))
}

#[instrument(skip(state))]
pub async fn get_credentials(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<GetCredentialsResponse>, ApiError> {
    let config = services::get_credentials(&state, user_id)
        .await
        .map_err(|e| reject(&state, user_id, "get_credentials", e))?;
    Ok(Json(GetCredentialsResponse {
        success: true,
        has_credentials: config.is_some(),
        config,
    }))
}

#[instrument(skip(state))]
pub async fn delete_credentials(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<SuccessResponse>, ApiError> {
    services::delete_credentials(&state, user_id)
        .await
        .map_err(|e| reject(&state, user_id, "delete_credentials", e))?;
    Ok(Json(SuccessResponse { success: true }))
}

#[instrument(skip(state, payload))]
pub async fn test_connection(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> Result<Json<FoldersResponse>, ApiError> {
    let op = "test_connection";
    let creds = validate_credentials(payload).map_err(|e| reject(&state, user_id, op, e))?;
    let folders = services::test_connection(&state, &creds)
        .await
        .map_err(|e| reject(&state, user_id, op, e))?;
    info!(%user_id, host = %creds.host, folders = folders.len(), "email connection verified");
    Ok(Json(FoldersResponse {
        success: true,
        folders,
    }))
}

#[instrument(skip(state))]
pub async fn get_folders(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<FoldersResponse>, ApiError> {
    let folders = services::list_folders(&state, user_id)
        .await
        .map_err(|e| reject(&state, user_id, "list_folders", e))?;
    Ok(Json(FoldersResponse {
        success: true,
        folders,
    }))
}

#[instrument(skip(state, payload))]
pub async fn fetch_emails(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<MailboxRequest>,
) -> Result<Json<EmailsResponse>, ApiError> {
    let op = "fetch_emails";
    let query = MailboxQuery::from_request(payload).map_err(|e| reject(&state, user_id, op, e))?;
    let (emails, count) = services::fetch_emails(&state, user_id, &query)
        .await
        .map_err(|e| reject(&state, user_id, op, e))?;
    Ok(Json(EmailsResponse {
        success: true,
        emails,
        count,
    }))
}

#[instrument(skip(state, payload))]
pub async fn summarize_emails(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<MailboxRequest>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let op = "summarize_emails";
    let query = MailboxQuery::from_request(payload).map_err(|e| reject(&state, user_id, op, e))?;
    let summary = services::summarize_emails(&state, user_id, &query)
        .await
        .map_err(|e| reject(&state, user_id, op, e))?;
    Ok(Json(SummaryResponse {
        success: true,
        summary,
    }))
}

#[instrument(skip(state, payload))]
pub async fn categorize_emails(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<MailboxRequest>,
) -> Result<Json<CategoriesResponse>, ApiError> {
    let op = "categorize_emails";
    let query = MailboxQuery::from_request(payload).map_err(|e| reject(&state, user_id, op, e))?;
    let categories = services::categorize_emails(&state, user_id, &query)
        .await
        .map_err(|e| reject(&state, user_id, op, e))?;
    Ok(Json(CategoriesResponse {
        success: true,
        categories,
    }))
}
