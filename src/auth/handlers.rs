use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, CredentialsBody, MeResponse, PublicUser, RefreshRequest},
        repo_types::User,
        services::{hash_password, is_valid_email, verify_password, AuthUser, JwtKeys},
    },
    error::ApiError,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse, ApiError> {
    let expose = state.config.expose_error_details;
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id).map_err(|e| {
        error!(error = %e, user_id = %user.id, "jwt sign access failed");
        ApiError::internal(e, expose)
    })?;
    let refresh_token = keys.sign_refresh(user.id).map_err(|e| {
        error!(error = %e, user_id = %user.id, "jwt sign refresh failed");
        ApiError::internal(e, expose)
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser {
            id: user.id,
            email: user.email,
        },
    })
}

/// Lowercases and checks the email of a register/login body.
fn normalized_email(payload: &mut CredentialsBody) -> Result<(), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<CredentialsBody>,
) -> Result<Json<AuthResponse>, ApiError> {
    let expose = state.config.expose_error_details;
    normalized_email(&mut payload)?;

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::bad_request("Password too short"));
    }

    match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(_)) => {
            warn!(email = %payload.email, "email already registered");
            return Err(ApiError::conflict("Email already registered"));
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(ApiError::internal(e, expose));
        }
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        ApiError::internal(e, expose)
    })?;

    let user = User::create(&state.db, &payload.email, &hash)
        .await
        .map_err(|e| {
            error!(error = %e, "create user failed");
            ApiError::internal(e, expose)
        })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    issue_tokens(&state, user).map(Json)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<CredentialsBody>,
) -> Result<Json<AuthResponse>, ApiError> {
    let expose = state.config.expose_error_details;
    normalized_email(&mut payload)?;

    let user = match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(ApiError::internal(e, expose));
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        ApiError::internal(e, expose)
    })?;
    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue_tokens(&state, user).map(Json)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let claims = JwtKeys::from_ref(&state)
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    let user = load_user(&state, claims.sub).await?;
    issue_tokens(&state, user).map(Json)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let user = load_user(&state, user_id).await?;
    let has_email_credentials = state
        .credentials
        .load(user_id)
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, "load email credentials failed");
            ApiError::internal(e, state.config.expose_error_details)
        })?
        .is_some();

    Ok(Json(MeResponse {
        user: PublicUser {
            id: user.id,
            email: user.email,
        },
        has_email_credentials,
    }))
}

async fn load_user(state: &AppState, user_id: Uuid) -> Result<User, ApiError> {
    match User::find_by_id(&state.db, user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            warn!(%user_id, "user not found");
            Err(ApiError::unauthorized("User not found"))
        }
        Err(e) => {
            error!(error = %e, %user_id, "load user failed");
            Err(ApiError::internal(e, state.config.expose_error_details))
        }
    }
}
