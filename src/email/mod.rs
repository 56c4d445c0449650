use crate::state::AppState;
use axum::Router;

pub mod crypto;
pub mod dto;
mod handlers;
pub mod params;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::credential_routes())
        .merge(handlers::tool_routes())
}
