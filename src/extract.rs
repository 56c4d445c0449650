use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::ApiError;

/// JSON request body whose rejections use the API error shape. An empty body
/// deserializes as `T::default()`, so every field falls back to its default.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            warn!(error = %e, "request body unreadable");
            ApiError::bad_request("Request body could not be read")
        })?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        serde_json::from_slice(&bytes).map(JsonBody).map_err(|e| {
            warn!(error = %e, "request body is not valid JSON");
            let mut api = ApiError::bad_request("Request body must be a JSON object");
            api.details = Some(e.to_string());
            api
        })
    }
}
