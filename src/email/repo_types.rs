use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::email::crypto::EncryptedSecret;

/// Email settings embedded in the user row (`users.email_credentials`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailCredentialConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
    pub encrypted_password: EncryptedSecret, // never plaintext
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn default_use_ssl() -> bool {
    true
}
