use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::email::repo_types::EmailCredentialConfig;

/// Persistence of the per-user embedded credential document.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> anyhow::Result<Option<EmailCredentialConfig>>;
    /// Replaces whatever the user had stored before, except that an existing
    /// `createdAt` wins over the one in `config`. The merge happens in one
    /// statement so concurrent saves cannot lose it.
    async fn save(&self, user_id: Uuid, config: &EmailCredentialConfig) -> anyhow::Result<()>;
    async fn delete(&self, user_id: Uuid) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn load(&self, user_id: Uuid) -> anyhow::Result<Option<EmailCredentialConfig>> {
        let row = sqlx::query_scalar::<_, Option<Json<EmailCredentialConfig>>>(
            r#"
            SELECT email_credentials
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("load email credentials")?;
        Ok(row.flatten().map(|Json(config)| config))
    }

    async fn save(&self, user_id: Uuid, config: &EmailCredentialConfig) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE users
            SET email_credentials = $2 || jsonb_build_object(
                'createdAt',
                COALESCE(email_credentials -> 'createdAt', $2 -> 'createdAt')
            )
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(Json(config))
        .execute(&self.db)
        .await
        .context("save email credentials")?;
        anyhow::ensure!(res.rows_affected() == 1, "user {} not found", user_id);
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET email_credentials = NULL
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.db)
        .await
        .context("delete email credentials")?;
        Ok(())
    }
}


#[cfg(test)]
mod repo_tests {
    use time::{Duration, OffsetDateTime};

    use super::testing::MemoryCredentialStore;
    use super::*;
    use crate::email::crypto::CredentialCipher;

    fn config(host: &str, at: OffsetDateTime) -> EmailCredentialConfig {
        EmailCredentialConfig {
            host: host.into(),
            port: 993,
            username: "a@example.com".into(),
            use_ssl: true,
            encrypted_password: CredentialCipher::ephemeral().encrypt("pw").unwrap().unwrap(),
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn save_keeps_the_first_created_at() {
        let store = MemoryCredentialStore::default();
        let user = Uuid::new_v4();
        let first = OffsetDateTime::now_utc() - Duration::days(3);
        let later = OffsetDateTime::now_utc();

        store.save(user, &config("imap.a.com", first)).await.unwrap();
        store.save(user, &config("imap.b.com", later)).await.unwrap();

        let stored = store.load(user).await.unwrap().unwrap();
        assert_eq!(stored.host, "imap.b.com");
        assert_eq!(stored.created_at, first);
        assert_eq!(stored.updated_at, later);
    }

    #[tokio::test]
    async fn save_after_delete_starts_fresh() {
        let store = MemoryCredentialStore::default();
        let user = Uuid::new_v4();
        let first = OffsetDateTime::now_utc() - Duration::days(3);
        let later = OffsetDateTime::now_utc();

        store.save(user, &config("imap.a.com", first)).await.unwrap();
        store.delete(user).await.unwrap();
        store.save(user, &config("imap.a.com", later)).await.unwrap();

        assert_eq!(store.raw(user).unwrap().created_at, later);
    }
}
