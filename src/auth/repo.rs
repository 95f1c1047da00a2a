use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::repo_types::PasswordResetToken;
use crate::db::PgStore;

#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn insert(&self, token: &PasswordResetToken) -> anyhow::Result<()>;
    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<PasswordResetToken>>;
    async fn mark_used(&self, id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
impl ResetTokenStore for PgStore {
    async fn insert(&self, token: &PasswordResetToken) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO password_resets (id, user_id, token, expires_at, used)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.expires_at)
        .bind(token.used)
        .execute(&self.db)
        .await
        .context("insert reset token")?;
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<PasswordResetToken>> {
        let row = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, token, expires_at, used
            FROM password_resets
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .context("find reset token")?;
        Ok(row)
    }

    async fn mark_used(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE password_resets SET used = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("mark reset token used")?;
        Ok(())
    }
}
