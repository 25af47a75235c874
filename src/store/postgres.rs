use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::tokens::repo::Token;
use crate::users::repo::User;

/// Postgres backend. Uniqueness and referential integrity come from the
/// schema; 23505 maps to `Conflict` and 23503 to `Validation`, everything
/// else passes through as `Database`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_db_err(e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(ref db) = e {
        match db.code().as_deref() {
            Some("23505") => return Error::Conflict("email already in use".into()),
            Some("23503") => return Error::Validation("user does not exist".into()),
            _ => {}
        }
    }
    Error::Database(e)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (first_name, last_name, email, active, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.active)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(id)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, active, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, active, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_all_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, active, password_hash, created_at, updated_at
            FROM users
            ORDER BY last_name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn update_user(&self, user: &User) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET first_name = $1, last_name = $2, email = $3, active = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.active)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        // Tokens go with the user via ON DELETE CASCADE.
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_password_hash(
        &self,
        id: i64,
        hash: &str,
        updated_at: OffsetDateTime,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(hash)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_token(&self, token: &Token) -> Result<i64> {
        // Delete-old-plus-insert-new commits as one transaction; readers
        // never see two live tokens for the same user.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(token.user_id)
            .execute(&mut *tx)
            .await?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tokens (user_id, first_name, last_name, email, hash, created_at, expiry)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(token.user_id)
        .bind(&token.first_name)
        .bind(&token.last_name)
        .bind(&token.email)
        .bind(&token.hash)
        .bind(token.created_at)
        .bind(token.expiry)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;
        tx.commit().await?;
        Ok(id)
    }

    async fn get_token(&self, id: i64) -> Result<Option<Token>> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            SELECT id, user_id, first_name, last_name, email, hash, created_at, expiry
            FROM tokens
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn get_token_by_hash(&self, hash: &str) -> Result<Option<Token>> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            SELECT id, user_id, first_name, last_name, email, hash, created_at, expiry
            FROM tokens
            WHERE hash = $1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn get_tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        let tokens = sqlx::query_as::<_, Token>(
            r#"
            SELECT id, user_id, first_name, last_name, email, hash, created_at, expiry
            FROM tokens
            WHERE user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }

    async fn delete_token(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_token_by_hash(&self, hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM tokens WHERE hash = $1")
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
