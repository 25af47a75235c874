use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::tokens::repo::Token;
use crate::users::password::{hash_password, verify_password};

/// User record. `password_hash` never serializes; `token` is the single
/// currently-unexpired token, joined at read time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub active: i32,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub token: Option<Token>,
}

/// Input for user creation. The password arrives in plaintext and is hashed
/// before anything touches the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_active")]
    pub active: i32,
}

fn default_active() -> i32 {
    1
}

/// Credential store: user records and password verification. Leaf component,
/// no dependency on tokens.
#[derive(Clone)]
pub struct Users {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Users {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn table(&self) -> &'static str {
        "users"
    }

    /// Creates a user and returns the new id. Duplicate email is `Conflict`,
    /// a missing required field `Validation`.
    pub async fn insert(&self, new: &NewUser) -> Result<i64> {
        for (field, value) in [
            ("first_name", &new.first_name),
            ("last_name", &new.last_name),
            ("email", &new.email),
            ("password", &new.password),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{field} is required")));
            }
        }
        let now = self.clock.now();
        let user = User {
            id: 0,
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            email: new.email.clone(),
            active: new.active,
            password_hash: hash_password(&new.password)?,
            created_at: now,
            updated_at: now,
            token: None,
        };
        let id = self.store.insert_user(&user).await?;
        debug!(user_id = id, email = %user.email, "user created");
        Ok(id)
    }

    /// Fetches a user by id, with its currently-unexpired token joined in.
    pub async fn get(&self, id: i64) -> Result<User> {
        let mut user = self.store.get_user(id).await?.ok_or(Error::NotFound)?;
        self.attach_live_token(&mut user).await?;
        Ok(user)
    }

    /// All users ordered by last name. No token join; empty is not an error.
    pub async fn get_all(&self) -> Result<Vec<User>> {
        self.store.get_all_users().await
    }

    /// As `get`, keyed by email. Exact match; the HTTP edge normalizes case.
    pub async fn get_by_email(&self, email: &str) -> Result<User> {
        let mut user = self
            .store
            .get_user_by_email(email)
            .await?
            .ok_or(Error::NotFound)?;
        self.attach_live_token(&mut user).await?;
        Ok(user)
    }

    /// Full-record update keyed by id. Never alters `password_hash`;
    /// password changes go through `reset_password`.
    pub async fn update(&self, user: &User) -> Result<()> {
        let mut user = user.clone();
        user.updated_at = self.clock.now();
        if !self.store.update_user(&user).await? {
            return Err(Error::NotFound);
        }
        debug!(user_id = user.id, "user updated");
        Ok(())
    }

    /// Removes the user and, through the store, any tokens it owns.
    /// Deleting a nonexistent id is not an error.
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.store.delete_user(id).await
    }

    /// Recomputes and persists the password hash. Unlike `delete`, a missing
    /// user surfaces as `NotFound`; silent success here would mask a caller
    /// bug.
    pub async fn reset_password(&self, id: i64, new_password: &str) -> Result<()> {
        let hash = hash_password(new_password)?;
        if !self
            .store
            .set_password_hash(id, &hash, self.clock.now())
            .await?
        {
            return Err(Error::NotFound);
        }
        debug!(user_id = id, "password reset");
        Ok(())
    }

    /// Checks a candidate password against the stored hash via the Argon2
    /// verifier. An empty candidate is `Ok(false)`, never an error, and so
    /// is any wrong password.
    pub fn password_matches(&self, user: &User, candidate: &str) -> Result<bool> {
        if candidate.is_empty() {
            return Ok(false);
        }
        verify_password(candidate, &user.password_hash)
    }

    async fn attach_live_token(&self, user: &mut User) -> Result<()> {
        let now = self.clock.now();
        let tokens = self.store.get_tokens_for_user(user.id).await?;
        user.token = tokens.into_iter().find(|t| t.expiry > now);
        Ok(())
    }
}
