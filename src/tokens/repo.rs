use std::sync::Arc;

use axum::http::HeaderMap;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::users::repo::User;

/// Random bytes per token; hex-encoded, so the plaintext is twice as long.
pub const TOKEN_BYTES: usize = 13;
/// Length of the opaque string handed to clients.
pub const TOKEN_LENGTH: usize = TOKEN_BYTES * 2;

/// Stored token row. `plain_text` is handed out once at generation and is
/// never persisted; rows loaded from the store carry it empty. The owner
/// identity fields are a snapshot taken at insert, not a live view.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Token {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub plain_text: String,
    #[serde(skip_serializing, default)]
    pub hash: String,
    pub created_at: OffsetDateTime,
    pub expiry: OffsetDateTime,
}

/// Sha-256 of the presented value, hex-encoded. Lookups compare digests, so
/// equality checking never walks the secret bytes themselves.
pub(crate) fn hash_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

/// Pulls the token value out of an `Authorization: Bearer <token>` header.
/// Anything other than the exact two-part form is rejected.
pub(crate) fn parse_bearer(headers: &HeaderMap) -> Result<&str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(Error::Unauthenticated)?;
    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" {
        return Err(Error::Unauthenticated);
    }
    Ok(parts[1])
}

/// Token manager: issues opaque bearer tokens, validates presented ones and
/// resolves them back to their owning user.
#[derive(Clone)]
pub struct Tokens {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Tokens {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn table(&self) -> &'static str {
        "tokens"
    }

    /// Builds a new token value: random plaintext, derived hash, expiry at
    /// `now + ttl`. Pure computation, no store I/O. A zero or negative ttl
    /// yields an already-expired token on purpose; expiry handling is
    /// exercised that way.
    pub fn generate_token(&self, user_id: i64, ttl: Duration) -> Token {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let plain_text = hex::encode(bytes);
        let hash = hash_token(&plain_text);
        let now = self.clock.now();
        Token {
            id: 0,
            user_id,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            plain_text,
            hash,
            created_at: now,
            expiry: now + ttl,
        }
    }

    /// Persists a token, replacing any previously stored tokens for the
    /// owner: at most one row per user after this succeeds. The owner's
    /// identity fields are denormalized into the row here.
    pub async fn insert(&self, token: &Token, user: &User) -> Result<i64> {
        if token.user_id != user.id {
            return Err(Error::Validation(
                "token does not belong to this user".into(),
            ));
        }
        let mut row = token.clone();
        row.first_name = user.first_name.clone();
        row.last_name = user.last_name.clone();
        row.email = user.email.clone();
        let id = self.store.replace_token(&row).await?;
        debug!(token_id = id, user_id = user.id, "token stored");
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Token> {
        if id == 0 {
            return Err(Error::NotFound);
        }
        self.store.get_token(id).await?.ok_or(Error::NotFound)
    }

    /// Looks a token up by its plaintext. Existence only; expiry is not
    /// enforced here.
    pub async fn get_by_token(&self, plain_text: &str) -> Result<Token> {
        self.store
            .get_token_by_hash(&hash_token(plain_text))
            .await?
            .ok_or(Error::NotFound)
    }

    /// As `get_by_token`, but resolves the owning user as well. A malformed
    /// plaintext, a missing row, and a deleted owner all come back as
    /// `NotFound`; the dangling-owner case must not panic.
    pub async fn get_user_for_token(&self, plain_text: &str) -> Result<User> {
        if plain_text.len() != TOKEN_LENGTH {
            return Err(Error::NotFound);
        }
        let token = self.get_by_token(plain_text).await?;
        let mut user = self
            .store
            .get_user(token.user_id)
            .await?
            .ok_or(Error::NotFound)?;
        if token.expiry > self.clock.now() {
            user.token = Some(token);
        }
        Ok(user)
    }

    /// All stored tokens for a user; normally zero or one given
    /// replace-on-insert. Empty is not an error.
    pub async fn get_tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        self.store.get_tokens_for_user(user_id).await
    }

    /// `Ok(true)` iff the token exists and has not expired. A missing token
    /// is `NotFound`, an expired one `Unauthenticated`; callers that care
    /// can tell the three outcomes apart.
    pub async fn valid_token(&self, plain_text: &str) -> Result<bool> {
        let token = self.get_by_token(plain_text).await?;
        if token.expiry <= self.clock.now() {
            return Err(Error::Unauthenticated);
        }
        Ok(true)
    }

    /// Deletes the row matching the plaintext. No match is not an error;
    /// logout after logout stays a 200.
    pub async fn delete_by_token(&self, plain_text: &str) -> Result<()> {
        self.store.delete_token_by_hash(&hash_token(plain_text)).await
    }

    /// Deletes by primary key. Absence is tolerated silently.
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.store.delete_token(id).await
    }

    /// Request-facing entry point: parses the `Authorization` header,
    /// resolves and validates the token, returns the owning user. Every
    /// authentication failure collapses to `Unauthenticated`; only backend
    /// failures pass through as themselves.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User> {
        let value = parse_bearer(headers)?;
        if value.len() != TOKEN_LENGTH {
            // Cheap rejection, no store lookup for malformed input.
            warn!(len = value.len(), "bearer token with wrong length");
            return Err(Error::Unauthenticated);
        }
        let user = match self.get_user_for_token(value).await {
            Ok(user) => user,
            Err(Error::NotFound) => return Err(Error::Unauthenticated),
            Err(e) => return Err(e),
        };
        match self.valid_token(value).await {
            Ok(_) => Ok(user),
            Err(Error::NotFound) | Err(Error::Unauthenticated) => Err(Error::Unauthenticated),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::MemoryStore;
    use crate::users::repo::{NewUser, Users};
    use axum::http::header::AUTHORIZATION;

    fn fixture() -> (Users, Tokens, Arc<ManualClock>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH));
        let users = Users::new(store.clone(), clock.clone());
        let tokens = Tokens::new(store, clock.clone());
        (users, tokens, clock)
    }

    async fn seed_user(users: &Users, email: &str) -> User {
        let id = users
            .insert(&NewUser {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: email.into(),
                password: "engine-no-9".into(),
                active: 1,
            })
            .await
            .expect("insert user");
        users.get(id).await.expect("get user")
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {value}").parse().unwrap());
        headers
    }

    #[test]
    fn table_name() {
        let (_, tokens, _) = fixture();
        assert_eq!(tokens.table(), "tokens");
    }

    #[tokio::test]
    async fn generate_token_shape() {
        let (_, tokens, _) = fixture();
        let token = tokens.generate_token(7, Duration::hours(24));
        assert_eq!(token.plain_text.len(), TOKEN_LENGTH);
        assert_eq!(token.hash, hash_token(&token.plain_text));
        assert_eq!(token.user_id, 7);
        assert!(token.expiry > token.created_at);
    }

    #[tokio::test]
    async fn generate_token_accepts_negative_ttl() {
        let (_, tokens, _) = fixture();
        let token = tokens.generate_token(7, Duration::hours(-24));
        assert!(token.expiry < token.created_at);
    }

    #[tokio::test]
    async fn insert_then_valid() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(24));
        tokens.insert(&token, &user).await.expect("insert token");
        assert!(tokens.valid_token(&token.plain_text).await.expect("valid"));
    }

    #[tokio::test]
    async fn insert_rejects_mismatched_owner() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id + 1, Duration::hours(24));
        let err = tokens.insert(&token, &user).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn insert_rejects_unknown_owner() {
        let (_, tokens, _) = fixture();
        let ghost = User {
            id: 999,
            first_name: "No".into(),
            last_name: "Body".into(),
            email: "nobody@example.com".into(),
            active: 1,
            password_hash: String::new(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            token: None,
        };
        let token = tokens.generate_token(999, Duration::hours(24));
        let err = tokens.insert(&token, &ghost).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn second_insert_replaces_first() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let first = tokens.generate_token(user.id, Duration::hours(24));
        tokens.insert(&first, &user).await.expect("first insert");
        let second = tokens.generate_token(user.id, Duration::hours(24));
        tokens.insert(&second, &user).await.expect("second insert");

        let stored = tokens.get_tokens_for_user(user.id).await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].hash, second.hash);
        assert!(matches!(
            tokens.valid_token(&first.plain_text).await.unwrap_err(),
            Error::NotFound
        ));
    }

    #[tokio::test]
    async fn get_rejects_zero_id() {
        let (_, tokens, _) = fixture();
        assert!(matches!(tokens.get(0).await.unwrap_err(), Error::NotFound));
    }

    #[tokio::test]
    async fn get_by_token_ignores_expiry() {
        let (users, tokens, clock) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(1));
        tokens.insert(&token, &user).await.expect("insert token");
        clock.advance(Duration::hours(2));

        // Row still exists, so existence lookup succeeds while validation fails.
        let found = tokens.get_by_token(&token.plain_text).await.expect("get");
        assert_eq!(found.user_id, user.id);
        assert!(matches!(
            tokens.valid_token(&token.plain_text).await.unwrap_err(),
            Error::Unauthenticated
        ));
    }

    #[tokio::test]
    async fn expired_token_is_distinguishable_from_missing() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let expired = tokens.generate_token(user.id, Duration::hours(-24));
        tokens.insert(&expired, &user).await.expect("insert token");

        assert!(matches!(
            tokens.valid_token(&expired.plain_text).await.unwrap_err(),
            Error::Unauthenticated
        ));
        assert!(matches!(
            tokens.valid_token("00000000000000000000000000").await.unwrap_err(),
            Error::NotFound
        ));
    }

    #[tokio::test]
    async fn delete_by_token_is_idempotent() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(24));
        tokens.insert(&token, &user).await.expect("insert token");

        tokens.delete_by_token(&token.plain_text).await.expect("first delete");
        tokens.delete_by_token(&token.plain_text).await.expect("second delete");
        assert!(matches!(
            tokens.valid_token(&token.plain_text).await.unwrap_err(),
            Error::NotFound
        ));
    }

    #[tokio::test]
    async fn delete_by_id_tolerates_absence() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(24));
        let id = tokens.insert(&token, &user).await.expect("insert token");

        tokens.delete(id).await.expect("delete");
        tokens.delete(id).await.expect("delete again");
        tokens.delete(424242).await.expect("delete unknown");
    }

    #[tokio::test]
    async fn get_user_for_token_embeds_live_token() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(24));
        tokens.insert(&token, &user).await.expect("insert token");

        let resolved = tokens
            .get_user_for_token(&token.plain_text)
            .await
            .expect("resolve");
        assert_eq!(resolved.id, user.id);
        let embedded = resolved.token.expect("embedded token");
        assert_eq!(embedded.hash, token.hash);
        // Plaintext is never reconstructible from the stored row.
        assert!(embedded.plain_text.is_empty());
    }

    #[tokio::test]
    async fn get_user_for_token_rejects_wrong_length() {
        let (_, tokens, _) = fixture();
        assert!(matches!(
            tokens.get_user_for_token("short").await.unwrap_err(),
            Error::NotFound
        ));
    }

    #[tokio::test]
    async fn get_user_for_token_handles_deleted_owner() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(24));
        tokens.insert(&token, &user).await.expect("insert token");

        users.delete(user.id).await.expect("delete user");
        assert!(matches!(
            tokens.get_user_for_token(&token.plain_text).await.unwrap_err(),
            Error::NotFound
        ));
    }

    #[tokio::test]
    async fn authenticate_happy_path() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(24));
        tokens.insert(&token, &user).await.expect("insert token");

        let authed = tokens
            .authenticate(&bearer(&token.plain_text))
            .await
            .expect("authenticate");
        assert_eq!(authed.id, user.id);
        assert_eq!(authed.email, user.email);
    }

    #[tokio::test]
    async fn authenticate_rejects_bad_headers() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(24));
        tokens.insert(&token, &user).await.expect("insert token");

        let cases: Vec<HeaderMap> = vec![
            HeaderMap::new(),
            {
                let mut h = HeaderMap::new();
                h.insert(AUTHORIZATION, "invalid".parse().unwrap());
                h
            },
            {
                let mut h = HeaderMap::new();
                h.insert(
                    AUTHORIZATION,
                    format!("Basic {}", token.plain_text).parse().unwrap(),
                );
                h
            },
            {
                let mut h = HeaderMap::new();
                h.insert(
                    AUTHORIZATION,
                    format!("Bearer  {}", token.plain_text).parse().unwrap(),
                );
                h
            },
            bearer("tooshort"),
            bearer("ffffffffffffffffffffffffff"),
        ];
        for headers in cases {
            assert!(matches!(
                tokens.authenticate(&headers).await.unwrap_err(),
                Error::Unauthenticated
            ));
        }
    }

    #[tokio::test]
    async fn authenticate_rejects_expired_token() {
        let (users, tokens, clock) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(1));
        tokens.insert(&token, &user).await.expect("insert token");

        clock.advance(Duration::hours(2));
        assert!(matches!(
            tokens.authenticate(&bearer(&token.plain_text)).await.unwrap_err(),
            Error::Unauthenticated
        ));
    }

    #[tokio::test]
    async fn authenticate_rejects_token_of_deleted_user() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(24));
        tokens.insert(&token, &user).await.expect("insert token");

        users.delete(user.id).await.expect("delete user");
        assert!(matches!(
            tokens.authenticate(&bearer(&token.plain_text)).await.unwrap_err(),
            Error::Unauthenticated
        ));
    }

    #[tokio::test]
    async fn pre_expired_token_scenario() {
        let (users, tokens, _) = fixture();
        let user = seed_user(&users, "ada@example.com").await;
        let token = tokens.generate_token(user.id, Duration::hours(-24));
        tokens.insert(&token, &user).await.expect("insert token");

        assert!(tokens.valid_token(&token.plain_text).await.is_err());
        assert!(tokens.authenticate(&bearer(&token.plain_text)).await.is_err());
    }
}
