use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::tokens::repo::Token;
use crate::users::repo::User;

#[derive(Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    tokens: BTreeMap<i64, Token>,
    next_user_id: i64,
    next_token_id: i64,
}

/// In-memory backend: `BTreeMap` tables behind one lock, which also makes
/// replace-on-insert atomic. Backs `AppState::fake()` and the test suite.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(Error::Conflict("email already in use".into()));
        }
        inner.next_user_id += 1;
        let id = inner.next_user_id;
        let mut stored = user.clone();
        stored.id = id;
        stored.token = None;
        inner.users.insert(id, stored);
        Ok(id)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_all_users(&self) -> Result<Vec<User>> {
        let inner = self.inner.lock().unwrap();
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| a.last_name.cmp(&b.last_name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn update_user(&self, user: &User) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        // Missing row wins over an email collision; a nonexistent id must
        // surface as absence, matching the Postgres UPDATE ... WHERE id.
        if !inner.users.contains_key(&user.id) {
            return Ok(false);
        }
        if inner
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(Error::Conflict("email already in use".into()));
        }
        match inner.users.get_mut(&user.id) {
            Some(stored) => {
                stored.first_name = user.first_name.clone();
                stored.last_name = user.last_name.clone();
                stored.email = user.email.clone();
                stored.active = user.active;
                stored.updated_at = user.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.users.remove(&id);
        inner.tokens.retain(|_, t| t.user_id != id);
        Ok(())
    }

    async fn set_password_hash(
        &self,
        id: i64,
        hash: &str,
        updated_at: OffsetDateTime,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.get_mut(&id) {
            Some(stored) => {
                stored.password_hash = hash.to_string();
                stored.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_token(&self, token: &Token) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.users.contains_key(&token.user_id) {
            return Err(Error::Validation("user does not exist".into()));
        }
        let user_id = token.user_id;
        inner.tokens.retain(|_, t| t.user_id != user_id);
        inner.next_token_id += 1;
        let id = inner.next_token_id;
        let mut stored = token.clone();
        stored.id = id;
        stored.plain_text = String::new();
        inner.tokens.insert(id, stored);
        Ok(id)
    }

    async fn get_token(&self, id: i64) -> Result<Option<Token>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tokens.get(&id).cloned())
    }

    async fn get_token_by_hash(&self, hash: &str) -> Result<Option<Token>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tokens.values().find(|t| t.hash == hash).cloned())
    }

    async fn get_tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_token(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.tokens.remove(&id);
        Ok(())
    }

    async fn delete_token_by_hash(&self, hash: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.tokens.retain(|_, t| t.hash != hash);
        Ok(())
    }
}
