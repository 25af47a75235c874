use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::Result;
use crate::tokens::repo::Token;
use crate::users::repo::User;

pub mod memory;
pub mod postgres;

/// Abstract row-store over the `users` and `tokens` collections: point
/// lookups, secondary predicates (email, token hash, user id) and
/// single-row atomic writes. Presence policy belongs to the components,
/// so point lookups return `Option`; uniqueness (`Conflict`) and
/// referential integrity (`Validation`) live here, since only the backend
/// can enforce them.
#[async_trait]
pub trait Store: Send + Sync {
    /// Stores a user with its hash and timestamps already set; returns the
    /// assigned id. Duplicate email is `Conflict`.
    async fn insert_user(&self, user: &User) -> Result<i64>;

    async fn get_user(&self, id: i64) -> Result<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// All users ordered by last name.
    async fn get_all_users(&self) -> Result<Vec<User>>;

    /// Updates identity fields and `updated_at`, leaving `password_hash`
    /// untouched. Returns false when no row matched.
    async fn update_user(&self, user: &User) -> Result<bool>;

    /// Removes the user and cascades to its tokens. Absent id is a no-op.
    async fn delete_user(&self, id: i64) -> Result<()>;

    /// Returns false when no row matched.
    async fn set_password_hash(
        &self,
        id: i64,
        hash: &str,
        updated_at: OffsetDateTime,
    ) -> Result<bool>;

    /// Deletes any existing tokens for `token.user_id` and inserts the new
    /// row as one unit of work, so a concurrent reader never sees two live
    /// tokens for one user. An unknown owner is `Validation`.
    async fn replace_token(&self, token: &Token) -> Result<i64>;

    async fn get_token(&self, id: i64) -> Result<Option<Token>>;

    async fn get_token_by_hash(&self, hash: &str) -> Result<Option<Token>>;

    async fn get_tokens_for_user(&self, user_id: i64) -> Result<Vec<Token>>;

    /// Absent id is a no-op.
    async fn delete_token(&self, id: i64) -> Result<()>;

    /// Absent hash is a no-op.
    async fn delete_token_by_hash(&self, hash: &str) -> Result<()>;
}
