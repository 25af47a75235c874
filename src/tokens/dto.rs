use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::repo::User;

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response returned after login. `token` is the one and only time the
/// plaintext leaves the service.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expiry: OffsetDateTime,
    pub user: User,
}
