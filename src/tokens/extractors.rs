use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::Error;
use crate::state::AppState;
use crate::users::repo::User;

/// Authenticates the bearer token on the request and yields its owner.
/// Rejection is the uniform 401; handlers never see why it failed.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = state.tokens.authenticate(&parts.headers).await?;
        Ok(AuthUser(user))
    }
}
