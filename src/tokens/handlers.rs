use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use time::Duration;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::state::AppState;
use crate::tokens::dto::{LoginRequest, LoginResponse};
use crate::tokens::extractors::AuthUser;
use crate::tokens::repo::parse_bearer;
use crate::users::repo::User;

/// Every login failure collapses to the same 401; the response never says
/// whether the email exists.
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    payload.email = payload.email.trim().to_lowercase();

    let user = match state.users.get_by_email(&payload.email).await {
        Ok(u) => u,
        Err(Error::NotFound) => {
            warn!(email = %payload.email, "login unknown email");
            return Err(Error::Unauthenticated);
        }
        Err(e) => return Err(e),
    };

    if user.active != 1 {
        warn!(user_id = user.id, "login inactive user");
        return Err(Error::Unauthenticated);
    }

    if !state.users.password_matches(&user, &payload.password)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(Error::Unauthenticated);
    }

    let ttl = Duration::hours(state.config.token_ttl_hours);
    let token = state.tokens.generate_token(user.id, ttl);
    state.tokens.insert(&token, &user).await?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(LoginResponse {
        token: token.plain_text,
        expiry: token.expiry,
        user,
    }))
}

/// Revokes the presented token. Deleting an already-deleted token is still
/// a 200; only a missing or malformed header is rejected.
#[instrument(skip(state, headers))]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    let value = parse_bearer(&headers)?;
    state.tokens.delete_by_token(value).await?;
    info!("user logged out");
    Ok(StatusCode::OK)
}

#[instrument(skip(user))]
pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
