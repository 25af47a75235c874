use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::state::AppState;
use crate::tokens::extractors::AuthUser;
use crate::users::dto::{ResetPasswordRequest, UpdateUserRequest};
use crate::users::repo::{NewUser, User};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(mut payload): Json<NewUser>,
) -> Result<(StatusCode, Json<User>)> {
    payload.email = payload.email.trim().to_lowercase();
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(Error::Validation("invalid email".into()));
    }

    let id = state.users.insert(&payload).await?;
    let user = state.users.get(id).await?;
    info!(user_id = id, email = %user.email, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, _caller))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.users.get_all().await?))
}

#[instrument(skip(state, _caller))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<User>> {
    Ok(Json(state.users.get(id).await?))
}

#[instrument(skip(state, _caller, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(Error::Validation("invalid email".into()));
    }

    let mut user = state.users.get(id).await?;
    user.first_name = payload.first_name;
    user.last_name = payload.last_name;
    user.email = email;
    user.active = payload.active;
    state.users.update(&user).await?;

    let user = state.users.get(id).await?;
    info!(user_id = id, "user updated");
    Ok(Json(user))
}

#[instrument(skip(state, _caller))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.users.delete(id).await?;
    info!(user_id = id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, _caller, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode> {
    if payload.password.trim().is_empty() {
        return Err(Error::Validation("password is required".into()));
    }
    state.users.reset_password(id, &payload.password).await?;
    info!(user_id = id, "password reset");
    Ok(StatusCode::NO_CONTENT)
}
