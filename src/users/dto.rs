use serde::Deserialize;

/// Request body for a profile update. Password is absent on purpose;
/// password changes go through the reset endpoint.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub active: i32,
}

/// Request body for a password reset.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}
