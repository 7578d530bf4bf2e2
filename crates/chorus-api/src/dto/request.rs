//! Request DTOs with validation.

use serde::Deserialize;
use validator::Validate;

/// `POST /auth/register`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32, message = "Username must be 3-32 characters"))]
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// `POST /auth/login`. `username` may also hold an email address.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// `POST /auth/refresh-token`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// `POST /auth/logout`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LogoutRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
    /// Also revoke every other device.
    #[serde(default)]
    pub all_devices: bool,
}

/// `POST /auth/change-password`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

/// Query of `DELETE /auth/sessions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndOtherSessionsQuery {
    /// Session to keep.
    pub current: Option<String>,
}

fn validate_username(username: &str) -> Result<(), validator::ValidationError> {
    let valid = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(validator::ValidationError::new("username_charset")
            .with_message("Username may only contain letters, digits, '.', '_' and '-'".into()))
    }
}
