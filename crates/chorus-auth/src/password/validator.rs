//! Strength policy for new passwords.

use chorus_core::config::auth::AuthConfig;
use chorus_core::error::AppError;

#[derive(Debug, Clone)]
pub struct PasswordValidator {
    min_length: usize,
    min_score: u8,
}

impl PasswordValidator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            min_length: config.password_min_length,
            min_score: config.password_min_score,
        }
    }

    /// Check length and estimated strength. `user_inputs` (username, email)
    /// are penalised when they appear in the password.
    pub fn validate(&self, password: &str, user_inputs: &[&str]) -> Result<(), AppError> {
        if password.chars().count() < self.min_length {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters long",
                self.min_length
            )));
        }

        let estimate = zxcvbn::zxcvbn(password, user_inputs);
        if u8::from(estimate.score()) < self.min_score {
            let hint = estimate
                .feedback()
                .and_then(|f| f.warning())
                .map(|w| format!(": {w}"))
                .unwrap_or_default();
            return Err(AppError::validation(format!("Password is too weak{hint}")));
        }

        Ok(())
    }

    pub fn validate_not_same(&self, old_password: &str, new_password: &str) -> Result<(), AppError> {
        if old_password == new_password {
            return Err(AppError::validation(
                "New password must be different from the current password",
            ));
        }
        Ok(())
    }
}
