//! Local checks for the registration form
//!
//! These run on every keystroke and never touch the network. A username only
//! reaches the remote availability check once [`username_is_valid`] holds.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::{PASSWORD_MIN_LENGTH, USERNAME_MAX_LENGTH, USERNAME_MIN_LENGTH};
use crate::error::AppError;
use crate::models::Country;

const SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Individual problems with a candidate username, in display order.
///
/// An empty candidate has no issues: nothing has been typed yet.
pub fn username_issues(candidate: &str) -> Vec<&'static str> {
    let mut issues = Vec::new();
    if candidate.is_empty() {
        return issues;
    }

    let length = candidate.chars().count();
    if length < USERNAME_MIN_LENGTH {
        issues.push("At least 3 characters");
    }
    if length > USERNAME_MAX_LENGTH {
        issues.push("Maximum 20 characters");
    }
    if !candidate
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        issues.push("Only lowercase letters, numbers, and underscores");
    }
    issues
}

pub fn username_is_valid(candidate: &str) -> bool {
    !candidate.is_empty() && username_issues(candidate).is_empty()
}

/// One password rule and whether it is met
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PasswordCriterion {
    pub label: &'static str,
    pub met: bool,
}

pub fn password_criteria(password: &str) -> [PasswordCriterion; 4] {
    [
        PasswordCriterion {
            label: "At least 8 characters",
            met: password.chars().count() >= PASSWORD_MIN_LENGTH,
        },
        PasswordCriterion {
            label: "One uppercase letter",
            met: password.chars().any(|c| c.is_ascii_uppercase()),
        },
        PasswordCriterion {
            label: "One number",
            met: password.chars().any(|c| c.is_ascii_digit()),
        },
        PasswordCriterion {
            label: "One special character (!@#$%^&*)",
            met: password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)),
        },
    ]
}

pub fn password_is_valid(password: &str) -> bool {
    password_criteria(password).iter().all(|c| c.met)
}

pub fn email_is_plausible(email: &str) -> bool {
    email.trim().contains('@')
}

/// First registration step as entered by the user
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RegistrationForm {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub country: Option<Country>,
}

impl RegistrationForm {
    /// Run every local check. Username availability is checked separately.
    pub fn check(&self) -> Result<(), AppError> {
        let trimmed = RegistrationForm {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            ..self.clone()
        };
        trimmed.validate()?;

        if !email_is_plausible(&self.email) {
            return Err(AppError::InvalidInput("Enter a valid email address".to_string()));
        }

        let issues = username_issues(&self.username);
        if self.username.is_empty() || !issues.is_empty() {
            let detail = if issues.is_empty() {
                "Username is required".to_string()
            } else {
                issues.join(", ")
            };
            return Err(AppError::InvalidInput(detail));
        }

        let unmet: Vec<&str> = password_criteria(&self.password)
            .iter()
            .filter(|c| !c.met)
            .map(|c| c.label)
            .collect();
        if !unmet.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Password needs: {}",
                unmet.join(", ")
            )));
        }

        if self.confirm_password.is_empty() || self.password != self.confirm_password {
            return Err(AppError::InvalidInput("Passwords do not match".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_issues_are_individual() {
        assert!(username_issues("").is_empty());
        assert_eq!(username_issues("ab"), vec!["At least 3 characters"]);
        assert_eq!(
            username_issues("Ab"),
            vec![
                "At least 3 characters",
                "Only lowercase letters, numbers, and underscores"
            ]
        );
        assert_eq!(
            username_issues("a_very_long_username_indeed"),
            vec!["Maximum 20 characters"]
        );
        assert!(username_issues("ab_c1").is_empty());
    }

    #[test]
    fn test_username_validity() {
        assert!(!username_is_valid(""));
        assert!(!username_is_valid("ab"));
        assert!(!username_is_valid("baby-bill"));
        assert!(username_is_valid("baby_bill_2024"));
    }

    #[test]
    fn test_password_criteria() {
        assert!(password_is_valid("Receipt#2024"));
        assert!(!password_is_valid("receipt#2024"));
        assert!(!password_is_valid("Receipt2024"));
        assert!(!password_is_valid("Rc#1"));

        let unmet: Vec<&str> = password_criteria("password")
            .iter()
            .filter(|c| !c.met)
            .map(|c| c.label)
            .collect();
        assert_eq!(unmet.len(), 3);
    }

    #[test]
    fn test_email_check_is_loose() {
        assert!(email_is_plausible(" ada@example.com "));
        assert!(!email_is_plausible("ada.example.com"));
    }

    #[test]
    fn test_form_check() {
        let form = RegistrationForm {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            username: "ada_l".to_string(),
            password: "Receipt#2024".to_string(),
            confirm_password: "Receipt#2024".to_string(),
            country: Some(Country::Canada),
        };
        assert!(form.check().is_ok());

        let blank_name = RegistrationForm {
            first_name: "   ".to_string(),
            ..form.clone()
        };
        assert!(matches!(blank_name.check(), Err(AppError::InvalidInput(_))));

        let mismatch = RegistrationForm {
            confirm_password: "Receipt#2025".to_string(),
            ..form
        };
        assert!(mismatch.check().is_err());
    }
}
