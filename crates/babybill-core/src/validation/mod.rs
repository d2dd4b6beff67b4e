//! Validation modules

pub mod registration;

pub use registration::{
    email_is_plausible, password_criteria, password_is_valid, username_issues,
    username_is_valid, PasswordCriterion, RegistrationForm,
};
