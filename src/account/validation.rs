//! Store-side validation rules and their messages.

use validator::ValidateEmail;

use crate::account::User;
use crate::config::PasswordPolicy;

const ALLOWED_USER_NAME_CHARACTERS: &str = "-._@+";

pub fn duplicate_user_name(user_name: &str) -> String {
    format!("Username '{user_name}' is already taken.")
}

pub fn duplicate_role_name(name: &str) -> String {
    format!("Role name '{name}' is already taken.")
}

pub fn unknown_role(name: &str) -> String {
    format!("Role {name} does not exist.")
}

pub fn unknown_user(id: &str) -> String {
    format!("User '{id}' does not exist.")
}

pub fn already_in_role(name: &str) -> String {
    format!("User already in role '{name}'.")
}

pub fn not_in_role(name: &str) -> String {
    format!("User is not in role '{name}'.")
}

pub const PASSWORD_MISMATCH: &str = "Incorrect password.";
pub const INVALID_TOKEN: &str = "Invalid token.";

/// Check login name and email of `user`.
pub fn validate_user(user: &User) -> Vec<String> {
    let mut errors = Vec::new();

    let valid_name = !user.user_name.trim().is_empty()
        && user.user_name.chars().all(|c| {
            c.is_ascii_alphanumeric() || ALLOWED_USER_NAME_CHARACTERS.contains(c)
        });
    if !valid_name {
        errors.push(format!(
            "Username '{}' is invalid, can only contain letters or digits.",
            user.user_name
        ));
    }

    if !user.email.validate_email() {
        errors.push(format!("Email '{}' is invalid.", user.email));
    }

    errors
}

/// Check `password` against `policy`.
pub fn validate_password(policy: &PasswordPolicy, password: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if password.chars().count() < policy.required_length {
        errors.push(format!(
            "Passwords must be at least {} characters.",
            policy.required_length
        ));
    }
    if policy.require_non_alphanumeric
        && password.chars().all(|c| c.is_alphanumeric())
    {
        errors.push(
            "Passwords must have at least one non alphanumeric character."
                .into(),
        );
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Passwords must have at least one digit ('0'-'9').".into());
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        errors
            .push("Passwords must have at least one lowercase ('a'-'z').".into());
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        errors
            .push("Passwords must have at least one uppercase ('A'-'Z').".into());
    }

    errors
}

/// Check a role name.
pub fn validate_role_name(name: &str) -> Vec<String> {
    if name.trim().is_empty() {
        vec![format!("Role name '{name}' is invalid.")]
    } else {
        Vec::new()
    }
}
