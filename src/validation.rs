//! Input validation shared by the user repository and the HTTP handlers.

use crate::constants::{MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};

/// Length-only policy: 8 to 256 bytes.
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err("password must be at least 8 characters long");
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err("password must be at most 256 characters long");
    }
    Ok(())
}

/// user@domain.tld
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if !local
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'+' || b == b'-')
    {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if domain.is_empty() || !domain.contains('.') {
        return false;
    }
    if !domain
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
    {
        return false;
    }
    domain
        .split('.')
        .all(|part| !part.is_empty() && !part.starts_with('-') && !part.ends_with('-'))
}

/// Full personal name: 2 to 100 characters, letters, spaces, and `.'-`.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    let char_count = trimmed.chars().count();
    if !(2..=100).contains(&char_count) {
        return Err("name must be between 2 and 100 characters");
    }
    if !trimmed
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '.' || c == '\'' || c == '-')
    {
        return Err("name may only contain letters, spaces, and . ' -");
    }
    Ok(())
}

/// SIAPE registration numbers are positive.
pub fn validate_siape(siape: u32) -> Result<(), &'static str> {
    if siape == 0 {
        return Err("siape must be a positive number");
    }
    Ok(())
}
