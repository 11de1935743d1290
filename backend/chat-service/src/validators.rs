use once_cell::sync::Lazy;
use regex::Regex;

/// Input validation for sign-up, sign-in and password changes.

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,4})+$")
        .expect("hardcoded email regex is invalid - fix source code")
});

const PASSWORD_SPECIALS: &str = "@$!%*#?&";

pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Validate password composition
/// - Minimum 6 characters
/// - At least one ASCII letter
/// - At least one digit
/// - At least one of `@$!%*#?&`
/// - Nothing outside letters, digits and those specials
pub fn validate_password(password: &str) -> bool {
    if password.chars().count() < 6 {
        return false;
    }

    let allowed = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c));
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    allowed && has_letter && has_digit && has_special
}
