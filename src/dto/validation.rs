//! Validation helpers for client payloads.

use validator::ValidationError;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 32;
/// Longest accepted direct message, in characters.
pub const MAX_MESSAGE_LEN: usize = 500;

/// Usernames are 1 to 32 ASCII letters, digits, `_` or `-`.
///
/// ```ignore
/// validate_username("ada_99") // Ok
/// validate_username("")       // Err - empty
/// validate_username("a b")    // Err - space
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!(
                "Username must be 1 to {MAX_USERNAME_LEN} characters (got {})",
                username.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        let mut err = ValidationError::new("username_format");
        err.message = Some("Username may only contain letters, digits, `_` and `-`".into());
        return Err(err);
    }

    Ok(())
}

/// Paddle directions are -1 (up), 0 (stop) or 1 (down).
pub fn validate_direction(direction: i8) -> Result<(), ValidationError> {
    if (-1..=1).contains(&direction) {
        return Ok(());
    }
    let mut err = ValidationError::new("direction_range");
    err.message = Some(format!("Direction must be -1, 0 or 1 (got {direction})").into());
    Err(err)
}

pub fn validate_timestamp(timestamp: f64) -> Result<(), ValidationError> {
    if timestamp.is_finite() {
        return Ok(());
    }
    let mut err = ValidationError::new("timestamp_format");
    err.message = Some("Timestamp must be a finite number".into());
    Err(err)
}

/// Direct messages must carry visible text and stay under [`MAX_MESSAGE_LEN`] characters.
pub fn validate_message_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        let mut err = ValidationError::new("content_empty");
        err.message = Some("Message must not be blank".into());
        return Err(err);
    }
    let len = content.chars().count();
    if len > MAX_MESSAGE_LEN {
        let mut err = ValidationError::new("content_length");
        err.message =
            Some(format!("Message must be at most {MAX_MESSAGE_LEN} characters (got {len})").into());
        return Err(err);
    }
    Ok(())
}

/// Escape text for safe embedding in HTML.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}
