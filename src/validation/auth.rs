use crate::error::{AppError, Result};

/// Validates a Discord account ID (a numeric snowflake).
pub fn validate_discord_id(discord_id: &str) -> Result<()> {
    if discord_id.len() < 17 || discord_id.len() > 20 {
        return Err(AppError::Validation(
            "Discord ID must be between 17 and 20 digits".to_string(),
        ));
    }

    if !discord_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "Discord ID must contain only digits".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_snowflakes_and_rejects_junk() {
        assert!(validate_discord_id("123456789012345678").is_ok());
        assert!(validate_discord_id("12345").is_err());
        assert!(validate_discord_id("12345678901234567a").is_err());
        assert!(validate_discord_id("").is_err());
    }
}
