use chrono::NaiveTime;
use crate::error::{AppError, Result};

/// Validates a medication name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation(
            "Medication name cannot be empty".to_string(),
        ));
    }

    if name.len() > 200 {
        return Err(AppError::Validation(
            "Medication name must be at most 200 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates an optional dose description.
pub fn validate_dose(dose: Option<&str>) -> Result<()> {
    if let Some(dose) = dose {
        if dose.len() > 100 {
            return Err(AppError::Validation(
                "Dose must be at most 100 characters".to_string(),
            ));
        }
    }
    Ok(())
}

/// Parses a reminder time in `HH:MM` form, minute resolution.
pub fn parse_schedule_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| {
        AppError::Validation("Schedule time must be in HH:MM format".to_string())
    })
}

/// Validates a timezone name. Display formatting is the front-ends' concern;
/// the server only bounds the stored value.
pub fn validate_timezone(timezone: &str) -> Result<()> {
    if timezone.is_empty() || timezone.len() > 64 {
        return Err(AppError::Validation(
            "Timezone must be between 1 and 64 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_times() {
        assert_eq!(
            parse_schedule_time("08:30").unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );
        assert!(parse_schedule_time("8:30pm").is_err());
        assert!(parse_schedule_time("25:00").is_err());
        assert!(parse_schedule_time("").is_err());
    }

    #[test]
    fn bounds_name_and_dose() {
        assert!(validate_name("Ibuprofen").is_ok());
        assert!(validate_name("  ").is_err());
        assert!(validate_name(&"x".repeat(201)).is_err());
        assert!(validate_dose(Some("200mg")).is_ok());
        assert!(validate_dose(None).is_ok());
        assert!(validate_dose(Some(&"x".repeat(101))).is_err());
    }
}
