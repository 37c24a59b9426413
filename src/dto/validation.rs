//! Validation helpers for DTOs.

use validator::ValidationError;

/// Fewest options a poll may offer.
pub const MIN_OPTIONS: usize = 2;

/// Validates that a poll question is not blank.
pub fn validate_question(question: &str) -> Result<(), ValidationError> {
    if question.trim().is_empty() {
        let mut err = ValidationError::new("question_blank");
        err.message = Some("Question must not be empty".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a poll offers at least [`MIN_OPTIONS`] non-blank options.
///
/// ```ignore
/// validate_options(&["Red".into(), "Blue".into()]) // Ok
/// validate_options(&["Red".into()])                // Err - too few
/// validate_options(&["Red".into(), " ".into()])    // Err - blank option
/// ```
pub fn validate_options(options: &[String]) -> Result<(), ValidationError> {
    if options.len() < MIN_OPTIONS {
        let mut err = ValidationError::new("options_count");
        err.message = Some(
            format!(
                "At least {MIN_OPTIONS} options are required (got {})",
                options.len()
            )
            .into(),
        );
        return Err(err);
    }

    if let Some(index) = options.iter().position(|text| text.trim().is_empty()) {
        let mut err = ValidationError::new("option_blank");
        err.message = Some(format!("Option {} must not be empty", index + 1).into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|text| text.to_string()).collect()
    }

    #[test]
    fn test_validate_question() {
        assert!(validate_question("Color?").is_ok());
        assert!(validate_question("").is_err());
        assert!(validate_question("   ").is_err());
    }

    #[test]
    fn test_validate_options_count() {
        assert!(validate_options(&options(&["Red", "Blue"])).is_ok());
        assert!(validate_options(&options(&["Red"])).is_err());
        assert!(validate_options(&[]).is_err());
    }

    #[test]
    fn test_validate_options_blank_entry() {
        let err = validate_options(&options(&["Red", " "])).unwrap_err();
        assert_eq!(err.code, "option_blank");
    }
}
