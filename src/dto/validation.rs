//! Validation helpers for DTOs.

use validator::ValidationError;

/// Shortest answer window accepted for a question.
pub const MIN_TIME_LIMIT_MS: u64 = 1_000;
/// Longest answer window accepted for a question.
pub const MAX_TIME_LIMIT_MS: u64 = 10 * 60_000;

/// Validates that `correct_option` indexes into an option list of `option_count` entries.
pub fn validate_correct_option(
    correct_option: usize,
    option_count: usize,
) -> Result<(), ValidationError> {
    if correct_option >= option_count {
        let mut err = ValidationError::new("correct_option_range");
        err.message = Some(
            format!("correct option {correct_option} is out of range for {option_count} option(s)")
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Validates that no option is blank.
pub fn validate_options(options: &[String]) -> Result<(), ValidationError> {
    if options.iter().any(|option| option.trim().is_empty()) {
        let mut err = ValidationError::new("option_blank");
        err.message = Some("answer options must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a question time limit in milliseconds.
pub fn validate_time_limit(time_limit_ms: u64) -> Result<(), ValidationError> {
    if !(MIN_TIME_LIMIT_MS..=MAX_TIME_LIMIT_MS).contains(&time_limit_ms) {
        let mut err = ValidationError::new("time_limit_range");
        err.message = Some(
            format!(
                "time limit must be between {MIN_TIME_LIMIT_MS} and {MAX_TIME_LIMIT_MS} ms (got {time_limit_ms})"
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}
