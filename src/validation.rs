//! Input validation module
//!
//! Validates externally supplied readings, settings patches and query
//! parameters before they reach the session.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use validator::{Validate, ValidationErrors};

use crate::error::{AppError, AppResult};
use crate::models::{CgmSettings, ReadingInput, SettingsUpdate};

/// Longest query window accepted (90 days)
pub const MAX_WINDOW_HOURS: u32 = 24 * 90;

fn describe(validation_errors: &ValidationErrors) -> String {
    let error_messages: Vec<String> = validation_errors
        .field_errors()
        .iter()
        .map(|(field, errors)| {
            let msgs: Vec<String> = errors
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => e.code.to_string(),
                })
                .collect();
            format!("{}: {}", field, msgs.join(", "))
        })
        .collect();
    error_messages.join("; ")
}

/// Validate a reading pushed by a sensor feed against the newest stored timestamp
pub fn validate_reading_input(
    input: &ReadingInput,
    newest: Option<DateTime<Utc>>,
) -> AppResult<()> {
    if let Err(validation_errors) = input.validate() {
        let message = describe(&validation_errors);
        warn!(errors = %message, "Reading input validation failed");
        return Err(AppError::ValidationError(message));
    }

    if let (Some(timestamp), Some(newest)) = (input.timestamp, newest) {
        if timestamp < newest {
            return Err(AppError::ValidationError(format!(
                "Reading timestamp {} precedes newest reading at {}",
                timestamp.to_rfc3339(),
                newest.to_rfc3339()
            )));
        }
    }

    debug!("Reading input validation passed");
    Ok(())
}

/// Validate field ranges of a settings patch
pub fn validate_settings_update(update: &SettingsUpdate) -> AppResult<()> {
    update
        .validate()
        .map_err(|errors| AppError::ValidationError(describe(&errors)))
}

/// Validate threshold ordering of a complete settings record
pub fn validate_settings(settings: &CgmSettings) -> AppResult<()> {
    if settings.urgent_low_threshold >= settings.low_threshold {
        return Err(AppError::ValidationError(format!(
            "urgent_low_threshold ({}) must be below low_threshold ({})",
            settings.urgent_low_threshold, settings.low_threshold
        )));
    }

    if settings.low_threshold >= settings.high_threshold {
        return Err(AppError::ValidationError(format!(
            "low_threshold ({}) must be below high_threshold ({})",
            settings.low_threshold, settings.high_threshold
        )));
    }

    if settings.target_range_min >= settings.target_range_max {
        return Err(AppError::ValidationError(format!(
            "target_range_min ({}) must be below target_range_max ({})",
            settings.target_range_min, settings.target_range_max
        )));
    }

    Ok(())
}

/// Validate a metrics/history window in hours
pub fn validate_window_hours(hours: Option<u32>, default: u32) -> AppResult<u32> {
    let hours = hours.unwrap_or(default);

    if hours == 0 || hours > MAX_WINDOW_HOURS {
        return Err(AppError::ValidationError(format!(
            "Window must be between 1 and {} hours",
            MAX_WINDOW_HOURS
        )));
    }

    Ok(hours)
}

/// Validate pagination parameters
pub fn validate_pagination(page: Option<u32>, limit: Option<u32>) -> AppResult<(u32, u32)> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(288);

    if page == 0 {
        return Err(AppError::ValidationError(
            "Page number must be greater than 0".to_string(),
        ));
    }

    if limit == 0 || limit > 2880 {
        return Err(AppError::ValidationError(
            "Limit must be between 1 and 2880".to_string(),
        ));
    }

    Ok((page, limit))
}
