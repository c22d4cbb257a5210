use crate::error::{AppError, Result};

/// Longest status string an operator may assign.
pub const MAX_STATUS_LEN: usize = 32;

/// Validates a license key taken from a request body.
///
/// # Arguments
///
/// * `key` - The key as sent by the client, if any.
///
/// # Returns
///
/// The key, or a validation error if it is absent or empty. Any other
/// string is passed on to the store lookup as is; request size is bounded
/// by the router's body limit.
pub fn validate_license_key(key: Option<&str>) -> Result<&str> {
    match key {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(AppError::Validation(
            "License key is required.".to_string(),
        )),
    }
}

/// Validates a status string supplied by an operator.
///
/// # Arguments
///
/// * `status` - The status to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the status is acceptable.
pub fn validate_status(status: &str) -> Result<()> {
    if status.is_empty() || status.len() > MAX_STATUS_LEN {
        return Err(AppError::Validation(format!(
            "Status must be between 1 and {} characters",
            MAX_STATUS_LEN
        )));
    }

    if !status.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation(
            "Status can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}
