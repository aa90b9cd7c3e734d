use super::error::ApiError;

/// Maximum allowed length for rule names.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum allowed length for probe request/response payloads.
pub const MAX_PROBE_PAYLOAD_LENGTH: usize = 512;

/// Validate that a string field does not exceed `max_len` bytes.
pub fn validate_string_length(
    field_name: &str,
    value: &str,
    max_len: usize,
) -> Result<(), ApiError> {
    if value.len() > max_len {
        return Err(ApiError::BadRequest {
            code: "VALIDATION_ERROR",
            message: format!(
                "{field_name} exceeds maximum length of {max_len} characters (got {})",
                value.len()
            ),
        });
    }
    Ok(())
}
