//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_ROOM_CODE_LENGTH: usize = 16;

/// Validates that a room code is 1 to 16 uppercase ASCII letters.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("ABCD") // Ok
/// validate_room_code("abcd") // Err - lowercase
/// validate_room_code("")     // Err - empty
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || code.len() > MAX_ROOM_CODE_LENGTH {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be 1 to {MAX_ROOM_CODE_LENGTH} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_uppercase()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only uppercase letters".into());
        return Err(err);
    }

    Ok(())
}
