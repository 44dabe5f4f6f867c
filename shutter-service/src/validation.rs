//! Request validation helpers shared by the services.

use shutter_core::{EntityId, EntityKind, ShutterResult, ValidationError};

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Validate that a text field is present.
pub trait ValidateNonEmpty {
    /// # Errors
    /// `ValidationError::InvalidValue` if the value is empty or whitespace-only.
    fn validate_non_empty(&self, field_name: &str) -> ShutterResult<()>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field_name: &str) -> ShutterResult<()> {
        if self.trim().is_empty() {
            return Err(invalid(field_name, "must not be empty").into());
        }
        Ok(())
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field_name: &str) -> ShutterResult<()> {
        self.as_str().validate_non_empty(field_name)
    }
}

impl<T: ValidateNonEmpty> ValidateNonEmpty for Option<T> {
    fn validate_non_empty(&self, field_name: &str) -> ShutterResult<()> {
        match self {
            Some(value) => value.validate_non_empty(field_name),
            None => Err(invalid(field_name, "is required").into()),
        }
    }
}

pub fn validate_min_len(value: &str, field_name: &str, min: usize) -> ShutterResult<()> {
    if value.chars().count() < min {
        return Err(invalid(field_name, format!("must be at least {min} characters")).into());
    }
    Ok(())
}

pub fn validate_max_len(value: &str, field_name: &str, max: usize) -> ShutterResult<()> {
    if value.chars().count() > max {
        return Err(invalid(field_name, format!("must be at most {max} characters")).into());
    }
    Ok(())
}

/// Loose email shape check: something on both sides of a single `@`.
pub fn validate_email(value: &str, field_name: &str) -> ShutterResult<()> {
    match value.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(invalid(field_name, "must be an email address").into()),
    }
}

/// Parse a wire enum, naming the accepted values on failure.
pub fn parse_choice<T>(
    value: &str,
    field_name: &str,
    accepted: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> ShutterResult<T> {
    parse(value.trim()).ok_or_else(|| invalid(field_name, format!("must be one of {accepted}")).into())
}

/// Reject callers acting on records they do not own.
pub fn ensure_owner(
    owner_id: EntityId,
    caller_id: EntityId,
    action: &str,
    kind: EntityKind,
    id: EntityId,
) -> ShutterResult<()> {
    if owner_id != caller_id {
        return Err(ValidationError::Forbidden {
            action: action.to_string(),
            kind,
            id,
        }
        .into());
    }
    Ok(())
}
