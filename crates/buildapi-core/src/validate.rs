//! Request validation helpers for handlers.
//!
//! Handlers call these first and return the error through `anyhow`; the
//! router reports it as a handler failure. [`validation_complete`] and
//! [`mock_result`] let a handler stop early for validate-only and mock calls.

use std::path::Path;

use serde_json::Value;

use crate::config::{CallConfig, CallType};
use crate::controller::ReturnCode;
use crate::message::Message;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: String },

    #[error("{field} references a path that does not exist: {path}")]
    PathNotFound { field: String, path: String },
}

/// Result type for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;

fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

/// Every dotted field must be set and non-empty.
pub fn require(request: &Message, fields: &[&str]) -> Result<()> {
    for field in fields {
        if !is_set(request.field(field)) {
            return Err(ValidationError::Missing {
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

/// Every element of the repeated message field `repeated` must set each of
/// `fields`.
pub fn require_each(request: &Message, repeated: &str, fields: &[&str]) -> Result<()> {
    let Some(items) = request.field(repeated).and_then(Value::as_array) else {
        return Ok(());
    };
    for (index, item) in items.iter().enumerate() {
        for field in fields {
            let value = field
                .split('.')
                .try_fold(item, |value, segment| value.get(segment));
            if !is_set(value) {
                return Err(ValidationError::Missing {
                    field: format!("{repeated}[{index}].{field}"),
                });
            }
        }
    }
    Ok(())
}

/// Each dotted path-valued field, when set, must exist on disk.
pub fn exists(request: &Message, fields: &[&str]) -> Result<()> {
    for field in fields {
        let Some(path) = request
            .field(field)
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
        else {
            continue;
        };
        if !Path::new(path).exists() {
            return Err(ValidationError::PathNotFound {
                field: field.to_string(),
                path: path.to_string(),
            });
        }
    }
    Ok(())
}

/// `true` when the call only asked for validation.
pub fn validation_complete(config: &CallConfig) -> bool {
    config.validate_only()
}

/// Return code a mock call type asks for, `None` for real calls.
pub fn mock_result(config: &CallConfig) -> Option<i32> {
    match config.call_type {
        CallType::MockSuccess => Some(ReturnCode::SUCCESS),
        CallType::MockFailure => Some(ReturnCode::UNSUCCESSFUL_RESPONSE_AVAILABLE),
        CallType::MockInvalid => Some(ReturnCode::INVALID_INPUT),
        CallType::Execute | CallType::ValidateOnly => None,
    }
}
