// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Name/trunk validation for workspace creation (spec.md §4.8).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("workspace name must not be empty")]
    EmptyName,
    #[error(
        "invalid workspace name {0:?}: must match [A-Za-z0-9][A-Za-z0-9._-]{{0,62}}"
    )]
    InvalidName(String),
    #[error("trunk branch must not be empty")]
    EmptyTrunk,
    #[error("message text must not be empty")]
    EmptyMessage,
    #[error("command must not be empty")]
    EmptyCommand,
}

/// Validate a workspace name against `[A-Za-z0-9][A-Za-z0-9._-]{0,62}`.
pub fn validate_workspace_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.len() > 63 {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(ValidationError::EmptyName);
    };
    if !first.is_ascii_alphanumeric() {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-') {
            return Err(ValidationError::InvalidName(name.to_string()));
        }
    }
    Ok(())
}

pub fn validate_trunk(trunk: &str) -> Result<(), ValidationError> {
    if trunk.trim().is_empty() {
        return Err(ValidationError::EmptyTrunk);
    }
    Ok(())
}

pub fn validate_message_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    Ok(())
}

pub fn validate_command(command: &str) -> Result<(), ValidationError> {
    if command.trim().is_empty() {
        return Err(ValidationError::EmptyCommand);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        simple = { "feat" },
        with_dash = { "feat-123" },
        with_dot = { "v1.2.3" },
        with_underscore = { "my_branch" },
        single_char = { "a" },
        max_len = { "a123456789012345678901234567890123456789012345678901234567890" },
    )]
    fn accepts_valid_names(name: &str) {
        assert!(validate_workspace_name(name).is_ok());
    }

    #[parameterized(
        empty = { "" },
        leading_dot = { ".hidden" },
        leading_dash = { "-feat" },
        path_sep = { "a/b" },
        control_char = { "a\nb" },
        too_long = { "a12345678901234567890123456789012345678901234567890123456789012345" },
    )]
    fn rejects_invalid_names(name: &str) {
        assert!(validate_workspace_name(name).is_err());
    }

    #[test]
    fn etc_is_rejected() {
        // S5: workspace:create("/p","/etc", ...) must fail; leading path
        // separator is not a valid leading character.
        assert!(validate_workspace_name("/etc").is_err());
    }
}
