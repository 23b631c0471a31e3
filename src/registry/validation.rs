//! Validation of user-supplied service names and environment entries.
//!
//! Service names become file names (`env/<name>.env`) and unit instance names
//! (`svcreg@<name>.service`), so they are restricted before anything is
//! written. Environment keys follow POSIX naming; the keys owned by the
//! environment record format are reserved.

use crate::error::{Error, Result};

/// Keys the environment record format owns. `PORT` is always derived from
/// the entry's port, the other two from their dedicated fields.
pub const RESERVED_ENV_KEYS: [&str; 3] = ["COMMAND", "WORKING_DIR", "PORT"];

const MAX_NAME_LEN: usize = 64;

/// Validate a service name.
///
/// Rejects:
/// - empty names and names longer than 64 characters
/// - names starting with a dot (hidden files, `..`)
/// - anything other than ASCII alphanumerics, `-`, `_` and `.`
pub fn validate_service_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is too long (max 64 characters)"));
    }
    if name.starts_with('.') {
        return Err(invalid("name cannot start with a dot"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.'))
    {
        return Err(invalid(&format!(
            "character '{}' is not allowed (use letters, digits, '-', '_' or '.')",
            c
        )));
    }
    Ok(())
}

/// Validate an environment variable name.
///
/// Must start with a letter or underscore and contain only alphanumerics and
/// underscores.
pub fn validate_env_name(name: &str) -> Result<()> {
    let Some(first) = name.chars().next() else {
        return Err(Error::InvalidEnv(
            "environment variable name cannot be empty".to_string(),
        ));
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::InvalidEnv(format!(
            "'{}' must start with a letter or underscore",
            name
        )));
    }

    if let Some((i, c)) = name
        .chars()
        .enumerate()
        .find(|(_, c)| !c.is_ascii_alphanumeric() && *c != '_')
    {
        return Err(Error::InvalidEnv(format!(
            "'{}': character '{}' at position {} is not allowed (must be alphanumeric or underscore)",
            name, c, i
        )));
    }

    Ok(())
}

/// Validate a key supplied by the user for addition or removal.
pub fn validate_user_env_key(name: &str) -> Result<()> {
    validate_env_name(name)?;
    if RESERVED_ENV_KEYS.contains(&name) {
        return Err(Error::InvalidEnv(format!(
            "'{}' is reserved (set it through the service's own field, e.g. --port)",
            name
        )));
    }
    Ok(())
}

/// Values are written one per line, so they cannot span lines.
pub fn validate_env_value(name: &str, value: &str) -> Result<()> {
    if value.contains('\n') || value.contains('\r') {
        return Err(Error::InvalidEnv(format!(
            "value of '{}' cannot contain line breaks",
            name
        )));
    }
    Ok(())
}

/// Parse a `KEY=VALUE` assignment from the command line.
pub fn parse_env_assignment(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        Error::InvalidEnv(format!("'{}' is not in KEY=VALUE format", raw))
    })?;
    validate_user_env_key(key)?;
    validate_env_value(key, value)?;
    Ok((key.to_string(), value.to_string()))
}
