// ABOUTME: Environment variable parsing utilities
// ABOUTME: Typed lookups with defaults and validation for preview configuration

use std::str::FromStr;

/// Parse an environment variable with validation
/// Returns the parsed value if it passes validation, otherwise returns the default
/// Logs warnings when environment variables are set but fail validation or parsing
pub fn parse_env_or_default_with_validation<T, F>(var_name: &str, default: T, validator: F) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(T) -> bool,
{
    match std::env::var(var_name) {
        Ok(raw_value) => match raw_value.parse::<T>() {
            Ok(parsed_value) if validator(parsed_value) => parsed_value,
            Ok(_) => {
                tracing::warn!(
                    "Environment variable {} has invalid value '{}', using default: {}",
                    var_name,
                    raw_value,
                    default
                );
                default
            }
            Err(_) => {
                tracing::warn!(
                    "Environment variable {} has unparseable value '{}', using default: {}",
                    var_name,
                    raw_value,
                    default
                );
                default
            }
        },
        // Variable not set - no warning needed, this is expected behavior
        Err(_) => default,
    }
}

/// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no`.
pub fn parse_bool_or_default(var_name: &str, default: bool) -> bool {
    match std::env::var(var_name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                tracing::warn!(
                    "Environment variable {} has invalid boolean '{}', using default: {}",
                    var_name,
                    raw,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a command line from the environment, split with shell quoting rules.
///
/// Returns `None` when the variable is unset or blank, or when its quotes
/// are unbalanced.
pub fn parse_command(var_name: &str) -> Option<Vec<String>> {
    let raw = std::env::var(var_name).ok()?;
    match shlex::split(&raw) {
        Some(parts) if parts.is_empty() => None,
        Some(parts) => Some(parts),
        None => {
            tracing::warn!(
                "Environment variable {} has unbalanced quotes '{}', using default",
                var_name,
                raw
            );
            None
        }
    }
}
