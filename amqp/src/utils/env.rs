//! Validated environment variable access used when loading connection options.

use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when reading an environment variable.
#[derive(Debug, Error)]
pub enum EnvVarError {
    /// Environment variable is not set
    #[error("Environment variable '{name}' not found")]
    NotFound { name: String },

    /// Environment variable contains invalid UTF-8 characters
    #[error("Environment variable '{name}' contains invalid UTF-8 characters")]
    InvalidUtf8 { name: String },

    /// Environment variable is set but contains only whitespace or is empty
    #[error("Environment variable '{name}' is empty")]
    Empty { name: String },

    /// Environment variable is set but does not parse into the expected type
    #[error("Environment variable '{name}' has invalid value '{value}'")]
    Unparsable { name: String, value: String },
}

/// Utility functions for environment variable handling.
///
/// All methods trim whitespace and treat blank values as missing.
///
/// # Examples
///
/// ```no_run
/// use amqp::utils::env::EnvUtils;
///
/// let port: u16 = EnvUtils::get_parsed_var("AMQP_PORT")?;
/// if let Some(agent) = EnvUtils::get_optional_var("AMQP_USER_AGENT") {
///     println!("User agent: {agent}");
/// }
/// ```
pub struct EnvUtils;

impl EnvUtils {
    /// Gets an environment variable, trimmed and guaranteed non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`EnvVarError`] if the variable is unset, blank, or not UTF-8.
    pub fn get_validated_var(name: &str) -> Result<String, EnvVarError> {
        match std::env::var(name) {
            Ok(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    Err(EnvVarError::Empty {
                        name: name.to_string(),
                    })
                } else {
                    Ok(trimmed.to_string())
                }
            }
            Err(std::env::VarError::NotPresent) => Err(EnvVarError::NotFound {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(EnvVarError::InvalidUtf8 {
                name: name.to_string(),
            }),
        }
    }

    pub fn get_optional_var(name: &str) -> Option<String> {
        Self::get_validated_var(name).ok()
    }

    /// Gets an environment variable and parses it with [`FromStr`].
    pub fn get_parsed_var<T: FromStr>(name: &str) -> Result<T, EnvVarError> {
        let value = Self::get_validated_var(name)?;
        value.parse().map_err(|_| EnvVarError::Unparsable {
            name: name.to_string(),
            value,
        })
    }

    /// Like [`get_parsed_var`](Self::get_parsed_var) but a missing variable is `Ok(None)`.
    /// A present but unparsable value is still an error.
    pub fn get_optional_parsed_var<T: FromStr>(name: &str) -> Result<Option<T>, EnvVarError> {
        match Self::get_parsed_var(name) {
            Ok(value) => Ok(Some(value)),
            Err(EnvVarError::NotFound { .. }) | Err(EnvVarError::Empty { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
