//! Secure credential handling for package index uploads
//!
//! This module manages the username/password pair used to authenticate
//! uploads, using the `secrecy` crate to prevent accidental exposure in
//! logs or memory dumps. Values are read fresh from the environment at the
//! start of each run and never persisted.

use crate::core::error::DispatchError;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::env;

/// Environment variable holding the index username
pub const USERNAME_VAR: &str = "TWINE_USERNAME";

/// Environment variable holding the index password or API token
pub const PASSWORD_VAR: &str = "TWINE_PASSWORD";

/// Ambient credential pair for the package index
///
/// The pair is treated as opaque: it is handed to the upload tool through
/// environment variables and never inspected, logged, or written to disk.
///
/// # Examples
///
/// ```
/// use release_dispatcher::security::IndexCredentials;
///
/// let creds = IndexCredentials::new("__token__", "pypi-AgENdGVzdC1leGFtcGxl");
/// assert_eq!(IndexCredentials::mask_secret("pypi-AgENdGVzdC1leGFtcGxl"), "pyp...Gxl");
/// ```
// SecretString's Debug output is redacted
#[derive(Debug)]
pub struct IndexCredentials {
    username: SecretString,
    password: SecretString,
}

impl IndexCredentials {
    /// Creates a credential pair from explicit values
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: SecretString::new(username.into().into()),
            password: SecretString::new(password.into().into()),
        }
    }

    /// Reads the credential pair from the environment
    ///
    /// An unset or empty variable is a configuration error; the returned
    /// error names the first missing variable.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use release_dispatcher::security::IndexCredentials;
    ///
    /// let creds = IndexCredentials::from_env()?;
    /// # Ok::<(), release_dispatcher::core::DispatchError>(())
    /// ```
    pub fn from_env() -> Result<Self, DispatchError> {
        let username = Self::read_var(USERNAME_VAR)?;
        let password = Self::read_var(PASSWORD_VAR)?;

        Ok(Self {
            username: SecretString::new(username.into()),
            password: SecretString::new(password.into()),
        })
    }

    fn read_var(name: &str) -> Result<String, DispatchError> {
        match env::var(name) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(DispatchError::CredentialsMissing {
                variable: name.to_string(),
            }),
        }
    }

    /// Checks whether both credential variables are set, without retaining values
    pub fn available() -> bool {
        Self::missing_variables().is_empty()
    }

    /// Names of the credential variables that are unset or empty
    pub fn missing_variables() -> Vec<&'static str> {
        [USERNAME_VAR, PASSWORD_VAR]
            .iter()
            .filter(|name| {
                env::var(name)
                    .map(|v| v.trim().is_empty())
                    .unwrap_or(true)
            })
            .copied()
            .collect()
    }

    /// Index username
    pub fn username(&self) -> &SecretString {
        &self.username
    }

    /// Index password or API token
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Masks a secret value for safe logging
    ///
    /// Shows only the first 3 and last 3 characters for identification.
    /// Values shorter than 10 characters are fully masked as "****".
    ///
    /// # Examples
    ///
    /// ```
    /// use release_dispatcher::security::IndexCredentials;
    ///
    /// assert_eq!(IndexCredentials::mask_secret("abcdef123456"), "abc...456");
    /// assert_eq!(IndexCredentials::mask_secret("short"), "****");
    /// ```
    pub fn mask_secret(value: &str) -> String {
        let chars: Vec<char> = value.chars().collect();
        if chars.len() < 10 {
            return "****".to_string();
        }

        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 3..].iter().collect();
        format!("{}...{}", prefix, suffix)
    }

    /// Masks any occurrence of the credential values in a string
    ///
    /// Tool output occasionally echoes arguments or URLs; this scrubs both
    /// credential values before anything is printed or recorded.
    pub fn mask_in_string(&self, text: &str) -> String {
        let mut masked = text.to_string();

        for secret in [&self.username, &self.password] {
            let value = secret.expose_secret();
            if value.is_empty() {
                continue;
            }
            if let Ok(regex) = Regex::new(&regex::escape(value)) {
                let replacement = Self::mask_secret(value);
                masked = regex.replace_all(&masked, replacement.as_str()).to_string();
            }
        }

        masked
    }
}
