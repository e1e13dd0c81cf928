//! Roster Validator - Validates the ordered sub-project list
//!
//! Every dispatch run starts from the declared roster; this module checks
//! it before any sub-project is visited: the list must be non-empty, names
//! must be unique, and each name must be usable as a directory name.
//!
//! # Example
//!
//! ```
//! use release_dispatcher::validation::RosterValidator;
//!
//! let validator = RosterValidator::new();
//! let roster = vec!["common".to_string(), "core".to_string()];
//!
//! assert!(validator.validate(&roster).valid);
//! ```

use crate::core::error::DispatchError;
use crate::core::traits::{ValidationError, ValidationResult, ValidationWarning};
use regex::Regex;
use std::collections::HashSet;

/// Acceptable sub-project name shape
const NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

/// Validator for the sub-project roster
pub struct RosterValidator;

impl Default for RosterValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RosterValidator {
    /// Create a new RosterValidator
    pub fn new() -> Self {
        Self
    }

    /// Validate a roster and collect every violation
    ///
    /// # Arguments
    ///
    /// * `roster` - Sub-project names in publish order
    pub fn validate(&self, roster: &[String]) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if roster.is_empty() {
            errors.push(ValidationError {
                field: "subprojects".to_string(),
                message: "サブプロジェクトが1つも設定されていません".to_string(),
                severity: "error".to_string(),
            });
        }

        let name_regex = Regex::new(NAME_PATTERN).ok();
        let mut seen: HashSet<&str> = HashSet::new();

        for (i, name) in roster.iter().enumerate() {
            if !seen.insert(name.as_str()) {
                errors.push(ValidationError {
                    field: format!("subprojects[{}]", i),
                    message: format!("\"{}\" が重複しています", name),
                    severity: "error".to_string(),
                });
            }

            let shape_ok = name_regex
                .as_ref()
                .map(|re| re.is_match(name))
                .unwrap_or(false);
            if !shape_ok {
                errors.push(ValidationError {
                    field: format!("subprojects[{}]", i),
                    message: format!(
                        "\"{}\" は無効な名前です（英数字・ピリオド・ハイフン・アンダースコアのみ）",
                        name
                    ),
                    severity: "error".to_string(),
                });
            } else if name.chars().any(|c| c.is_ascii_uppercase()) {
                warnings.push(ValidationWarning {
                    field: format!("subprojects[{}]", i),
                    message: format!("\"{}\" の大文字はインデックス上で正規化されます", name),
                    severity: "warning".to_string(),
                });
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
            metadata: None,
        }
    }

    /// Check a roster and return the first violation as an error
    ///
    /// The dispatcher calls this at run start; an invalid roster means the
    /// run does not begin.
    pub fn ensure_valid(&self, roster: &[String]) -> Result<(), DispatchError> {
        if roster.is_empty() {
            return Err(DispatchError::RosterEmpty);
        }

        let name_regex = Regex::new(NAME_PATTERN).ok();
        let mut seen: HashSet<&str> = HashSet::new();

        for name in roster {
            if !seen.insert(name.as_str()) {
                return Err(DispatchError::DuplicateSubProject {
                    subproject: name.clone(),
                });
            }

            let shape_ok = name_regex
                .as_ref()
                .map(|re| re.is_match(name))
                .unwrap_or(false);
            if !shape_ok {
                return Err(DispatchError::InvalidSubProjectName {
                    subproject: name.clone(),
                });
            }
        }

        Ok(())
    }
}
