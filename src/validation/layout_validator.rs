//! Layout Validator - Checks that a sub-project directory is buildable
//!
//! A sub-project is buildable when its directory exists and carries a
//! Python build manifest. `setup.py` takes precedence because it selects
//! the classic build invocation; a `pyproject.toml` on its own selects a
//! PEP 517 build.
//!
//! # Example
//!
//! ```no_run
//! use release_dispatcher::core::traits::SubProjectContext;
//! use release_dispatcher::validation::LayoutValidator;
//!
//! # async fn example() {
//! let validator = LayoutValidator::new();
//! let ctx = SubProjectContext::new("common", "/repo/common");
//!
//! let result = validator.validate(&ctx).await;
//! println!("buildable: {}", result.valid);
//! # }
//! ```

use crate::core::error::DispatchError;
use crate::core::traits::{SubProjectContext, ValidationError, ValidationResult, ValidationWarning};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Python build manifest kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    SetupPy,
    Pyproject,
}

impl ManifestKind {
    /// Get the manifest file name
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestKind::SetupPy => "setup.py",
            ManifestKind::Pyproject => "pyproject.toml",
        }
    }
}

/// Detected build layout for one sub-project
#[derive(Debug, Clone)]
pub struct DetectedLayout {
    pub kind: ManifestKind,
    pub manifest_path: PathBuf,
    pub confidence: f64,
}

/// Subset of pyproject.toml we read for metadata
#[derive(Debug, Deserialize)]
struct PyprojectFile {
    project: Option<PyprojectMetadata>,
}

#[derive(Debug, Deserialize)]
struct PyprojectMetadata {
    name: Option<String>,
    version: Option<String>,
}

/// Validator for sub-project directory layout
pub struct LayoutValidator;

impl Default for LayoutValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutValidator {
    /// Create a new LayoutValidator
    pub fn new() -> Self {
        Self
    }

    /// Detect the build manifest in a sub-project directory
    ///
    /// # Arguments
    ///
    /// * `dir` - Sub-project directory
    ///
    /// # Returns
    ///
    /// The detected layout, or None when no manifest is present
    pub async fn detect(&self, dir: &Path) -> Option<DetectedLayout> {
        // setup.py first: it selects the classic build command
        let setup_path = dir.join("setup.py");
        if fs::metadata(&setup_path).await.is_ok() {
            return Some(DetectedLayout {
                kind: ManifestKind::SetupPy,
                manifest_path: setup_path,
                confidence: 1.0,
            });
        }

        let pyproject_path = dir.join("pyproject.toml");
        if fs::metadata(&pyproject_path).await.is_ok() {
            return Some(DetectedLayout {
                kind: ManifestKind::Pyproject,
                manifest_path: pyproject_path,
                confidence: 0.9,
            });
        }

        None
    }

    /// Validate a sub-project layout and collect metadata when available
    ///
    /// # Arguments
    ///
    /// * `ctx` - Sub-project to inspect
    pub async fn validate(&self, ctx: &SubProjectContext) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();
        let field = format!("subprojects.{}", ctx.name());

        if fs::metadata(ctx.dir()).await.is_err() {
            errors.push(ValidationError {
                field,
                message: format!("ディレクトリが見つかりません: {}", ctx.dir().display()),
                severity: "error".to_string(),
            });
            return ValidationResult {
                valid: false,
                errors,
                warnings,
                metadata: None,
            };
        }

        match self.detect(ctx.dir()).await {
            Some(layout) => {
                metadata.insert(
                    "manifest".to_string(),
                    serde_json::Value::String(layout.kind.as_str().to_string()),
                );
            }
            None => {
                errors.push(ValidationError {
                    field: field.clone(),
                    message: "setup.py / pyproject.toml が見つかりません".to_string(),
                    severity: "error".to_string(),
                });
            }
        }

        // Package metadata comes from pyproject.toml when one parses;
        // setup.py is executable code and is not inspected
        let pyproject_path = ctx.dir().join("pyproject.toml");
        if let Ok(content) = fs::read_to_string(&pyproject_path).await {
            match toml::from_str::<PyprojectFile>(&content) {
                Ok(parsed) => {
                    if let Some(project) = parsed.project {
                        if let Some(name) = project.name {
                            metadata
                                .insert("name".to_string(), serde_json::Value::String(name));
                        }
                        if let Some(version) = project.version {
                            metadata
                                .insert("version".to_string(), serde_json::Value::String(version));
                        }
                    } else {
                        warnings.push(ValidationWarning {
                            field: field.clone(),
                            message: "pyproject.toml に [project] テーブルがありません".to_string(),
                            severity: "warning".to_string(),
                        });
                    }
                }
                Err(e) => {
                    errors.push(ValidationError {
                        field: field.clone(),
                        message: format!("pyproject.toml の解析に失敗しました: {}", e),
                        severity: "error".to_string(),
                    });
                }
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
            metadata: if metadata.is_empty() {
                None
            } else {
                Some(metadata)
            },
        }
    }

    /// Check a sub-project is buildable, returning the layout to build with
    ///
    /// The build step calls this before running any command.
    pub async fn ensure_buildable(
        &self,
        ctx: &SubProjectContext,
    ) -> Result<DetectedLayout, DispatchError> {
        if fs::metadata(ctx.dir()).await.is_err() {
            return Err(DispatchError::DirectoryMissing {
                subproject: ctx.name().to_string(),
            });
        }

        self.detect(ctx.dir())
            .await
            .ok_or_else(|| DispatchError::ManifestMissing {
                subproject: ctx.name().to_string(),
            })
    }
}
