//! Core traits and types for release dispatching
//!
//! This module defines the fundamental abstractions for the build/upload
//! step seam, sub-project contexts, validation and verification results.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Sub-project Context
// ============================================================================

/// Scoped working context for one sub-project during a dispatch run
///
/// A fresh context is created for each sub-project and passed into the
/// build/upload calls. The process working directory is never mutated, so
/// there is nothing to restore between iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubProjectContext {
    name: String,
    dir: PathBuf,
}

impl SubProjectContext {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    /// Sub-project name as declared in the roster
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory the sub-project's build runs against
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validation error with field information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    #[serde(default = "default_error_severity")]
    pub severity: String, // Always "error"
}

fn default_error_severity() -> String {
    "error".to_string()
}

/// Validation warning with field information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    #[serde(default = "default_warning_severity")]
    pub severity: String, // Always "warning"
}

fn default_warning_severity() -> String {
    "warning".to_string()
}

/// Result of roster or layout validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

// ============================================================================
// Build Artifacts
// ============================================================================

/// Package identity parsed from a distribution file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    /// Parse a package identity from a distribution file name
    ///
    /// Supports sdist names (`{name}-{version}.tar.gz`, `{name}-{version}.zip`)
    /// and wheel names (`{name}-{version}-{tags}.whl`). The version segment
    /// starts with a digit and contains no hyphen, which disambiguates it
    /// from hyphenated package names.
    ///
    /// # Examples
    ///
    /// ```
    /// # use release_dispatcher::core::PackageId;
    /// let id = PackageId::from_artifact_name("autogluon.common-1.2.0.tar.gz");
    /// assert_eq!(id.unwrap().version, "1.2.0");
    /// ```
    pub fn from_artifact_name(file_name: &str) -> Option<Self> {
        if file_name.ends_with(".whl") {
            let re = Regex::new(r"^([^-]+)-([0-9][^-]*)-").ok()?;
            let caps = re.captures(file_name)?;
            return Some(Self {
                name: caps[1].to_string(),
                version: caps[2].to_string(),
            });
        }

        if file_name.ends_with(".tar.gz") || file_name.ends_with(".zip") {
            let re = Regex::new(r"^(.+)-([0-9][^-]*)\.(?:tar\.gz|zip)$").ok()?;
            let caps = re.captures(file_name)?;
            return Some(Self {
                name: caps[1].to_string(),
                version: caps[2].to_string(),
            });
        }

        None
    }
}

/// Output of a successful build step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildArtifacts {
    /// Directory the distribution files were written to
    pub dist_dir: PathBuf,
    /// Collected distribution files, in directory order
    pub files: Vec<PathBuf>,
    /// Identity parsed from the sdist file name, when one was produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageId>,
}

impl BuildArtifacts {
    /// Number of collected distribution files
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

// ============================================================================
// Upload
// ============================================================================

/// Result of a successful upload step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Number of files transmitted to the index
    pub uploaded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_url: Option<String>,
}

// ============================================================================
// Verification
// ============================================================================

/// Result of post-upload index verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Release Steps Trait
// ============================================================================

/// Main trait for the per-sub-project build and upload steps
///
/// The dispatcher drives implementations of this trait strictly in roster
/// order: build then upload for one sub-project before the next one starts.
/// Every call receives the scoped context instead of relying on the process
/// working directory.
#[async_trait]
pub trait ReleaseSteps: Send + Sync {
    /// Implementation name (e.g., "python")
    fn name(&self) -> &str;

    /// Build the sub-project's distributable artifacts (sdist + wheel)
    ///
    /// # Arguments
    ///
    /// * `ctx` - Scoped context of the sub-project being built
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use release_dispatcher::core::{ReleaseSteps, SubProjectContext, BuildArtifacts, UploadReceipt};
    /// # use async_trait::async_trait;
    /// # struct MySteps;
    /// # #[async_trait]
    /// # impl ReleaseSteps for MySteps {
    /// #   fn name(&self) -> &str { "my-steps" }
    /// async fn build(&self, ctx: &SubProjectContext) -> anyhow::Result<BuildArtifacts> {
    ///     Ok(BuildArtifacts {
    ///         dist_dir: ctx.dir().join("dist"),
    ///         files: vec![],
    ///         package: None,
    ///     })
    /// }
    /// #   async fn upload(&self, _: &SubProjectContext, _: &BuildArtifacts) -> anyhow::Result<UploadReceipt> { unimplemented!() }
    /// # }
    /// ```
    async fn build(&self, ctx: &SubProjectContext) -> anyhow::Result<BuildArtifacts>;

    /// Upload previously built artifacts to the package index
    ///
    /// Authentication uses the ambient credential pair; implementations must
    /// never echo credential values into output or logs.
    async fn upload(
        &self,
        ctx: &SubProjectContext,
        artifacts: &BuildArtifacts,
    ) -> anyhow::Result<UploadReceipt>;

    /// Verify that the uploaded package is visible on the index
    ///
    /// Default implementation reports verification as unsupported.
    async fn verify(&self, artifacts: &BuildArtifacts) -> anyhow::Result<VerificationResult> {
        let _ = artifacts;
        Ok(VerificationResult {
            verified: false,
            version: None,
            url: None,
            error: Some(format!("{} does not support verification", self.name())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subproject_context_accessors() {
        let ctx = SubProjectContext::new("common", "/repo/common");

        assert_eq!(ctx.name(), "common");
        assert_eq!(ctx.dir(), Path::new("/repo/common"));
    }

    #[test]
    fn test_package_id_from_sdist_name() {
        let id = PackageId::from_artifact_name("autogluon.common-1.2.0.tar.gz");

        let id = id.unwrap();
        assert_eq!(id.name, "autogluon.common");
        assert_eq!(id.version, "1.2.0");
    }

    #[test]
    fn test_package_id_from_sdist_with_hyphenated_name() {
        let id = PackageId::from_artifact_name("my-pkg-2-0.9.1b20250101.tar.gz");

        let id = id.unwrap();
        assert_eq!(id.name, "my-pkg-2");
        assert_eq!(id.version, "0.9.1b20250101");
    }

    #[test]
    fn test_package_id_from_wheel_name() {
        let id = PackageId::from_artifact_name("autogluon_tabular-1.2.0-py3-none-any.whl");

        let id = id.unwrap();
        assert_eq!(id.name, "autogluon_tabular");
        assert_eq!(id.version, "1.2.0");
    }

    #[test]
    fn test_package_id_from_zip_sdist() {
        let id = PackageId::from_artifact_name("legacy-0.1.0.zip");

        let id = id.unwrap();
        assert_eq!(id.name, "legacy");
        assert_eq!(id.version, "0.1.0");
    }

    #[test]
    fn test_package_id_rejects_unknown_extension() {
        assert!(PackageId::from_artifact_name("notes.txt").is_none());
        assert!(PackageId::from_artifact_name("no-version.tar.gz").is_none());
    }

    #[test]
    fn test_validation_error_creation() {
        let error = ValidationError {
            field: "subprojects".to_string(),
            message: "サブプロジェクト名が重複しています".to_string(),
            severity: "error".to_string(),
        };

        assert_eq!(error.field, "subprojects");
        assert_eq!(error.severity, "error");
    }

    #[test]
    fn test_validation_result_with_errors() {
        let result = ValidationResult {
            valid: false,
            errors: vec![ValidationError {
                field: "subprojects".to_string(),
                message: "空のリストは無効です".to_string(),
                severity: "error".to_string(),
            }],
            warnings: vec![],
            metadata: None,
        };

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "subprojects");
    }

    #[test]
    fn test_build_artifacts_file_count() {
        let artifacts = BuildArtifacts {
            dist_dir: PathBuf::from("/repo/common/dist"),
            files: vec![
                PathBuf::from("/repo/common/dist/common-1.0.0.tar.gz"),
                PathBuf::from("/repo/common/dist/common-1.0.0-py3-none-any.whl"),
            ],
            package: Some(PackageId {
                name: "common".to_string(),
                version: "1.0.0".to_string(),
            }),
        };

        assert_eq!(artifacts.file_count(), 2);
    }

    #[test]
    fn test_upload_receipt_serialization() {
        let receipt = UploadReceipt {
            uploaded: 2,
            output: None,
            package_url: Some("https://pypi.org/project/common/1.0.0/".to_string()),
        };

        let json = serde_json::to_string(&receipt).unwrap();
        assert!(json.contains("\"uploaded\":2"));
        assert!(!json.contains("\"output\""));
    }

    #[test]
    fn test_verification_result_serialization() {
        let result = VerificationResult {
            verified: true,
            version: Some("1.0.0".to_string()),
            url: Some("https://pypi.org/pypi/common/1.0.0/json".to_string()),
            error: None,
        };

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"verified\":true"));

        let deserialized: VerificationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.version, Some("1.0.0".to_string()));
    }

    struct NoVerifySteps;

    #[async_trait]
    impl ReleaseSteps for NoVerifySteps {
        fn name(&self) -> &str {
            "no-verify"
        }

        async fn build(&self, ctx: &SubProjectContext) -> anyhow::Result<BuildArtifacts> {
            Ok(BuildArtifacts {
                dist_dir: ctx.dir().join("dist"),
                files: vec![],
                package: None,
            })
        }

        async fn upload(
            &self,
            _ctx: &SubProjectContext,
            artifacts: &BuildArtifacts,
        ) -> anyhow::Result<UploadReceipt> {
            Ok(UploadReceipt {
                uploaded: artifacts.file_count(),
                output: None,
                package_url: None,
            })
        }
    }

    #[tokio::test]
    async fn test_default_verify_reports_unsupported() {
        let steps = NoVerifySteps;
        let artifacts = BuildArtifacts {
            dist_dir: PathBuf::from("dist"),
            files: vec![],
            package: None,
        };

        let result = steps.verify(&artifacts).await.unwrap();
        assert!(!result.verified);
        assert!(result.error.unwrap().contains("no-verify"));
    }
}
