//! Configuration structures and types for release-dispatcher
//!
//! This module provides type-safe configuration management with serde support.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default upload endpoint of the package index
pub const DEFAULT_REPOSITORY_URL: &str = "https://upload.pypi.org/legacy/";

/// Default verification endpoint (JSON API base)
pub const DEFAULT_VERIFY_URL: &str = "https://pypi.org/pypi";

/// Default daily trigger time (UTC)
pub const DEFAULT_SCHEDULE_TIME: &str = "07:59";

/// Default per-sub-project build timeout in seconds
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 1800;

/// Default per-sub-project upload timeout in seconds
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Schema version (required)
    pub version: String,

    /// Extend from base configuration file (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Ordered sub-project roster (required); order determines publish sequence
    pub subprojects: Vec<String>,

    /// Project basic information (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectConfig>,

    /// Daily schedule settings (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleConfig>,

    /// Package index endpoints (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexConfig>,

    /// Dispatch run options (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchOptionsConfig>,
}

/// Project basic information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Display name (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Monorepo root the sub-project directories are resolved against
    /// (default: "." relative to the config file)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

/// Daily schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Trigger time-of-day as "HH:MM" in UTC (default: "07:59")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Package index configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    /// Upload endpoint (default: PyPI legacy upload API)
    #[serde(skip_serializing_if = "Option::is_none", rename = "repositoryUrl")]
    pub repository_url: Option<String>,

    /// Verification endpoint, JSON API base (default: PyPI JSON API)
    #[serde(skip_serializing_if = "Option::is_none", rename = "verifyUrl")]
    pub verify_url: Option<String>,
}

/// Dispatch run options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchOptionsConfig {
    /// Keep dispatching remaining sub-projects after a failure (default: true)
    #[serde(skip_serializing_if = "Option::is_none", rename = "continueOnError")]
    pub continue_on_error: Option<bool>,

    /// Build without uploading (default: false)
    #[serde(skip_serializing_if = "Option::is_none", rename = "dryRun")]
    pub dry_run: Option<bool>,

    /// Query the index after each upload (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,

    /// Build timeout per sub-project in seconds (default: 1800)
    #[serde(skip_serializing_if = "Option::is_none", rename = "buildTimeout")]
    pub build_timeout: Option<u64>,

    /// Upload timeout per sub-project in seconds (default: 600)
    #[serde(skip_serializing_if = "Option::is_none", rename = "uploadTimeout")]
    pub upload_timeout: Option<u64>,
}

impl DispatchConfig {
    /// A configuration with nothing set
    ///
    /// Overlay layers (environment, CLI) start from this so that merging
    /// only carries the fields they actually set.
    pub fn empty() -> Self {
        Self {
            version: String::new(),
            extends: None,
            subprojects: vec![],
            project: None,
            schedule: None,
            index: None,
            dispatch: None,
        }
    }

    /// Resolved monorepo root (default ".")
    pub fn project_root(&self) -> &str {
        self.project
            .as_ref()
            .and_then(|p| p.root.as_deref())
            .unwrap_or(".")
    }

    /// Resolved schedule time-of-day string
    pub fn schedule_time(&self) -> &str {
        self.schedule
            .as_ref()
            .and_then(|s| s.time.as_deref())
            .unwrap_or(DEFAULT_SCHEDULE_TIME)
    }

    /// Resolved upload endpoint
    pub fn repository_url(&self) -> &str {
        self.index
            .as_ref()
            .and_then(|i| i.repository_url.as_deref())
            .unwrap_or(DEFAULT_REPOSITORY_URL)
    }

    /// Resolved verification endpoint
    pub fn verify_url(&self) -> &str {
        self.index
            .as_ref()
            .and_then(|i| i.verify_url.as_deref())
            .unwrap_or(DEFAULT_VERIFY_URL)
    }

    /// Resolved continue-on-error policy
    pub fn continue_on_error(&self) -> bool {
        self.dispatch
            .as_ref()
            .and_then(|d| d.continue_on_error)
            .unwrap_or(true)
    }

    /// Resolved dry-run flag
    pub fn dry_run(&self) -> bool {
        self.dispatch
            .as_ref()
            .and_then(|d| d.dry_run)
            .unwrap_or(false)
    }

    /// Resolved post-upload verification flag
    pub fn verify(&self) -> bool {
        self.dispatch
            .as_ref()
            .and_then(|d| d.verify)
            .unwrap_or(false)
    }

    /// Resolved build timeout
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(
            self.dispatch
                .as_ref()
                .and_then(|d| d.build_timeout)
                .unwrap_or(DEFAULT_BUILD_TIMEOUT_SECS),
        )
    }

    /// Resolved upload timeout
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(
            self.dispatch
                .as_ref()
                .and_then(|d| d.upload_timeout)
                .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
        )
    }
}

/// Default configuration values
impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            extends: None,
            subprojects: vec![],
            project: None,
            schedule: Some(ScheduleConfig {
                time: Some(DEFAULT_SCHEDULE_TIME.to_string()),
            }),
            index: Some(IndexConfig::default()),
            dispatch: Some(DispatchOptionsConfig::default()),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            repository_url: Some(DEFAULT_REPOSITORY_URL.to_string()),
            verify_url: Some(DEFAULT_VERIFY_URL.to_string()),
        }
    }
}

impl Default for DispatchOptionsConfig {
    fn default() -> Self {
        Self {
            continue_on_error: Some(true),
            dry_run: Some(false),
            verify: Some(false),
            build_timeout: Some(DEFAULT_BUILD_TIMEOUT_SECS),
            upload_timeout: Some(DEFAULT_UPLOAD_TIMEOUT_SECS),
        }
    }
}
