//! Configuration file loader for release-dispatcher
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::core::error::DispatchError;
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".dispatch-config.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

/// Schedule time pattern (HH:MM, 24-hour clock)
const SCHEDULE_TIME_PATTERN: &str = r"^([01][0-9]|2[0-3]):[0-5][0-9]$";

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// Explicit configuration file, replacing the project-level lookup
    pub config_file: Option<PathBuf>,

    /// CLI arguments (highest priority)
    pub cli_args: Option<DispatchConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    /// Is configuration valid?
    pub valid: bool,

    /// Validation errors
    pub errors: Vec<ConfigValidationError>,

    /// Validation warnings
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "schedule.time")
    pub field: String,

    /// Error message
    pub message: String,

    /// Expected type/value
    pub expected: Option<String>,

    /// Actual type/value
    pub actual: Option<String>,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    /// Field path
    pub field: String,

    /// Warning message
    pub message: String,

    /// Suggestion
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Project config (./.dispatch-config.yaml, or an explicit file path)
    /// 4. Global config (~/.dispatch-config.yaml)
    /// 5. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<DispatchConfig, DispatchError> {
        let mut configs: Vec<DispatchConfig> = Vec::new();

        // 5. Default values (lowest priority)
        configs.push(DispatchConfig::default());

        // 4. Global config
        if let Some(global_config) = Self::load_global_config().await? {
            configs.push(global_config);
        }

        // 3. Project config (or an explicitly named file, which must exist)
        let project_config = match &options.config_file {
            Some(file_path) => match Self::load_config_file(file_path).await? {
                Some(config) => Some(config),
                None => {
                    return Err(DispatchError::ConfigError {
                        message: format!("設定ファイルが見つかりません: {}", file_path.display()),
                    });
                }
            },
            None => Self::load_project_config(&options.project_path).await?,
        };
        if let Some(project_config) = project_config {
            configs.push(project_config);
        }

        // 2. Environment variables
        if let Some(env_config) = Self::load_env_config(&options.env) {
            configs.push(env_config);
        }

        // 1. CLI arguments (highest priority)
        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        // Merge all configs
        let merged_config = Self::merge_configs(configs);

        // Expand environment variables
        let expanded_config = Self::expand_env_vars(merged_config, &options.env);

        Ok(expanded_config)
    }

    /// Load global configuration from ~/.dispatch-config.yaml
    async fn load_global_config() -> Result<Option<DispatchConfig>, DispatchError> {
        let Ok(home_dir) = env::var("HOME") else {
            return Ok(None);
        };
        let global_config_path = PathBuf::from(home_dir).join(CONFIG_FILENAME);

        Self::load_config_file(&global_config_path).await
    }

    /// Load project configuration from ./.dispatch-config.yaml
    async fn load_project_config(
        project_path: &Path,
    ) -> Result<Option<DispatchConfig>, DispatchError> {
        let project_config_path = project_path.join(CONFIG_FILENAME);

        Self::load_config_file(&project_config_path).await
    }

    /// Load configuration from YAML file
    fn load_config_file(
        file_path: &Path,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<Output = Result<Option<DispatchConfig>, DispatchError>>
                + Send
                + '_,
        >,
    > {
        Box::pin(async move {
            // Check if file exists
            if !file_path.exists() {
                return Ok(None);
            }

            let content = fs::read_to_string(file_path).await.map_err(|e| {
                DispatchError::ConfigError {
                    message: format!("設定ファイルを読み込めません: {}", e),
                }
            })?;

            let config: DispatchConfig =
                serde_yaml::from_str(&content).map_err(|e| DispatchError::ConfigError {
                    message: format!("設定ファイルの解析に失敗しました: {}", e),
                })?;

            // Handle extends if present
            if let Some(extends_path) = &config.extends {
                let base_path = file_path
                    .parent()
                    .ok_or_else(|| DispatchError::ConfigError {
                        message: "設定ファイルのパスが不正です".to_string(),
                    })?
                    .join(extends_path);

                if let Some(base_config) = Self::load_config_file(&base_path).await? {
                    return Ok(Some(Self::merge_configs(vec![base_config, config])));
                }
            }

            Ok(Some(config))
        })
    }

    /// Load configuration from environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Option<DispatchConfig> {
        let mut config = DispatchConfig::empty();
        let mut has_changes = false;

        // DISPATCH_SCHEDULE_TIME -> schedule.time
        if let Some(time) = env.get("DISPATCH_SCHEDULE_TIME") {
            config.schedule = Some(ScheduleConfig {
                time: Some(time.clone()),
            });
            has_changes = true;
        }

        // DISPATCH_REPOSITORY_URL -> index.repositoryUrl
        if let Some(url) = env.get("DISPATCH_REPOSITORY_URL") {
            config.index = Some(IndexConfig {
                repository_url: Some(url.clone()),
                verify_url: None,
            });
            has_changes = true;
        }

        // DISPATCH_DRY_RUN -> dispatch.dryRun
        if let Some(dry_run) = env.get("DISPATCH_DRY_RUN")
            && let Ok(value) = dry_run.parse::<bool>()
        {
            let options = config.dispatch.get_or_insert_with(Self::empty_options);
            options.dry_run = Some(value);
            has_changes = true;
        }

        // DISPATCH_CONTINUE_ON_ERROR -> dispatch.continueOnError
        if let Some(continue_on_error) = env.get("DISPATCH_CONTINUE_ON_ERROR")
            && let Ok(value) = continue_on_error.parse::<bool>()
        {
            let options = config.dispatch.get_or_insert_with(Self::empty_options);
            options.continue_on_error = Some(value);
            has_changes = true;
        }

        if has_changes { Some(config) } else { None }
    }

    fn empty_options() -> DispatchOptionsConfig {
        DispatchOptionsConfig {
            continue_on_error: None,
            dry_run: None,
            verify: None,
            build_timeout: None,
            upload_timeout: None,
        }
    }

    /// Merge multiple configurations with priority
    fn merge_configs(configs: Vec<DispatchConfig>) -> DispatchConfig {
        let mut result = DispatchConfig::empty();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target, field by field
    fn merge_into(target: &mut DispatchConfig, source: DispatchConfig) {
        // Version
        if !source.version.is_empty() {
            target.version = source.version;
        }

        // Extends
        if source.extends.is_some() {
            target.extends = source.extends;
        }

        // Sub-project roster replaces as a whole; order is significant
        if !source.subprojects.is_empty() {
            target.subprojects = source.subprojects;
        }

        // Project
        if let Some(source_project) = source.project {
            let target_project = target.project.get_or_insert(ProjectConfig {
                name: None,
                root: None,
            });

            if source_project.name.is_some() {
                target_project.name = source_project.name;
            }
            if source_project.root.is_some() {
                target_project.root = source_project.root;
            }
        }

        // Schedule
        if let Some(source_schedule) = source.schedule {
            let target_schedule = target.schedule.get_or_insert(ScheduleConfig { time: None });

            if source_schedule.time.is_some() {
                target_schedule.time = source_schedule.time;
            }
        }

        // Index
        if let Some(source_index) = source.index {
            let target_index = target.index.get_or_insert(IndexConfig {
                repository_url: None,
                verify_url: None,
            });

            if source_index.repository_url.is_some() {
                target_index.repository_url = source_index.repository_url;
            }
            if source_index.verify_url.is_some() {
                target_index.verify_url = source_index.verify_url;
            }
        }

        // Dispatch options
        if let Some(source_dispatch) = source.dispatch {
            let target_dispatch = target.dispatch.get_or_insert_with(Self::empty_options);

            if source_dispatch.continue_on_error.is_some() {
                target_dispatch.continue_on_error = source_dispatch.continue_on_error;
            }
            if source_dispatch.dry_run.is_some() {
                target_dispatch.dry_run = source_dispatch.dry_run;
            }
            if source_dispatch.verify.is_some() {
                target_dispatch.verify = source_dispatch.verify;
            }
            if source_dispatch.build_timeout.is_some() {
                target_dispatch.build_timeout = source_dispatch.build_timeout;
            }
            if source_dispatch.upload_timeout.is_some() {
                target_dispatch.upload_timeout = source_dispatch.upload_timeout;
            }
        }
    }

    /// Expand environment variables in configuration strings
    ///
    /// Only values matching the ${VAR_NAME} pattern are expanded. Unknown
    /// variables are left in place with a warning.
    fn expand_env_vars(mut config: DispatchConfig, env: &HashMap<String, String>) -> DispatchConfig {
        if let Some(index) = &mut config.index {
            if let Some(url) = &index.repository_url {
                index.repository_url = Some(Self::expand_string(url, env));
            }
            if let Some(url) = &index.verify_url {
                index.verify_url = Some(Self::expand_string(url, env));
            }
        }

        if let Some(project) = &mut config.project
            && let Some(root) = &project.root
        {
            project.root = Some(Self::expand_string(root, env));
        }

        config
    }

    /// Expand environment variables in a single string
    fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        let env_var_regex = match Regex::new(ENV_VAR_PATTERN) {
            Ok(re) => re,
            Err(_) => return input.to_string(),
        };

        let mut result = input.to_string();
        for cap in env_var_regex.captures_iter(input) {
            let var_name = &cap[1];

            if let Some(value) = env.get(var_name) {
                result = result.replace(&format!("${{{}}}", var_name), value);
            } else {
                eprintln!("⚠️  Environment variable {} not found", var_name);
            }
        }

        result
    }

    /// Validate configuration structure
    ///
    /// Roster invariants (non-empty, unique names) are checked separately by
    /// the roster validator; this covers the config-file shape.
    pub fn validate(config: &DispatchConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Check version (required)
        if config.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "version".to_string(),
                message: "Version is required".to_string(),
                expected: Some("string (e.g., \"1.0\")".to_string()),
                actual: Some("empty".to_string()),
            });
        } else if config.version != "1.0" {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("Unknown version: {}", config.version),
                suggestion: Some("Currently supported version is \"1.0\" only".to_string()),
            });
        }

        // 2. Validate schedule time format
        if let Some(schedule) = &config.schedule
            && let Some(time) = &schedule.time
        {
            let time_regex = Regex::new(SCHEDULE_TIME_PATTERN);
            let valid_time = time_regex.map(|re| re.is_match(time)).unwrap_or(false);
            if !valid_time {
                errors.push(ConfigValidationError {
                    field: "schedule.time".to_string(),
                    message: "Invalid time-of-day".to_string(),
                    expected: Some("\"HH:MM\" in 24-hour UTC (e.g., \"07:59\")".to_string()),
                    actual: Some(time.clone()),
                });
            }
        }

        // 3. Validate index endpoints
        if let Some(index) = &config.index {
            for (field, url) in [
                ("index.repositoryUrl", &index.repository_url),
                ("index.verifyUrl", &index.verify_url),
            ] {
                if let Some(url) = url
                    && !url.starts_with("http://")
                    && !url.starts_with("https://")
                {
                    errors.push(ConfigValidationError {
                        field: field.to_string(),
                        message: "URL must use http or https".to_string(),
                        expected: Some("http(s)://...".to_string()),
                        actual: Some(url.clone()),
                    });
                }
            }
        }

        // 4. Validate dispatch options
        if let Some(dispatch) = &config.dispatch {
            for (field, timeout) in [
                ("dispatch.buildTimeout", dispatch.build_timeout),
                ("dispatch.uploadTimeout", dispatch.upload_timeout),
            ] {
                if timeout == Some(0) {
                    errors.push(ConfigValidationError {
                        field: field.to_string(),
                        message: "Timeout must be greater than 0".to_string(),
                        expected: Some("positive integer (seconds)".to_string()),
                        actual: Some("0".to_string()),
                    });
                }
            }

            if dispatch.dry_run == Some(true) && dispatch.verify == Some(true) {
                warnings.push(ConfigValidationWarning {
                    field: "dispatch.verify".to_string(),
                    message: "verify has no effect in dry-run mode".to_string(),
                    suggestion: Some("Disable dryRun or remove verify".to_string()),
                });
            }
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
                if let (Some(expected), Some(actual)) = (&error.expected, &error.actual) {
                    lines.push(format!("    Expected: {}", expected));
                    lines.push(format!("    Actual: {}", actual));
                }
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    Suggestion: {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}
