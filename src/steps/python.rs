//! Python Steps - setuptools build and twine upload for one sub-project
//!
//! This module implements the build/upload seam for Python packages:
//! - Manifest-driven build: `python setup.py sdist bdist_wheel` for
//!   setup.py layouts, `python -m build` for pyproject-only layouts
//! - Artifact collection from the sub-project's dist/ directory
//! - Authenticated `twine upload` with credentials injected through the
//!   child environment, retried on transient network failures
//! - Post-upload verification against the index JSON API

use crate::core::config::DispatchConfig;
use crate::core::error::DispatchError;
use crate::core::retry::RetryPolicy;
use crate::core::traits::{
    BuildArtifacts, PackageId, ReleaseSteps, SubProjectContext, UploadReceipt, VerificationResult,
};
use crate::security::command_executor::{CommandError, SafeCommandExecutor};
use crate::security::credentials::{IndexCredentials, PASSWORD_VAR, USERNAME_VAR};
use crate::validation::layout_validator::{LayoutValidator, ManifestKind};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::fs;

/// Lines of command output kept in failure messages
const OUTPUT_TAIL_LINES: usize = 20;

/// Subset of the index JSON API response read during verification
#[derive(Debug, Deserialize)]
struct ReleasePage {
    info: ReleaseInfo,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    version: String,
}

/// Build and upload steps for Python sub-projects
pub struct PythonSteps {
    layout: LayoutValidator,
    build_executor: SafeCommandExecutor,
    upload_executor: SafeCommandExecutor,
    retry: RetryPolicy,
    credentials: Option<IndexCredentials>,
    repository_url: String,
    verify_url: String,
}

impl PythonSteps {
    /// Create Python steps from resolved configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Resolved dispatch configuration
    /// * `credentials` - Index credentials; None is acceptable for dry runs
    ///   where the upload step is never reached
    pub fn new(config: &DispatchConfig, credentials: Option<IndexCredentials>) -> Self {
        Self {
            layout: LayoutValidator::new(),
            build_executor: SafeCommandExecutor::with_timeout(config.build_timeout()),
            upload_executor: SafeCommandExecutor::with_timeout(config.upload_timeout()),
            retry: RetryPolicy::default(),
            credentials,
            repository_url: config.repository_url().to_string(),
            verify_url: config.verify_url().to_string(),
        }
    }

    /// Keep only the last lines of command output for error messages
    fn last_lines(text: &str, keep: usize) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(keep);
        lines[start..].join("\n")
    }

    /// Index JSON API endpoint for one released version
    fn release_endpoint(&self, package: &PackageId) -> String {
        format!(
            "{}/{}/{}/json",
            self.verify_url.trim_end_matches('/'),
            package.name,
            package.version
        )
    }

    /// Map a failed twine invocation to the precise error
    fn classify_upload_failure(
        subproject: &str,
        output: &str,
        exit_code: Option<i32>,
    ) -> DispatchError {
        let lowered = output.to_lowercase();

        if lowered.contains("already exists") {
            return DispatchError::VersionConflict {
                subproject: subproject.to_string(),
            };
        }

        if lowered.contains("403 forbidden")
            || lowered.contains("401 unauthorized")
            || lowered.contains("invalid or non-existent authentication")
        {
            return DispatchError::AuthenticationFailed {
                subproject: subproject.to_string(),
            };
        }

        DispatchError::UploadFailed {
            subproject: subproject.to_string(),
            message: Self::last_lines(output, OUTPUT_TAIL_LINES),
            exit_code,
        }
    }

    /// Run the manifest-appropriate build command
    async fn run_build_command(
        &self,
        ctx: &SubProjectContext,
        kind: ManifestKind,
    ) -> Result<(), DispatchError> {
        let args: &[&str] = match kind {
            ManifestKind::SetupPy => &["setup.py", "sdist", "bdist_wheel"],
            ManifestKind::Pyproject => &["-m", "build", "--sdist", "--wheel"],
        };

        let output = self
            .build_executor
            .execute(ctx.dir(), "python", args)
            .await
            .map_err(|e| match e {
                CommandError::Timeout(_) => DispatchError::TimeoutError {
                    subproject: ctx.name().to_string(),
                },
                other => DispatchError::BuildFailed {
                    subproject: ctx.name().to_string(),
                    message: other.to_string(),
                    exit_code: None,
                },
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DispatchError::BuildFailed {
                subproject: ctx.name().to_string(),
                message: Self::last_lines(&stderr, OUTPUT_TAIL_LINES),
                exit_code: output.status.code(),
            });
        }

        Ok(())
    }

    /// Collect distribution files from the sub-project's dist/ directory
    async fn collect_artifacts(
        &self,
        ctx: &SubProjectContext,
    ) -> Result<BuildArtifacts, DispatchError> {
        let dist_dir = ctx.dir().join("dist");
        let mut files = Vec::new();

        let mut entries = match fs::read_dir(&dist_dir).await {
            Ok(entries) => entries,
            Err(_) => {
                return Err(DispatchError::NoArtifacts {
                    subproject: ctx.name().to_string(),
                });
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.ends_with(".whl")
                || file_name.ends_with(".tar.gz")
                || file_name.ends_with(".zip")
            {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(DispatchError::NoArtifacts {
                subproject: ctx.name().to_string(),
            });
        }

        files.sort();

        // Identity comes from the sdist name; wheel names mangle dots in
        // package names so they are only a fallback
        let names: Vec<&str> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        let package = names
            .iter()
            .find(|n| n.ends_with(".tar.gz") || n.ends_with(".zip"))
            .and_then(|n| PackageId::from_artifact_name(n))
            .or_else(|| names.iter().find_map(|n| PackageId::from_artifact_name(n)));

        Ok(BuildArtifacts {
            dist_dir,
            files,
            package,
        })
    }

    /// Artifact arguments for twine, relative to the sub-project directory
    ///
    /// twine runs with the sub-project directory as its working directory,
    /// so the collected paths (anchored at the dispatcher's own cwd when the
    /// project root is relative) must be re-based or they resolve to
    /// `<subproject>/<subproject>/dist/...` inside the child. Paths outside
    /// the sub-project directory are kept as given.
    fn artifact_args(ctx: &SubProjectContext, artifacts: &BuildArtifacts) -> Vec<String> {
        artifacts
            .files
            .iter()
            .map(|file| {
                file.strip_prefix(ctx.dir())
                    .unwrap_or(file)
                    .display()
                    .to_string()
            })
            .collect()
    }

    /// One twine upload attempt
    async fn run_twine_upload(
        &self,
        ctx: &SubProjectContext,
        credentials: &IndexCredentials,
        args: &[String],
    ) -> Result<String, DispatchError> {
        let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

        // Credentials travel through the child environment, never argv
        let envs = [
            (USERNAME_VAR, credentials.username().expose_secret()),
            (PASSWORD_VAR, credentials.password().expose_secret()),
        ];

        let output = self
            .upload_executor
            .execute_with_env(ctx.dir(), "twine", &arg_refs, &envs)
            .await
            .map_err(|e| match e {
                CommandError::Timeout(_) => DispatchError::TimeoutError {
                    subproject: ctx.name().to_string(),
                },
                other => DispatchError::UploadFailed {
                    subproject: ctx.name().to_string(),
                    message: other.to_string(),
                    exit_code: None,
                },
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            return Ok(stdout);
        }

        let combined = format!("{}\n{}", stdout, stderr);
        Err(Self::classify_upload_failure(
            ctx.name(),
            &combined,
            output.status.code(),
        ))
    }
}

#[async_trait]
impl ReleaseSteps for PythonSteps {
    fn name(&self) -> &str {
        "python"
    }

    async fn build(&self, ctx: &SubProjectContext) -> anyhow::Result<BuildArtifacts> {
        let layout = self.layout.ensure_buildable(ctx).await?;

        // Stale distributions must not ride along with the new upload
        let dist_dir = ctx.dir().join("dist");
        if fs::metadata(&dist_dir).await.is_ok() {
            fs::remove_dir_all(&dist_dir)
                .await
                .map_err(|e| DispatchError::BuildFailed {
                    subproject: ctx.name().to_string(),
                    message: format!("dist ディレクトリを削除できません: {}", e),
                    exit_code: None,
                })?;
        }

        self.run_build_command(ctx, layout.kind).await?;

        let artifacts = self.collect_artifacts(ctx).await?;
        Ok(artifacts)
    }

    async fn upload(
        &self,
        ctx: &SubProjectContext,
        artifacts: &BuildArtifacts,
    ) -> anyhow::Result<UploadReceipt> {
        if artifacts.files.is_empty() {
            return Err(DispatchError::NoArtifacts {
                subproject: ctx.name().to_string(),
            }
            .into());
        }

        let credentials =
            self.credentials
                .as_ref()
                .ok_or_else(|| DispatchError::CredentialsMissing {
                    variable: USERNAME_VAR.to_string(),
                })?;

        let mut args = vec![
            "upload".to_string(),
            "--non-interactive".to_string(),
            "--disable-progress-bar".to_string(),
            "--repository-url".to_string(),
            self.repository_url.clone(),
        ];
        args.extend(Self::artifact_args(ctx, artifacts));

        let output = self
            .retry
            .run(|| self.run_twine_upload(ctx, credentials, &args))
            .await?;

        Ok(UploadReceipt {
            uploaded: artifacts.file_count(),
            // twine may echo the username; scrub before the output is kept
            output: Some(credentials.mask_in_string(&output)),
            package_url: artifacts
                .package
                .as_ref()
                .map(|p| format!("https://pypi.org/project/{}/{}/", p.name, p.version)),
        })
    }

    async fn verify(&self, artifacts: &BuildArtifacts) -> anyhow::Result<VerificationResult> {
        let Some(package) = &artifacts.package else {
            return Ok(VerificationResult {
                verified: false,
                version: None,
                url: None,
                error: Some("成果物からパッケージ情報を特定できませんでした".to_string()),
            });
        };

        let url = self.release_endpoint(package);
        let client = reqwest::Client::new();

        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(VerificationResult {
                    verified: false,
                    version: Some(package.version.clone()),
                    url: Some(url),
                    error: Some(format!("検証に失敗しました: {}", e)),
                });
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            return Ok(VerificationResult {
                verified: false,
                version: Some(package.version.clone()),
                url: Some(url),
                error: Some(format!(
                    "バージョン {} がインデックスで見つかりません（HTTP {}）",
                    package.version, status
                )),
            });
        }

        match response.json::<ReleasePage>().await {
            Ok(page) => {
                let matches = page.info.version == package.version;
                Ok(VerificationResult {
                    verified: matches,
                    version: Some(page.info.version),
                    url: Some(url),
                    error: if matches {
                        None
                    } else {
                        Some("インデックス上のバージョンが一致しません".to_string())
                    },
                })
            }
            Err(e) => Ok(VerificationResult {
                verified: false,
                version: Some(package.version.clone()),
                url: Some(url),
                error: Some(format!("検証レスポンスの解析に失敗しました: {}", e)),
            }),
        }
    }
}
