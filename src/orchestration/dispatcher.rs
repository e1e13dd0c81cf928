//! Release Dispatcher - Sequential build and upload across sub-projects
//!
//! Features:
//! - Strict roster order: build then upload for one sub-project completes
//!   before the next begins
//! - Scoped per-sub-project contexts (the process working directory is
//!   never changed)
//! - continueOnError / fail-fast policies with skip reporting
//! - Exit status carried from the last failing invocation

use crate::core::config::DispatchConfig;
use crate::core::error::DispatchError;
use crate::core::traits::{PackageId, ReleaseSteps, SubProjectContext};
use crate::validation::roster_validator::RosterValidator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// How a dispatch run was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl Trigger {
    /// Get string representation of the trigger
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
        }
    }
}

/// Terminal state of one sub-project within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubProjectStatus {
    /// Built and uploaded
    Published,
    /// Built, upload skipped by dry-run mode
    DryRun,
    /// Build or upload failed
    Failed,
    /// Never visited because an earlier failure stopped the run
    Skipped,
}

/// Outcome of one sub-project within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProjectOutcome {
    pub name: String,
    pub status: SubProjectStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Full report of one dispatch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Per-sub-project outcomes, in roster order
    pub outcomes: Vec<SubProjectOutcome>,
    pub success: bool,
    /// 0 on success; otherwise the exit status of the last failing
    /// invocation, or 1 when none was produced
    pub exit_code: i32,
}

impl DispatchReport {
    pub fn published_count(&self) -> usize {
        self.count(SubProjectStatus::Published)
    }

    pub fn dry_run_count(&self) -> usize {
        self.count(SubProjectStatus::DryRun)
    }

    pub fn failed_count(&self) -> usize {
        self.count(SubProjectStatus::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(SubProjectStatus::Skipped)
    }

    fn count(&self, status: SubProjectStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Options for one dispatch run
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Keep visiting remaining sub-projects after a failure
    pub continue_on_error: bool,

    /// Build only, skip uploads
    pub dry_run: bool,

    /// Check the index after each upload
    pub verify: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            dry_run: false,
            verify: false,
        }
    }
}

impl DispatchOptions {
    /// Build run options from resolved configuration
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            continue_on_error: config.continue_on_error(),
            dry_run: config.dry_run(),
            verify: config.verify(),
        }
    }
}

/// ReleaseDispatcher - drives the build/upload steps across the roster
pub struct ReleaseDispatcher {
    steps: Arc<dyn ReleaseSteps>,
    options: DispatchOptions,
}

impl ReleaseDispatcher {
    /// Create a new ReleaseDispatcher
    ///
    /// # Arguments
    ///
    /// * `steps` - Build/upload implementation to drive
    /// * `options` - Run options
    pub fn new(steps: Arc<dyn ReleaseSteps>, options: DispatchOptions) -> Self {
        Self { steps, options }
    }

    /// Run one dispatch over the roster
    ///
    /// Sub-projects are visited strictly in roster order, each exactly once.
    /// An invalid roster is rejected before any sub-project is visited.
    /// Per-sub-project failures are captured in the report; this returns Err
    /// only when the run could not start.
    ///
    /// # Arguments
    ///
    /// * `roster` - Sub-project names in publish order
    /// * `project_root` - Directory containing the sub-project directories
    /// * `trigger` - How this run was initiated
    pub async fn dispatch(
        &self,
        roster: &[String],
        project_root: &Path,
        trigger: Trigger,
    ) -> Result<DispatchReport, DispatchError> {
        RosterValidator::new().ensure_valid(roster)?;

        let started_at = Utc::now();
        let run_start = Instant::now();

        println!(
            "\n📦 Release dispatch: {} sub-projects ({} trigger)",
            roster.len(),
            trigger.as_str()
        );
        println!("Order: {}", roster.join(" -> "));
        println!(
            "Continue on error: {}",
            if self.options.continue_on_error {
                "Yes"
            } else {
                "No"
            }
        );
        if self.options.dry_run {
            println!("🔍 Dry-run mode: uploads will be skipped");
        }

        let mut outcomes = Vec::with_capacity(roster.len());
        let mut failed = false;

        for name in roster {
            if failed && !self.options.continue_on_error {
                println!("⏭️  Skipping {} due to previous failure", name);
                outcomes.push(SubProjectOutcome {
                    name: name.clone(),
                    status: SubProjectStatus::Skipped,
                    duration_ms: 0,
                    package: None,
                    error: None,
                    exit_code: None,
                    warnings: Vec::new(),
                });
                continue;
            }

            let ctx = SubProjectContext::new(name.clone(), project_root.join(name));
            let outcome = self.run_subproject(&ctx).await;
            if outcome.status == SubProjectStatus::Failed {
                failed = true;
            }
            outcomes.push(outcome);
        }

        let success = outcomes.iter().all(|o| {
            matches!(
                o.status,
                SubProjectStatus::Published | SubProjectStatus::DryRun
            )
        });
        let exit_code = if success {
            0
        } else {
            outcomes
                .iter()
                .rev()
                .find(|o| o.status == SubProjectStatus::Failed)
                .and_then(|o| o.exit_code)
                .unwrap_or(1)
        };

        let report = DispatchReport {
            trigger,
            started_at,
            duration_ms: run_start.elapsed().as_millis() as u64,
            outcomes,
            success,
            exit_code,
        };

        Self::print_summary(&report);

        Ok(report)
    }

    /// Build and upload one sub-project, capturing the outcome
    async fn run_subproject(&self, ctx: &SubProjectContext) -> SubProjectOutcome {
        println!("\n🚀 Dispatching {}...", ctx.name());
        let start = Instant::now();
        let mut warnings = Vec::new();

        match self.build_and_upload(ctx, &mut warnings).await {
            Ok((status, package)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                let verb = match status {
                    SubProjectStatus::DryRun => "built (dry-run)",
                    _ => "published",
                };
                println!("✅ {}: {} in {}ms", ctx.name(), verb, duration_ms);

                SubProjectOutcome {
                    name: ctx.name().to_string(),
                    status,
                    duration_ms,
                    package,
                    error: None,
                    exit_code: None,
                    warnings,
                }
            }
            Err(e) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                println!("❌ {}: {}", ctx.name(), e);

                let exit_code = e
                    .downcast_ref::<DispatchError>()
                    .and_then(DispatchError::exit_code);

                SubProjectOutcome {
                    name: ctx.name().to_string(),
                    status: SubProjectStatus::Failed,
                    duration_ms,
                    package: None,
                    error: Some(e.to_string()),
                    exit_code,
                    warnings,
                }
            }
        }
    }

    async fn build_and_upload(
        &self,
        ctx: &SubProjectContext,
        warnings: &mut Vec<String>,
    ) -> anyhow::Result<(SubProjectStatus, Option<PackageId>)> {
        let artifacts = self.steps.build(ctx).await?;
        println!("   📦 {} distribution files built", artifacts.file_count());

        if self.options.dry_run {
            return Ok((SubProjectStatus::DryRun, artifacts.package.clone()));
        }

        let receipt = self.steps.upload(ctx, &artifacts).await?;
        println!("   📤 {} files uploaded", receipt.uploaded);

        // Verification never fails the run; the upload already happened
        if self.options.verify {
            match self.steps.verify(&artifacts).await {
                Ok(result) if result.verified => {
                    println!("   🔍 Verified on index");
                }
                Ok(result) => {
                    let message = result
                        .error
                        .unwrap_or_else(|| "公開の検証に失敗しました".to_string());
                    println!("   ⚠️  Verification warning: {}", message);
                    warnings.push(message);
                }
                Err(e) => {
                    let message = format!("検証に失敗しました: {}", e);
                    println!("   ⚠️  Verification warning: {}", message);
                    warnings.push(message);
                }
            }
        }

        Ok((SubProjectStatus::Published, artifacts.package.clone()))
    }

    /// Print the dispatch run summary
    fn print_summary(report: &DispatchReport) {
        println!("\n{}", "=".repeat(60));
        println!("📊 Dispatch Summary");
        println!("{}", "=".repeat(60));

        for outcome in &report.outcomes {
            let mark = match outcome.status {
                SubProjectStatus::Published => "✅",
                SubProjectStatus::DryRun => "🔍",
                SubProjectStatus::Failed => "❌",
                SubProjectStatus::Skipped => "⏭️ ",
            };
            match &outcome.error {
                Some(error) => println!(
                    "   {} {}: {} ({}ms)",
                    mark, outcome.name, error, outcome.duration_ms
                ),
                None => println!("   {} {} ({}ms)", mark, outcome.name, outcome.duration_ms),
            }
        }

        println!(
            "\n✅ Published: {}   🔍 Dry-run: {}   ❌ Failed: {}   ⏭️  Skipped: {}",
            report.published_count(),
            report.dry_run_count(),
            report.failed_count(),
            report.skipped_count()
        );

        println!("\n{}", "=".repeat(60));
        println!(
            "Overall Status: {}",
            if report.success {
                "✅ SUCCESS"
            } else {
                "❌ FAILED"
            }
        );
        println!("{}\n", "=".repeat(60));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{BuildArtifacts, UploadReceipt};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every step invocation in order; failures are injected per name
    struct RecordingSteps {
        calls: Mutex<Vec<String>>,
        build_failures: HashMap<String, Option<i32>>,
        upload_failures: HashMap<String, Option<i32>>,
    }

    impl RecordingSteps {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                build_failures: HashMap::new(),
                upload_failures: HashMap::new(),
            }
        }

        fn with_build_failure(mut self, name: &str, exit_code: Option<i32>) -> Self {
            self.build_failures.insert(name.to_string(), exit_code);
            self
        }

        fn with_upload_failure(mut self, name: &str, exit_code: Option<i32>) -> Self {
            self.upload_failures.insert(name.to_string(), exit_code);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReleaseSteps for RecordingSteps {
        fn name(&self) -> &str {
            "recording"
        }

        async fn build(&self, ctx: &SubProjectContext) -> anyhow::Result<BuildArtifacts> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("build({})", ctx.name()));

            if let Some(exit_code) = self.build_failures.get(ctx.name()) {
                return Err(DispatchError::BuildFailed {
                    subproject: ctx.name().to_string(),
                    message: "simulated build failure".to_string(),
                    exit_code: *exit_code,
                }
                .into());
            }

            let sdist = format!("{}-1.0.0.tar.gz", ctx.name());
            Ok(BuildArtifacts {
                dist_dir: ctx.dir().join("dist"),
                files: vec![ctx.dir().join("dist").join(&sdist)],
                package: PackageId::from_artifact_name(&sdist),
            })
        }

        async fn upload(
            &self,
            ctx: &SubProjectContext,
            artifacts: &BuildArtifacts,
        ) -> anyhow::Result<UploadReceipt> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("upload({})", ctx.name()));

            if let Some(exit_code) = self.upload_failures.get(ctx.name()) {
                return Err(DispatchError::UploadFailed {
                    subproject: ctx.name().to_string(),
                    message: "simulated upload failure".to_string(),
                    exit_code: *exit_code,
                }
                .into());
            }

            Ok(UploadReceipt {
                uploaded: artifacts.file_count(),
                output: None,
                package_url: None,
            })
        }
    }

    fn roster(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn dispatcher(steps: Arc<RecordingSteps>, options: DispatchOptions) -> ReleaseDispatcher {
        ReleaseDispatcher::new(steps, options)
    }

    #[tokio::test]
    async fn test_dispatch_interleaves_build_and_upload_in_order() {
        let steps = Arc::new(RecordingSteps::new());
        let dispatcher = dispatcher(steps.clone(), DispatchOptions::default());

        let report = dispatcher
            .dispatch(&roster(&["a", "b"]), Path::new("repo"), Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(
            steps.calls(),
            vec!["build(a)", "upload(a)", "build(b)", "upload(b)"]
        );
        assert!(report.success);
        assert_eq!(report.exit_code, 0);
    }

    #[tokio::test]
    async fn test_dispatch_visits_full_roster_once_in_declared_order() {
        let names = [
            "common",
            "core",
            "features",
            "tabular",
            "multimodal",
            "timeseries",
            "autogluon",
        ];
        let steps = Arc::new(RecordingSteps::new());
        let dispatcher = dispatcher(steps.clone(), DispatchOptions::default());

        let report = dispatcher
            .dispatch(&roster(&names), Path::new("repo"), Trigger::Scheduled)
            .await
            .unwrap();

        let visited: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(visited, names);
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.status == SubProjectStatus::Published));

        let calls = steps.calls();
        assert_eq!(calls.len(), names.len() * 2);
        for name in names {
            assert_eq!(
                calls
                    .iter()
                    .filter(|c| *c == &format!("build({})", name))
                    .count(),
                1
            );
        }
    }

    #[tokio::test]
    async fn test_working_directory_unchanged_after_dispatch() {
        let before = std::env::current_dir().unwrap();

        let steps = Arc::new(RecordingSteps::new().with_build_failure("b", Some(2)));
        let dispatcher = dispatcher(steps, DispatchOptions::default());
        dispatcher
            .dispatch(&roster(&["a", "b", "c"]), Path::new("repo"), Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[tokio::test]
    async fn test_continue_on_error_visits_remaining() {
        let steps = Arc::new(RecordingSteps::new().with_build_failure("b", Some(7)));
        let dispatcher = dispatcher(
            steps.clone(),
            DispatchOptions {
                continue_on_error: true,
                ..DispatchOptions::default()
            },
        );

        let report = dispatcher
            .dispatch(&roster(&["a", "b", "c"]), Path::new("repo"), Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(
            steps.calls(),
            vec![
                "build(a)",
                "upload(a)",
                "build(b)",
                "build(c)",
                "upload(c)"
            ]
        );
        let statuses: Vec<SubProjectStatus> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                SubProjectStatus::Published,
                SubProjectStatus::Failed,
                SubProjectStatus::Published
            ]
        );
        assert!(!report.success);
        assert_eq!(report.exit_code, 7);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining() {
        let steps = Arc::new(RecordingSteps::new().with_build_failure("b", Some(7)));
        let dispatcher = dispatcher(
            steps.clone(),
            DispatchOptions {
                continue_on_error: false,
                ..DispatchOptions::default()
            },
        );

        let report = dispatcher
            .dispatch(&roster(&["a", "b", "c"]), Path::new("repo"), Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(steps.calls(), vec!["build(a)", "upload(a)", "build(b)"]);
        assert_eq!(report.outcomes[2].status, SubProjectStatus::Skipped);
        assert_eq!(report.skipped_count(), 1);
        assert!(!report.success);
        assert_eq!(report.exit_code, 7);
    }

    #[tokio::test]
    async fn test_exit_code_comes_from_last_failure() {
        let steps = Arc::new(
            RecordingSteps::new()
                .with_build_failure("b", Some(7))
                .with_build_failure("d", Some(9)),
        );
        let dispatcher = dispatcher(steps, DispatchOptions::default());

        let report = dispatcher
            .dispatch(
                &roster(&["a", "b", "c", "d", "e"]),
                Path::new("repo"),
                Trigger::Manual,
            )
            .await
            .unwrap();

        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.exit_code, 9);
    }

    #[tokio::test]
    async fn test_exit_code_fallback_is_one() {
        let steps = Arc::new(RecordingSteps::new().with_build_failure("a", None));
        let dispatcher = dispatcher(steps, DispatchOptions::default());

        let report = dispatcher
            .dispatch(&roster(&["a"]), Path::new("repo"), Trigger::Manual)
            .await
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.exit_code, 1);
    }

    #[tokio::test]
    async fn test_upload_failure_records_exit_code() {
        let steps = Arc::new(RecordingSteps::new().with_upload_failure("b", Some(3)));
        let dispatcher = dispatcher(steps.clone(), DispatchOptions::default());

        let report = dispatcher
            .dispatch(&roster(&["a", "b", "c"]), Path::new("repo"), Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(
            steps.calls(),
            vec![
                "build(a)",
                "upload(a)",
                "build(b)",
                "upload(b)",
                "build(c)",
                "upload(c)"
            ]
        );
        assert_eq!(report.outcomes[1].status, SubProjectStatus::Failed);
        assert_eq!(report.outcomes[1].exit_code, Some(3));
        assert_eq!(report.exit_code, 3);
    }

    #[tokio::test]
    async fn test_dry_run_skips_upload() {
        let steps = Arc::new(RecordingSteps::new());
        let dispatcher = dispatcher(
            steps.clone(),
            DispatchOptions {
                dry_run: true,
                ..DispatchOptions::default()
            },
        );

        let report = dispatcher
            .dispatch(&roster(&["a", "b"]), Path::new("repo"), Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(steps.calls(), vec!["build(a)", "build(b)"]);
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.status == SubProjectStatus::DryRun));
        assert!(report.success);
        assert_eq!(report.exit_code, 0);
    }

    #[tokio::test]
    async fn test_invalid_roster_rejected_before_any_visit() {
        let steps = Arc::new(RecordingSteps::new());
        let dispatcher = dispatcher(steps.clone(), DispatchOptions::default());

        let err = dispatcher
            .dispatch(&roster(&["x", "x"]), Path::new("repo"), Trigger::Manual)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "DUPLICATE_SUBPROJECT");
        assert!(steps.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_roster_rejected() {
        let steps = Arc::new(RecordingSteps::new());
        let dispatcher = dispatcher(steps.clone(), DispatchOptions::default());

        let err = dispatcher
            .dispatch(&[], Path::new("repo"), Trigger::Manual)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "ROSTER_EMPTY");
        assert!(steps.calls().is_empty());
    }

    #[tokio::test]
    async fn test_verification_failure_is_warning_only() {
        // RecordingSteps keeps the default verify, which reports unsupported
        let steps = Arc::new(RecordingSteps::new());
        let dispatcher = dispatcher(
            steps,
            DispatchOptions {
                verify: true,
                ..DispatchOptions::default()
            },
        );

        let report = dispatcher
            .dispatch(&roster(&["a"]), Path::new("repo"), Trigger::Manual)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.outcomes[0].status, SubProjectStatus::Published);
        assert_eq!(report.outcomes[0].warnings.len(), 1);
    }

    #[test]
    fn test_options_from_config_defaults() {
        let options = DispatchOptions::from_config(&DispatchConfig::default());

        assert!(options.continue_on_error);
        assert!(!options.dry_run);
        assert!(!options.verify);
    }

    #[test]
    fn test_trigger_as_str() {
        assert_eq!(Trigger::Manual.as_str(), "manual");
        assert_eq!(Trigger::Scheduled.as_str(), "scheduled");
    }
}
