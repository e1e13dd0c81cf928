//! RunHistory - Persistent record of dispatch runs
//!
//! Features:
//! - Record every dispatch run with its per-sub-project outcomes
//! - Filter records by trigger, sub-project, time window and result
//! - Calculate statistics (success rate, per-sub-project counts)
//! - Generate a Markdown report for the history command
//! - Persistent JSON storage under the project root

use crate::orchestration::dispatcher::{
    DispatchReport, SubProjectOutcome, SubProjectStatus, Trigger,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;

/// History record for a single dispatch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: String,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub exit_code: i32,
    pub outcomes: Vec<SubProjectOutcome>,
}

/// Options for filtering history records
#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
    pub trigger: Option<Trigger>,
    /// Only runs that visited this sub-project
    pub subproject: Option<String>,
    /// Only runs started within the last N days
    pub days: Option<i64>,
    pub success_only: bool,
    pub failures_only: bool,
    pub limit: Option<usize>,
}

/// Per-sub-project statistics across runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProjectStatistics {
    pub name: String,
    /// Times the sub-project was actually visited (skips excluded)
    pub attempts: usize,
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
    pub success_rate: f64,
    pub last_status: SubProjectStatus,
    pub last_run: DateTime<Utc>,
}

/// Overall dispatch statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchStatistics {
    pub total_runs: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub by_subproject: HashMap<String, SubProjectStatistics>,
    pub time_range: TimeRange,
}

/// Time range for statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Data file structure
#[derive(Debug, Serialize, Deserialize)]
struct HistoryDataFile {
    version: String,
    records: Vec<DispatchRecord>,
    last_updated: String,
}

/// RunHistory - Persistent record of dispatch runs
pub struct RunHistory {
    records: Vec<DispatchRecord>,
    data_file_path: PathBuf,
}

impl RunHistory {
    /// Create a new RunHistory instance
    ///
    /// # Arguments
    ///
    /// * `project_root` - Directory containing the sub-project directories
    pub fn new<P: Into<PathBuf>>(project_root: P) -> Self {
        let history_dir = project_root.into().join(".release-dispatcher");
        let data_file_path = history_dir.join("history.json");

        Self {
            records: Vec::new(),
            data_file_path,
        }
    }

    /// Initialize history by loading existing data
    ///
    /// An unreadable data file is set aside as `history.json.corrupt` with
    /// a warning, so the next save never silently overwrites prior runs.
    /// A missing file just means no runs have been recorded yet.
    pub async fn initialize(&mut self) -> Result<(), anyhow::Error> {
        match self.load_records().await {
            Ok(()) => Ok(()),
            Err(e) => {
                if fs::metadata(&self.data_file_path).await.is_ok() {
                    let backup = self.data_file_path.with_extension("json.corrupt");
                    eprintln!(
                        "⚠️  履歴ファイルを読み込めません: {} ({})",
                        self.data_file_path.display(),
                        e
                    );
                    if fs::rename(&self.data_file_path, &backup).await.is_ok() {
                        eprintln!("⚠️  破損した履歴を退避しました: {}", backup.display());
                    }
                }
                self.records = Vec::new();
                Ok(())
            }
        }
    }

    /// Record a dispatch run
    ///
    /// # Arguments
    ///
    /// * `report` - Dispatch report to record
    pub async fn record_run(&mut self, report: &DispatchReport) -> Result<(), anyhow::Error> {
        let record = DispatchRecord {
            id: Self::generate_id(),
            trigger: report.trigger,
            started_at: report.started_at,
            duration_ms: report.duration_ms,
            success: report.success,
            exit_code: report.exit_code,
            outcomes: report.outcomes.clone(),
        };

        self.records.push(record);
        self.save_records().await?;

        Ok(())
    }

    /// Get filtered records, most recent first
    ///
    /// # Arguments
    ///
    /// * `options` - Filtering options
    pub fn get_records(&self, options: &HistoryOptions) -> Vec<DispatchRecord> {
        let cutoff = options.days.map(|days| Utc::now() - Duration::days(days));

        let mut filtered: Vec<_> = self
            .records
            .iter()
            .filter(|r| {
                if let Some(trigger) = options.trigger
                    && r.trigger != trigger
                {
                    return false;
                }

                if let Some(ref subproject) = options.subproject
                    && !r.outcomes.iter().any(|o| &o.name == subproject)
                {
                    return false;
                }

                if let Some(cutoff) = cutoff
                    && r.started_at < cutoff
                {
                    return false;
                }

                if options.success_only && !r.success {
                    return false;
                }

                if options.failures_only && r.success {
                    return false;
                }

                true
            })
            .cloned()
            .collect();

        filtered.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        if let Some(limit) = options.limit {
            filtered.truncate(limit);
        }

        filtered
    }

    /// Calculate statistics from records
    ///
    /// # Arguments
    ///
    /// * `options` - Filtering options
    pub fn get_statistics(&self, options: &HistoryOptions) -> DispatchStatistics {
        let records = self.get_records(options);

        if records.is_empty() {
            return Self::empty_statistics();
        }

        let success_count = records.iter().filter(|r| r.success).count();
        let failure_count = records.len() - success_count;
        let total_duration: u64 = records.iter().map(|r| r.duration_ms).sum();
        let average_duration_ms = total_duration as f64 / records.len() as f64;

        let by_subproject = Self::calculate_subproject_statistics(&records);

        let timestamps: Vec<_> = records.iter().map(|r| r.started_at).collect();
        let start = *timestamps.iter().min().unwrap();
        let end = *timestamps.iter().max().unwrap();

        DispatchStatistics {
            total_runs: records.len(),
            success_count,
            failure_count,
            success_rate: (success_count as f64 / records.len() as f64) * 100.0,
            average_duration_ms,
            by_subproject,
            time_range: TimeRange { start, end },
        }
    }

    /// Generate a Markdown history report
    ///
    /// # Arguments
    ///
    /// * `options` - Filtering options
    pub fn generate_markdown(&self, options: &HistoryOptions) -> String {
        let statistics = self.get_statistics(options);

        let mut recent_options = options.clone();
        if recent_options.limit.is_none() {
            recent_options.limit = Some(10);
        }
        let recent_runs = self.get_records(&recent_options);

        let mut lines = Vec::new();

        lines.push("# Dispatch History Report\n".to_string());
        lines.push(format!("**Generated**: {}\n", Utc::now().to_rfc3339()));

        lines.push("## Overall Statistics\n".to_string());
        lines.push(format!("- **Total Runs**: {}", statistics.total_runs));
        lines.push(format!("- **Successful**: {}", statistics.success_count));
        lines.push(format!("- **Failed**: {}", statistics.failure_count));
        lines.push(format!("- **Success Rate**: {:.2}%", statistics.success_rate));
        lines.push(format!(
            "- **Average Duration**: {:.2}s\n",
            statistics.average_duration_ms / 1000.0
        ));

        if !statistics.by_subproject.is_empty() {
            lines.push("## Sub-project Statistics\n".to_string());
            lines.push(
                "| Sub-project | Attempts | Published | Failed | Skipped | Success Rate |"
                    .to_string(),
            );
            lines.push(
                "|-------------|----------|-----------|--------|---------|--------------|"
                    .to_string(),
            );

            let mut stats: Vec<_> = statistics.by_subproject.values().collect();
            stats.sort_by(|a, b| a.name.cmp(&b.name));
            for s in stats {
                lines.push(format!(
                    "| {} | {} | {} | {} | {} | {:.1}% |",
                    s.name, s.attempts, s.published, s.failed, s.skipped, s.success_rate
                ));
            }
            lines.push(String::new());
        }

        if !recent_runs.is_empty() {
            lines.push("## Recent Runs\n".to_string());
            lines.push("| Started | Trigger | Result | Exit | Duration |".to_string());
            lines.push("|---------|---------|--------|------|----------|".to_string());

            for record in &recent_runs {
                let result = if record.success {
                    "✅ Success"
                } else {
                    "❌ Failed"
                };
                lines.push(format!(
                    "| {} | {} | {} | {} | {:.2}s |",
                    record.started_at.format("%Y-%m-%d %H:%M"),
                    record.trigger.as_str(),
                    result,
                    record.exit_code,
                    record.duration_ms as f64 / 1000.0
                ));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }

    /// Clear all history data
    pub async fn clear_data(&mut self) -> Result<(), anyhow::Error> {
        self.records.clear();
        self.save_records().await?;
        Ok(())
    }

    // Private methods

    fn generate_id() -> String {
        format!("{}-{}", Utc::now().timestamp_millis(), uuid::Uuid::new_v4())
    }

    async fn load_records(&mut self) -> Result<(), anyhow::Error> {
        let data = fs::read_to_string(&self.data_file_path).await?;
        let parsed: HistoryDataFile = serde_json::from_str(&data)?;
        self.records = parsed.records;
        Ok(())
    }

    async fn save_records(&self) -> Result<(), anyhow::Error> {
        if let Some(dir) = self.data_file_path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let data = HistoryDataFile {
            version: "1.0".to_string(),
            records: self.records.clone(),
            last_updated: Utc::now().to_rfc3339(),
        };

        // Write-then-rename keeps existing history intact on partial writes
        let json = serde_json::to_string_pretty(&data)?;
        let tmp_path = self.data_file_path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &self.data_file_path).await?;

        Ok(())
    }

    fn calculate_subproject_statistics(
        records: &[DispatchRecord],
    ) -> HashMap<String, SubProjectStatistics> {
        let mut grouped: HashMap<String, Vec<(&DispatchRecord, &SubProjectOutcome)>> =
            HashMap::new();

        for record in records {
            for outcome in &record.outcomes {
                grouped
                    .entry(outcome.name.clone())
                    .or_default()
                    .push((record, outcome));
            }
        }

        grouped
            .into_iter()
            .map(|(name, entries)| {
                let published = entries
                    .iter()
                    .filter(|(_, o)| {
                        matches!(
                            o.status,
                            SubProjectStatus::Published | SubProjectStatus::DryRun
                        )
                    })
                    .count();
                let failed = entries
                    .iter()
                    .filter(|(_, o)| o.status == SubProjectStatus::Failed)
                    .count();
                let skipped = entries
                    .iter()
                    .filter(|(_, o)| o.status == SubProjectStatus::Skipped)
                    .count();
                let attempts = entries.len() - skipped;

                let most_recent = entries.iter().max_by_key(|(r, _)| r.started_at).unwrap();

                let success_rate = if attempts > 0 {
                    (published as f64 / attempts as f64) * 100.0
                } else {
                    0.0
                };

                let stats = SubProjectStatistics {
                    name: name.clone(),
                    attempts,
                    published,
                    failed,
                    skipped,
                    success_rate,
                    last_status: most_recent.1.status,
                    last_run: most_recent.0.started_at,
                };

                (name, stats)
            })
            .collect()
    }

    fn empty_statistics() -> DispatchStatistics {
        DispatchStatistics {
            total_runs: 0,
            success_count: 0,
            failure_count: 0,
            success_rate: 0.0,
            average_duration_ms: 0.0,
            by_subproject: HashMap::new(),
            time_range: TimeRange {
                start: Utc::now(),
                end: Utc::now(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_report(
        trigger: Trigger,
        outcomes: &[(&str, SubProjectStatus)],
    ) -> DispatchReport {
        let outcomes: Vec<SubProjectOutcome> = outcomes
            .iter()
            .map(|(name, status)| SubProjectOutcome {
                name: name.to_string(),
                status: *status,
                duration_ms: 600,
                package: None,
                error: (*status == SubProjectStatus::Failed).then(|| "boom".to_string()),
                exit_code: None,
                warnings: Vec::new(),
            })
            .collect();
        let success = outcomes.iter().all(|o| {
            matches!(
                o.status,
                SubProjectStatus::Published | SubProjectStatus::DryRun
            )
        });

        DispatchReport {
            trigger,
            started_at: Utc::now(),
            duration_ms: 1200,
            outcomes,
            success,
            exit_code: if success { 0 } else { 1 },
        }
    }

    #[tokio::test]
    async fn test_new_history() {
        let history = RunHistory::new(".");
        assert_eq!(history.records.len(), 0);
        assert!(history
            .data_file_path
            .ends_with(".release-dispatcher/history.json"));
    }

    #[test]
    fn test_history_options_default() {
        let options = HistoryOptions::default();
        assert_eq!(options.trigger, None);
        assert!(!options.success_only);
        assert!(!options.failures_only);
    }

    #[tokio::test]
    async fn test_record_and_reload() {
        let temp_dir = TempDir::new().unwrap();

        let mut history = RunHistory::new(temp_dir.path());
        history.initialize().await.unwrap();
        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[
                    ("common", SubProjectStatus::Published),
                    ("core", SubProjectStatus::Published),
                ],
            ))
            .await
            .unwrap();

        let mut reloaded = RunHistory::new(temp_dir.path());
        reloaded.initialize().await.unwrap();

        assert_eq!(reloaded.records.len(), 1);
        assert_eq!(reloaded.records[0].outcomes.len(), 2);
        assert!(reloaded.records[0].success);
    }

    #[tokio::test]
    async fn test_record_id_carries_millis_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = RunHistory::new(temp_dir.path());
        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[("common", SubProjectStatus::Published)],
            ))
            .await
            .unwrap();

        let id = &history.records[0].id;
        let millis = id.split('-').next().unwrap();
        assert!(millis.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_initialize_sets_aside_corrupt_history() {
        let temp_dir = TempDir::new().unwrap();
        let history_dir = temp_dir.path().join(".release-dispatcher");
        std::fs::create_dir_all(&history_dir).unwrap();
        std::fs::write(history_dir.join("history.json"), "not valid json {").unwrap();

        let mut history = RunHistory::new(temp_dir.path());
        history.initialize().await.unwrap();
        assert!(history.records.is_empty());

        // The unreadable file is preserved, and new runs do not clobber it
        let backup = history_dir.join("history.json.corrupt");
        assert!(backup.exists());

        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[("common", SubProjectStatus::Published)],
            ))
            .await
            .unwrap();
        assert!(backup.exists());
        assert_eq!(
            std::fs::read_to_string(&backup).unwrap(),
            "not valid json {"
        );
    }

    #[tokio::test]
    async fn test_initialize_without_history_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();

        let mut history = RunHistory::new(temp_dir.path());
        history.initialize().await.unwrap();

        assert!(history.records.is_empty());
        // No corrupt marker appears when there was simply nothing to load
        assert!(!temp_dir
            .path()
            .join(".release-dispatcher/history.json.corrupt")
            .exists());
    }

    #[tokio::test]
    async fn test_filter_by_result() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = RunHistory::new(temp_dir.path());
        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[("common", SubProjectStatus::Published)],
            ))
            .await
            .unwrap();
        history
            .record_run(&sample_report(
                Trigger::Scheduled,
                &[("common", SubProjectStatus::Failed)],
            ))
            .await
            .unwrap();

        let successes = history.get_records(&HistoryOptions {
            success_only: true,
            ..HistoryOptions::default()
        });
        assert_eq!(successes.len(), 1);
        assert!(successes[0].success);

        let failures = history.get_records(&HistoryOptions {
            failures_only: true,
            ..HistoryOptions::default()
        });
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].exit_code, 1);
    }

    #[tokio::test]
    async fn test_filter_by_trigger_and_subproject() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = RunHistory::new(temp_dir.path());
        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[("common", SubProjectStatus::Published)],
            ))
            .await
            .unwrap();
        history
            .record_run(&sample_report(
                Trigger::Scheduled,
                &[("tabular", SubProjectStatus::Published)],
            ))
            .await
            .unwrap();

        let scheduled = history.get_records(&HistoryOptions {
            trigger: Some(Trigger::Scheduled),
            ..HistoryOptions::default()
        });
        assert_eq!(scheduled.len(), 1);

        let tabular_runs = history.get_records(&HistoryOptions {
            subproject: Some("tabular".to_string()),
            ..HistoryOptions::default()
        });
        assert_eq!(tabular_runs.len(), 1);
        assert_eq!(tabular_runs[0].trigger, Trigger::Scheduled);
    }

    #[tokio::test]
    async fn test_filter_by_days() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = RunHistory::new(temp_dir.path());
        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[("common", SubProjectStatus::Published)],
            ))
            .await
            .unwrap();
        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[("common", SubProjectStatus::Published)],
            ))
            .await
            .unwrap();
        history.records[0].started_at = Utc::now() - Duration::days(30);

        let recent = history.get_records(&HistoryOptions {
            days: Some(7),
            ..HistoryOptions::default()
        });
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_limit_returns_most_recent_first() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = RunHistory::new(temp_dir.path());
        for _ in 0..3 {
            history
                .record_run(&sample_report(
                    Trigger::Manual,
                    &[("common", SubProjectStatus::Published)],
                ))
                .await
                .unwrap();
        }
        history.records[0].started_at = Utc::now() - Duration::days(2);
        history.records[1].started_at = Utc::now() - Duration::days(1);

        let limited = history.get_records(&HistoryOptions {
            limit: Some(2),
            ..HistoryOptions::default()
        });
        assert_eq!(limited.len(), 2);
        assert!(limited[0].started_at > limited[1].started_at);
    }

    #[tokio::test]
    async fn test_statistics() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = RunHistory::new(temp_dir.path());
        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[
                    ("common", SubProjectStatus::Published),
                    ("core", SubProjectStatus::Published),
                ],
            ))
            .await
            .unwrap();
        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[
                    ("common", SubProjectStatus::Failed),
                    ("core", SubProjectStatus::Skipped),
                ],
            ))
            .await
            .unwrap();

        let stats = history.get_statistics(&HistoryOptions::default());

        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.success_rate, 50.0);

        let common = stats.by_subproject.get("common").unwrap();
        assert_eq!(common.attempts, 2);
        assert_eq!(common.published, 1);
        assert_eq!(common.failed, 1);

        let core = stats.by_subproject.get("core").unwrap();
        assert_eq!(core.attempts, 1);
        assert_eq!(core.skipped, 1);
        assert_eq!(core.success_rate, 100.0);
    }

    #[tokio::test]
    async fn test_empty_statistics() {
        let history = RunHistory::new(".");
        let stats = history.get_statistics(&HistoryOptions::default());

        assert_eq!(stats.total_runs, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_markdown_report() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = RunHistory::new(temp_dir.path());
        history
            .record_run(&sample_report(
                Trigger::Scheduled,
                &[("common", SubProjectStatus::Published)],
            ))
            .await
            .unwrap();

        let markdown = history.generate_markdown(&HistoryOptions::default());

        assert!(markdown.contains("# Dispatch History Report"));
        assert!(markdown.contains("**Total Runs**: 1"));
        assert!(markdown.contains("| common |"));
        assert!(markdown.contains("scheduled"));
    }

    #[tokio::test]
    async fn test_clear_data() {
        let temp_dir = TempDir::new().unwrap();
        let mut history = RunHistory::new(temp_dir.path());
        history
            .record_run(&sample_report(
                Trigger::Manual,
                &[("common", SubProjectStatus::Published)],
            ))
            .await
            .unwrap();

        history.clear_data().await.unwrap();

        let mut reloaded = RunHistory::new(temp_dir.path());
        reloaded.initialize().await.unwrap();
        assert_eq!(reloaded.records.len(), 0);
    }
}
