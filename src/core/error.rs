//! Error handling for release dispatching
//!
//! This module provides the error taxonomy for dispatch runs with recovery
//! guidance, using the thiserror crate for ergonomic error handling.

use thiserror::Error;

/// Main error type for dispatch operations
#[derive(Error, Debug)]
pub enum DispatchError {
    // Roster errors
    #[error("サブプロジェクトが1つも設定されていません")]
    RosterEmpty,

    #[error("[{subproject}] サブプロジェクト名が重複しています")]
    DuplicateSubProject { subproject: String },

    #[error("[{subproject}] 無効なサブプロジェクト名です")]
    InvalidSubProjectName { subproject: String },

    // Layout errors
    #[error("[{subproject}] サブプロジェクトのディレクトリが見つかりません")]
    DirectoryMissing { subproject: String },

    #[error("[{subproject}] setup.py / pyproject.toml が見つかりません")]
    ManifestMissing { subproject: String },

    // Credential errors
    #[error("認証情報の環境変数 {variable} が設定されていません")]
    CredentialsMissing { variable: String },

    #[error("[{subproject}] 認証に失敗しました")]
    AuthenticationFailed { subproject: String },

    // Build errors
    #[error("[{subproject}] ビルドに失敗しました: {message}")]
    BuildFailed {
        subproject: String,
        message: String,
        exit_code: Option<i32>,
    },

    #[error("[{subproject}] ビルド成果物が見つかりません")]
    NoArtifacts { subproject: String },

    // Upload errors
    #[error("[{subproject}] アップロードに失敗しました: {message}")]
    UploadFailed {
        subproject: String,
        message: String,
        exit_code: Option<i32>,
    },

    #[error("[{subproject}] 同じバージョンが既に公開されています")]
    VersionConflict { subproject: String },

    // Network errors
    #[error("[{subproject}] ネットワークエラーが発生しました: {message}")]
    NetworkError { subproject: String, message: String },

    #[error("[{subproject}] タイムアウトしました")]
    TimeoutError { subproject: String },

    // Verification errors
    #[error("[{subproject}] 公開の検証に失敗しました")]
    VerificationFailed { subproject: String },

    // Schedule errors
    #[error("無効なスケジュール時刻です: {value}")]
    InvalidScheduleTime { value: String },

    // Configuration errors
    #[error("設定エラー: {message}")]
    ConfigError { message: String },

    // Command execution errors
    #[error("[{subproject}] コマンド実行エラー: {message}")]
    CommandError { subproject: String, message: String },
}

impl DispatchError {
    /// Get the sub-project name associated with this error, if any
    pub fn subproject(&self) -> Option<&str> {
        match self {
            Self::DuplicateSubProject { subproject }
            | Self::InvalidSubProjectName { subproject }
            | Self::DirectoryMissing { subproject }
            | Self::ManifestMissing { subproject }
            | Self::AuthenticationFailed { subproject }
            | Self::BuildFailed { subproject, .. }
            | Self::NoArtifacts { subproject }
            | Self::UploadFailed { subproject, .. }
            | Self::VersionConflict { subproject }
            | Self::NetworkError { subproject, .. }
            | Self::TimeoutError { subproject }
            | Self::VerificationFailed { subproject }
            | Self::CommandError { subproject, .. } => Some(subproject),
            Self::RosterEmpty
            | Self::CredentialsMissing { .. }
            | Self::InvalidScheduleTime { .. }
            | Self::ConfigError { .. } => None,
        }
    }

    /// Get the exit code of the failed external invocation, if one was produced
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::BuildFailed { exit_code, .. } | Self::UploadFailed { exit_code, .. } => {
                *exit_code
            }
            _ => None,
        }
    }

    /// Check if this error is recoverable by retrying the run
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::RosterEmpty
                | Self::DuplicateSubProject { .. }
                | Self::InvalidSubProjectName { .. }
                | Self::DirectoryMissing { .. }
                | Self::ManifestMissing { .. }
                | Self::InvalidScheduleTime { .. }
                | Self::ConfigError { .. }
        )
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::RosterEmpty => vec![
                "設定ファイルの subprojects にサブプロジェクトを追加してください",
                "release-dispatcher init で設定ファイルを生成できます",
            ],
            Self::DuplicateSubProject { .. } => vec![
                "subprojects から重複した名前を削除してください",
                "公開順序を確認してください",
            ],
            Self::InvalidSubProjectName { .. } => {
                vec!["名前には英数字・ハイフン・アンダースコアのみ使用できます"]
            }
            Self::DirectoryMissing { .. } => vec![
                "プロジェクトルートの指定を確認してください",
                "サブプロジェクトのディレクトリが存在するか確認してください",
            ],
            Self::ManifestMissing { .. } => {
                vec!["setup.py または pyproject.toml を配置してください"]
            }
            Self::CredentialsMissing { .. } => {
                vec!["環境変数を設定してください（TWINE_USERNAME / TWINE_PASSWORD）"]
            }
            Self::AuthenticationFailed { .. } => vec![
                "認証情報を確認してください",
                "環境変数が正しく設定されているか確認してください",
                "トークンの有効期限を確認してください",
            ],
            Self::BuildFailed { .. } => vec![
                "ビルドログを確認してください",
                "Python環境に setuptools / wheel / build がインストールされているか確認してください",
            ],
            Self::NoArtifacts { .. } => vec![
                "dist/ ディレクトリが生成されているか確認してください",
                "setup.py / pyproject.toml の設定を確認してください",
            ],
            Self::UploadFailed { .. } => vec![
                "エラーメッセージを確認してください",
                "ネットワーク接続を確認してください",
                "パッケージインデックスのステータスを確認してください",
            ],
            Self::VersionConflict { .. } => vec![
                "バージョン番号を更新してください",
                "同じバージョンの再アップロードはできません",
            ],
            Self::NetworkError { .. } => vec![
                "インターネット接続を確認してください",
                "しばらく待ってから再試行してください",
            ],
            Self::TimeoutError { .. } => vec![
                "ネットワーク環境を確認してください",
                "dispatch.buildTimeout / dispatch.uploadTimeout で時間を延長できます",
            ],
            Self::VerificationFailed { .. } => vec![
                "パッケージインデックスのWebサイトで手動確認してください",
                "しばらく待ってから再試行してください（反映に時間がかかる場合があります）",
            ],
            Self::InvalidScheduleTime { .. } => {
                vec!["HH:MM 形式（例: 07:59）のUTC時刻で指定してください"]
            }
            Self::ConfigError { .. } => vec![
                "設定ファイルの構文を確認してください",
                "release-dispatcher check で設定を検証できます",
            ],
            Self::CommandError { .. } => vec![
                "コマンドの出力を確認してください",
                "python / twine がインストールされているか確認してください",
            ],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::RosterEmpty => "ROSTER_EMPTY",
            Self::DuplicateSubProject { .. } => "DUPLICATE_SUBPROJECT",
            Self::InvalidSubProjectName { .. } => "INVALID_SUBPROJECT_NAME",
            Self::DirectoryMissing { .. } => "DIRECTORY_MISSING",
            Self::ManifestMissing { .. } => "MANIFEST_MISSING",
            Self::CredentialsMissing { .. } => "CREDENTIALS_MISSING",
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::BuildFailed { .. } => "BUILD_FAILED",
            Self::NoArtifacts { .. } => "NO_ARTIFACTS",
            Self::UploadFailed { .. } => "UPLOAD_FAILED",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::NetworkError { .. } => "NETWORK_ERROR",
            Self::TimeoutError { .. } => "TIMEOUT_ERROR",
            Self::VerificationFailed { .. } => "VERIFICATION_FAILED",
            Self::InvalidScheduleTime { .. } => "INVALID_SCHEDULE_TIME",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::CommandError { .. } => "COMMAND_ERROR",
        }
    }
}
