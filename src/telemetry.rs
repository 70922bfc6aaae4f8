//! ログ出力の初期化
//!
//! `tracing-subscriber` の fmt レイヤーをテキストまたは JSON 形式で設定します。
//! ディレクトリを指定した場合は `tracing-appender` による日次ローテーションの
//! ファイルへ非同期に書き出し、指定しない場合は標準エラー出力へ書き出します
//! （標準出力は実行結果の表示に使うため）。

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::error::TelemetryError;

const LOG_FILE_PREFIX: &str = "agent-chain.log";

/// ログの出力形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub format: LogFormat,
    pub level: Level,
    /// 指定した場合はこのディレクトリのファイルに出力
    pub directory: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: Level::WARN,
            directory: None,
        }
    }
}

/// グローバルなサブスクライバーを設定する
///
/// ファイル出力の場合は [`WorkerGuard`] を返します。プロセス終了まで保持しないと
/// バッファ済みのログが失われます。
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>, TelemetryError> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(options.level)
        .with_target(false);

    match &options.directory {
        None => {
            let result = match options.format {
                LogFormat::Text => builder.with_writer(std::io::stderr).try_init(),
                LogFormat::Json => builder.json().with_writer(std::io::stderr).try_init(),
            };
            result.map_err(|e| TelemetryError::Init(e.to_string()))?;
            Ok(None)
        }
        Some(directory) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .build(directory)
                .map_err(|e| TelemetryError::LogFile(e.to_string()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let result = match options.format {
                LogFormat::Text => builder.with_ansi(false).with_writer(writer).try_init(),
                LogFormat::Json => builder.json().with_writer(writer).try_init(),
            };
            result.map_err(|e| TelemetryError::Init(e.to_string()))?;
            Ok(Some(guard))
        }
    }
}
