//! ステータスプロジェクター
//!
//! [`StepState`] から表示用のラベルと詳細を導出する純粋関数群です。
//! 他のステップの状態は参照しません。

use std::fmt;

use serde::Serialize;

use super::state::{StepState, StepStatus};

/// 表示用ステータスラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLabel {
    Waiting,
    Running,
    Success,
    Failed,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::Waiting => "waiting",
            StatusLabel::Running => "running",
            StatusLabel::Success => "success",
            StatusLabel::Failed => "failed",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 詳細ポップオーバーの内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDetail {
    /// 未到達（表示する内容なし）
    Empty,

    /// 実行中の待機メッセージ
    Waiting {
        /// 経過秒数
        elapsed_seconds: u64,
    },

    /// 成功時の生ペイロード（整形済み JSON）
    Payload(String),

    /// 失敗時のエラーメッセージ
    Error(String),
}

impl fmt::Display for StepDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepDetail::Empty => Ok(()),
            StepDetail::Waiting { elapsed_seconds } => write!(f, "waiting {}s", elapsed_seconds),
            StepDetail::Payload(payload) => f.write_str(payload),
            StepDetail::Error(error) => f.write_str(error),
        }
    }
}

/// 状態をラベルに写像する
pub fn project(state: &StepState) -> StatusLabel {
    match state.status() {
        StepStatus::Idle => StatusLabel::Waiting,
        StepStatus::Running => StatusLabel::Running,
        StepStatus::Succeeded => StatusLabel::Success,
        StepStatus::Failed => StatusLabel::Failed,
    }
}

/// 状態から詳細表示を導出する
pub fn detail(state: &StepState) -> StepDetail {
    match state.status() {
        StepStatus::Idle => StepDetail::Empty,
        StepStatus::Running => StepDetail::Waiting {
            elapsed_seconds: state.elapsed_seconds(),
        },
        StepStatus::Succeeded => StepDetail::Payload(
            state
                .result()
                .and_then(|payload| serde_json::to_string_pretty(payload).ok())
                .unwrap_or_else(|| "null".to_string()),
        ),
        StepStatus::Failed => StepDetail::Error(state.error().unwrap_or_default().to_string()),
    }
}
