//! ステップ状態と実行スナップショットの型定義
//!
//! # 責務
//!
//! - ステップごとの状態 [`StepState`] と [`StepStatus`] の型定義
//! - ワークフロー実行の進行フェーズ [`RunPhase`] と最終結果 [`RunOutcome`] の型定義
//! - 表示用の読み取り専用スナップショット [`WorkflowSnapshot`] の型定義
//!
//! # 不変条件
//!
//! | status | result | error | started_at | elapsed_seconds |
//! |--------|--------|-------|------------|-----------------|
//! | Idle | なし | なし | なし | 0 |
//! | Running | なし | なし | あり | 経過秒数 |
//! | Succeeded | あり | なし | なし | 0 |
//! | Failed | なし | あり | なし | 0 |
//!
//! コンストラクタ経由でのみ生成でき、デシリアライズ時にも同じ条件を検証します。

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ステップの実行ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// 未実行
    Idle,

    /// 実行中
    Running,

    /// 成功
    Succeeded,

    /// 失敗
    Failed,
}

/// 1ステップ分の状態
///
/// スロットを所有するステップランナーだけが更新します。
///
/// # 例
///
/// ```rust
/// use agent_chain::engine::state::{StepState, StepStatus};
/// use std::time::SystemTime;
///
/// let mut state = StepState::running(SystemTime::now());
/// state.tick();
/// assert_eq!(state.elapsed_seconds(), 1);
///
/// let state = StepState::failed("HTTP 500");
/// assert_eq!(state.status(), StepStatus::Failed);
/// assert_eq!(state.elapsed_seconds(), 0);
/// assert!(state.result().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStepState")]
pub struct StepState {
    status: StepStatus,
    started_at: Option<SystemTime>,
    elapsed_seconds: u64,
    result: Option<Value>,
    error: Option<String>,
}

impl StepState {
    pub fn idle() -> Self {
        Self {
            status: StepStatus::Idle,
            started_at: None,
            elapsed_seconds: 0,
            result: None,
            error: None,
        }
    }

    pub fn running(started_at: SystemTime) -> Self {
        Self {
            status: StepStatus::Running,
            started_at: Some(started_at),
            ..Self::idle()
        }
    }

    pub fn succeeded(result: Value) -> Self {
        Self {
            status: StepStatus::Succeeded,
            result: Some(result),
            ..Self::idle()
        }
    }

    /// 失敗状態を生成する
    ///
    /// メッセージが空の場合は汎用メッセージに置き換えます。
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "不明なエラー".to_string()
        } else {
            error
        };

        Self {
            status: StepStatus::Failed,
            error: Some(error),
            ..Self::idle()
        }
    }

    /// 経過秒数を1増やす（Running 以外では何もしない）
    pub fn tick(&mut self) {
        if self.status == StepStatus::Running {
            self.elapsed_seconds += 1;
        }
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Succeeded または Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StepStatus::Succeeded | StepStatus::Failed)
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Deserialize)]
struct RawStepState {
    status: StepStatus,
    #[serde(default)]
    started_at: Option<SystemTime>,
    #[serde(default)]
    elapsed_seconds: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl TryFrom<RawStepState> for StepState {
    type Error = String;

    fn try_from(raw: RawStepState) -> Result<Self, Self::Error> {
        let idle_like = |what: &str| -> Result<(), String> {
            if raw.started_at.is_some() || raw.elapsed_seconds != 0 {
                return Err(format!("{} のステップは開始時刻と経過秒数を持てません", what));
            }
            Ok(())
        };

        match raw.status {
            StepStatus::Idle => {
                idle_like("idle")?;
                if raw.result.is_some() || raw.error.is_some() {
                    return Err("idle のステップは result / error を持てません".to_string());
                }
                Ok(StepState::idle())
            }
            StepStatus::Running => {
                let started_at = raw
                    .started_at
                    .ok_or_else(|| "running のステップには started_at が必要です".to_string())?;
                if raw.result.is_some() || raw.error.is_some() {
                    return Err("running のステップは result / error を持てません".to_string());
                }
                Ok(StepState {
                    elapsed_seconds: raw.elapsed_seconds,
                    ..StepState::running(started_at)
                })
            }
            StepStatus::Succeeded => {
                idle_like("succeeded")?;
                if raw.error.is_some() {
                    return Err("succeeded のステップは error を持てません".to_string());
                }
                // JSON の null ペイロードは Option では None として読まれる
                Ok(StepState::succeeded(raw.result.unwrap_or(Value::Null)))
            }
            StepStatus::Failed => {
                idle_like("failed")?;
                if raw.result.is_some() {
                    return Err("failed のステップは result を持てません".to_string());
                }
                let error = raw
                    .error
                    .ok_or_else(|| "failed のステップには error が必要です".to_string())?;
                Ok(StepState::failed(error))
            }
        }
    }
}

/// ワークフロー実行の進行フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    /// まだ一度も開始されていない
    NotStarted,

    /// `index` のステップを実行中
    Running {
        /// 実行中のステップ位置
        index: usize,
    },

    /// 最後のステップまで成功
    Completed,

    /// `index` のステップが失敗して停止
    Halted {
        /// 失敗したステップ位置
        index: usize,
    },
}

impl RunPhase {
    /// 現在（または最後に）対象となったステップ位置
    pub fn current_index(&self) -> Option<usize> {
        match self {
            RunPhase::Running { index } | RunPhase::Halted { index } => Some(*index),
            RunPhase::NotStarted | RunPhase::Completed => None,
        }
    }
}

/// 1回の実行の最終結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// 全ステップが成功
    Completed,

    /// `index` のステップが失敗して停止
    Halted {
        /// 失敗したステップ位置
        index: usize,
    },

    /// 新しい実行に置き換えられた
    Superseded,
}

/// ステップ1件分のスナップショット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// ステップ位置（0始まり）
    pub index: usize,

    /// ステップ名
    pub name: String,

    /// 状態
    pub state: StepState,
}

/// ワークフロー実行全体のスナップショット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// ワークフロー名
    pub workflow_name: String,

    /// 実行世代（`start` のたびに増加）
    pub generation: u64,

    /// 進行フェーズ
    pub phase: RunPhase,

    /// 各ステップの状態
    pub steps: Vec<StepSnapshot>,
}

impl WorkflowSnapshot {
    /// 結果をJSON形式でシリアライズ
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.phase.current_index()
    }

    /// 成功したステップ数
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.state.status() == StepStatus::Succeeded)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn roundtrip(state: &StepState) -> StepState {
        let json = serde_json::to_string(state).expect("JSON変換に失敗");
        serde_json::from_str(&json).expect("JSON復元に失敗")
    }

    #[test]
    fn test_constructors_respect_exclusivity() {
        let idle = StepState::idle();
        assert!(idle.result().is_none() && idle.error().is_none());

        let ok = StepState::succeeded(json!({ "ok": true }));
        assert!(ok.result().is_some() && ok.error().is_none());

        let failed = StepState::failed("boom");
        assert!(failed.result().is_none());
        assert_eq!(failed.error(), Some("boom"));
    }

    #[test]
    fn test_failed_empty_message_replaced() {
        let failed = StepState::failed("   ");
        assert_eq!(failed.error(), Some("不明なエラー"));
    }

    #[test]
    fn test_tick_only_while_running() {
        let mut idle = StepState::idle();
        idle.tick();
        assert_eq!(idle.elapsed_seconds(), 0);

        let mut running = StepState::running(SystemTime::now());
        running.tick();
        running.tick();
        assert_eq!(running.elapsed_seconds(), 2);

        let mut done = StepState::succeeded(json!(1));
        done.tick();
        assert_eq!(done.elapsed_seconds(), 0);
    }

    #[test]
    fn test_is_terminal() {
        assert!(!StepState::idle().is_terminal());
        assert!(!StepState::running(SystemTime::now()).is_terminal());
        assert!(StepState::succeeded(json!({})).is_terminal());
        assert!(StepState::failed("x").is_terminal());
    }

    #[test]
    fn test_roundtrip_preserves_state() {
        let started_at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut running = StepState::running(started_at);
        running.tick();
        running.tick();
        running.tick();

        for state in [
            StepState::idle(),
            running,
            StepState::succeeded(json!({ "ok": true, "items": [1, 2] })),
            StepState::succeeded(Value::Null),
            StepState::failed("HTTP エラー: ステータス 500"),
        ] {
            let restored = roundtrip(&state);
            assert_eq!(restored, state);
            assert_eq!(restored.status(), state.status());
            assert_eq!(restored.elapsed_seconds(), state.elapsed_seconds());
            assert_eq!(restored.result().is_some(), state.result().is_some());
            assert_eq!(restored.error().is_some(), state.error().is_some());
        }
    }

    #[test]
    fn test_serialized_form_is_flat() {
        let json = serde_json::to_value(StepState::failed("x")).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "x");
        assert_eq!(json["elapsed_seconds"], 0);
        assert!(json["result"].is_null());
    }

    #[test]
    fn test_deserialize_rejects_both_result_and_error() {
        let raw = r#"{"status":"succeeded","result":{"a":1},"error":"x"}"#;
        assert!(serde_json::from_str::<StepState>(raw).is_err());

        let raw = r#"{"status":"failed","result":{"a":1},"error":"x"}"#;
        assert!(serde_json::from_str::<StepState>(raw).is_err());
    }

    #[test]
    fn test_deserialize_rejects_missing_fields() {
        assert!(serde_json::from_str::<StepState>(r#"{"status":"failed"}"#).is_err());
        assert!(serde_json::from_str::<StepState>(r#"{"status":"running"}"#).is_err());
        assert!(
            serde_json::from_str::<StepState>(r#"{"status":"idle","elapsed_seconds":3}"#).is_err()
        );
    }

    #[test]
    fn test_deserialize_minimal_idle() {
        let state: StepState = serde_json::from_str(r#"{"status":"idle"}"#).unwrap();
        assert_eq!(state, StepState::idle());
    }

    #[test]
    fn test_run_phase_current_index() {
        assert_eq!(RunPhase::NotStarted.current_index(), None);
        assert_eq!(RunPhase::Running { index: 2 }.current_index(), Some(2));
        assert_eq!(RunPhase::Halted { index: 1 }.current_index(), Some(1));
        assert_eq!(RunPhase::Completed.current_index(), None);
    }

    #[test]
    fn test_snapshot_to_json() {
        let snapshot = WorkflowSnapshot {
            workflow_name: "credit".to_string(),
            generation: 2,
            phase: RunPhase::Halted { index: 1 },
            steps: vec![
                StepSnapshot {
                    index: 0,
                    name: "Document Extractor".to_string(),
                    state: StepState::succeeded(json!({ "ok": true })),
                },
                StepSnapshot {
                    index: 1,
                    name: "Information Checking".to_string(),
                    state: StepState::failed("HTTP 500"),
                },
            ],
        };

        assert_eq!(snapshot.completed_steps(), 1);
        assert_eq!(snapshot.current_index(), Some(1));

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"phase\": \"halted\""));
        assert!(json.contains("Information Checking"));

        let restored: WorkflowSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
    }
}
