//! ワークフロー実行エンジン
//!
//! # 責務
//!
//! - ステップを宣言順に1つずつ実行し、成功したら次へ、失敗したら停止
//! - ステップごとの状態（待機/実行中/成功/失敗、経過秒数、応答・エラー）を公開
//! - 再開始時に古い実行からの結果を破棄
//!
//! # モジュール構成
//!
//! - [`descriptor`][]: ステップの静的メタデータ
//! - [`context`][]: リクエスト生成用の変数とプレースホルダー展開
//! - [`state`][]: ステップ状態とスナップショット
//! - [`runner`][]: 1ステップ分の実行
//! - [`orchestrator`][]: ステップ列の逐次実行
//! - [`projector`][]: 表示用ステータスへの写像
//!
//! # 使用例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agent_chain::config::Workflow;
//! use agent_chain::engine::{WorkflowOrchestrator, project};
//! use agent_chain::invoker::HttpInvoker;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let workflow = Workflow::from_file("workflows/credit-assessment.toml")?;
//!     let invoker = Arc::new(HttpInvoker::from_settings(workflow.client()));
//!     let orchestrator = WorkflowOrchestrator::new(&workflow, invoker);
//!
//!     let outcome = orchestrator.start().wait().await;
//!     println!("Outcome: {:?}", outcome);
//!
//!     for step in orchestrator.snapshot().steps {
//!         println!("  {}: {}", step.name, project(&step.state));
//!     }
//!
//!     Ok(())
//! }
//! ```

mod board;
pub mod context;
pub mod descriptor;
pub mod orchestrator;
pub mod projector;
pub mod runner;
pub mod state;

// 公開APIの再エクスポート
pub use board::StepSlot;
pub use context::InvocationContext;
pub use descriptor::{StepDescriptor, descriptors};
pub use orchestrator::{RunHandle, WorkflowOrchestrator};
pub use projector::{StatusLabel, StepDetail, detail, project};
pub use runner::{StepOutcome, StepRunner};
pub use state::{RunOutcome, RunPhase, StepSnapshot, StepState, StepStatus, WorkflowSnapshot};
