//! ワークフロー定義（TOML）
//!
//! - [`workflow`]: ワークフロー全体とクライアント設定
//! - [`step`]: 各ステップの定義
//! - `dto`: TOML 入出力用の内部表現

mod dto;
pub mod step;
pub mod workflow;

pub use step::{HttpMethod, WorkflowStep};
pub use workflow::{ClientSettings, Workflow};
