//! リモート呼び出しの抽象化レイヤー
//!
//! # 責務
//!
//! - ステップ1回分の外部呼び出しを統一的に扱うインターフェースを提供
//! - reqwest による HTTP 実装を提供
//!
//! # モジュール構成
//!
//! - `traits` - 共通インターフェース（[`StepInvoker`]トレイト、[`StepRequest`]）
//! - `http` - HTTP 実装（[`HttpInvoker`]）
//!
//! # 使用例
//!
//! ```rust,no_run
//! use agent_chain::config::HttpMethod;
//! use agent_chain::invoker::{HttpInvoker, StepInvoker, StepRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let invoker = HttpInvoker::new();
//!     let response = invoker
//!         .invoke(&StepRequest {
//!             method: HttpMethod::Post,
//!             url: "https://example.com/extract".to_string(),
//!             body: Some(serde_json::json!({ "bucket": "reports" })),
//!         })
//!         .await?;
//!
//!     println!("{}", response);
//!     Ok(())
//! }
//! ```

pub mod http;
pub mod traits;

// 公開APIの再エクスポート
pub use http::HttpInvoker;
pub use traits::{StepInvoker, StepRequest};
