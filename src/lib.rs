//! agent-chain
//!
//! リモートのエージェント（Lambda 等の HTTP エンドポイント）を宣言順に
//! 1つずつ呼び出し、各ステップの状態を観測可能にするライブラリです。
//!
//! - [`config`]: TOML によるワークフロー定義
//! - [`engine`]: ステップランナー・オーケストレーター・ステータスプロジェクター
//! - [`invoker`]: リモート呼び出しの抽象化と HTTP 実装
//! - [`transfer`]: 署名付き URL によるドキュメントのアップロード/ダウンロード
//! - [`telemetry`]: ログ出力の初期化
//! - [`error`]: エラー型

pub mod config;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod telemetry;
pub mod transfer;
