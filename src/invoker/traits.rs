//! ステップ呼び出しの共通インターフェース定義
//!
//! # 責務
//!
//! - リモート呼び出しの共通トレイト [`StepInvoker`] を定義
//! - 呼び出し内容を表す [`StepRequest`] を提供
//!
//! 実行エンジンはこのトレイトだけに依存するため、テストではモック実装に
//! 差し替えられます。

use async_trait::async_trait;
use serde_json::Value;

use crate::config::step::HttpMethod;
use crate::error::InvokeError;

/// リモート呼び出しの共通インターフェース
///
/// # 実装要件
///
/// - `Send + Sync`: ドライバータスク間で共有される
/// - 1回の `invoke` につき外部呼び出しは1回だけ行い、リトライしない
#[async_trait]
pub trait StepInvoker: Send + Sync {
    /// リクエストを送信し、JSON レスポンスを返す
    ///
    /// # エラー
    ///
    /// - [`InvokeError::Network`] - 接続できない
    /// - [`InvokeError::Http`] - 2xx 以外のステータス
    /// - [`InvokeError::Parse`] - ボディが JSON ではない
    async fn invoke(&self, request: &StepRequest) -> Result<Value, InvokeError>;
}

/// 1ステップ分のリクエスト
///
/// [`StepDescriptor::build_request`](crate::engine::StepDescriptor::build_request)
/// によって、プレースホルダー展開済みの状態で生成されます。
#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    /// HTTP メソッド
    pub method: HttpMethod,

    /// 呼び出し先 URL
    pub url: String,

    /// JSON ボディ（POST のみ）
    pub body: Option<Value>,
}
