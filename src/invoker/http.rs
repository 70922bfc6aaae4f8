//! reqwest による HTTP 呼び出し
//!
//! # 責務
//!
//! - [`StepInvoker`] の HTTP 実装 [`HttpInvoker`] を提供
//! - ステータスコードとボディから成功/失敗を分類 ([`classify_response`])
//!
//! # 成功判定
//!
//! | 条件 | 結果 |
//! |------|------|
//! | 接続失敗 | [`InvokeError::Network`] |
//! | ステータスが 200..=299 以外 | [`InvokeError::Http`] |
//! | ボディが JSON として解釈できない | [`InvokeError::Parse`] |
//! | 上記以外 | 解析済み JSON |

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;

use super::traits::{StepInvoker, StepRequest};
use crate::config::step::HttpMethod;
use crate::config::workflow::ClientSettings;
use crate::error::InvokeError;

/// エラーメッセージに含めるレスポンスボディの最大文字数
const MAX_ERROR_BODY_CHARS: usize = 512;

/// HTTP クライアント
///
/// タイムアウトはステップランナー側で適用するため、ここでは設定しません。
pub struct HttpInvoker {
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl HttpInvoker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            bearer_token: None,
        }
    }

    /// クライアント設定から生成する
    ///
    /// `auth_token_env` が指す環境変数にトークンがあれば、
    /// すべてのリクエストに `Authorization: Bearer` を付与します。
    pub fn from_settings(settings: &ClientSettings) -> Self {
        let invoker = Self::new();
        match settings.resolve_token() {
            Some(token) => invoker.with_bearer_token(token),
            None => invoker,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn has_bearer_token(&self) -> bool {
        self.bearer_token.is_some()
    }
}

impl Default for HttpInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepInvoker for HttpInvoker {
    async fn invoke(&self, request: &StepRequest) -> Result<Value, InvokeError> {
        debug!(method = %request.method, url = %request.url, "リクエスト送信");

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }

        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| InvokeError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| InvokeError::Network(e.to_string()))?;

        debug!(status, bytes = text.len(), "レスポンス受信");
        classify_response(status, &text)
    }
}

/// ステータスコードとボディから呼び出し結果を分類する
///
/// # 例
///
/// ```rust
/// use agent_chain::invoker::http::classify_response;
/// use agent_chain::error::InvokeError;
///
/// assert!(classify_response(200, r#"{"ok":true}"#).is_ok());
/// assert!(matches!(
///     classify_response(500, "boom"),
///     Err(InvokeError::Http { status: 500, .. })
/// ));
/// assert!(matches!(classify_response(200, "<html>"), Err(InvokeError::Parse(_))));
/// ```
pub fn classify_response(status: u16, body: &str) -> Result<Value, InvokeError> {
    if !(200..=299).contains(&status) {
        return Err(InvokeError::Http {
            status,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    serde_json::from_str(body).map_err(|e| InvokeError::Parse(e.to_string()))
}
