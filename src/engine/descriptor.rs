//! ステップディスクリプター
//!
//! パイプライン構築時に確定する、1ステップ分の不変なメタデータです。
//! 位置（0始まり）、表示名、呼び出し先、リクエストボディのテンプレートを持ちます。

use std::time::Duration;

use serde_json::Value;

use super::context::InvocationContext;
use crate::config::step::{HttpMethod, WorkflowStep};
use crate::config::workflow::{ClientSettings, Workflow};
use crate::invoker::StepRequest;

/// 1ステップ分の静的メタデータ
#[derive(Debug, Clone, PartialEq)]
pub struct StepDescriptor {
    id: usize,
    name: String,
    method: HttpMethod,
    url: String,
    body: Option<Value>,
    timeout: Option<Duration>,
}

impl StepDescriptor {
    pub fn new(
        id: usize,
        name: impl Into<String>,
        method: HttpMethod,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            method,
            url: url.into(),
            body: None,
            timeout: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// ワークフロー定義のステップから生成する
    ///
    /// タイムアウトはステップ固有の値を優先し、なければクライアント設定の値を使います。
    pub fn from_step(id: usize, step: &WorkflowStep, client: &ClientSettings) -> Self {
        Self {
            id,
            name: step.name().to_string(),
            method: step.method(),
            url: step.url().to_string(),
            body: step.body_json(),
            timeout: step
                .timeout()
                .or(client.timeout_secs)
                .map(Duration::from_secs),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// コンテキストを適用してリクエストを組み立てる
    pub fn build_request(&self, context: &InvocationContext) -> StepRequest {
        StepRequest {
            method: self.method,
            url: self.url.clone(),
            body: self.body.as_ref().map(|template| context.render(template)),
        }
    }
}

/// ワークフロー定義の全ステップをディスクリプターに変換する
pub fn descriptors(workflow: &Workflow) -> Vec<StepDescriptor> {
    workflow
        .steps()
        .iter()
        .enumerate()
        .map(|(id, step)| StepDescriptor::from_step(id, step, workflow.client()))
        .collect()
}
