//! ワークフローステップの定義
//!
//! # 責務
//!
//! Workflowを構成するStepの定義体を提供するモジュール
//! アプリケーションに対して、[WorkflowStep] を提供する。

use std::fmt;

use serde::{Deserialize, Serialize};

use super::dto::WorkflowStepDto;
use crate::error::ConfigError;

/// ワークフローステップ（ドメインモデル）
///
/// パイプライン内の1つのリモート呼び出しを表します。
///
/// ## DTO との違い
///
/// - [`WorkflowStepDto`](super::dto::WorkflowStepDto): TOML デシリアライズ専用
/// - [`WorkflowStep`]: バリデーション済み、ドメインロジックを持つ
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    name: String,
    url: String,
    method: HttpMethod,
    timeout: Option<u64>,
    body: Option<toml::Table>,
}

impl WorkflowStep {
    /// ステップ名（表示用ラベル）
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 呼び出し先 URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP メソッド
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// ステップ固有のタイムアウト（秒）
    ///
    /// 未設定の場合はクライアント設定のタイムアウトが使われます。
    pub fn timeout(&self) -> Option<u64> {
        self.timeout
    }

    /// リクエストボディのテンプレートを JSON に変換して返す
    pub fn body_json(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .map(|table| toml_to_json(&toml::Value::Table(table.clone())))
    }
}

/// HTTP メソッド
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// GET（ボディなし）
    Get,
    /// POST（JSON ボディ）
    #[default]
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::from(*i),
        // NaN / inf は JSON で表現できないため null になる
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .iter()
                .map(|(key, value)| (key.clone(), toml_to_json(value)))
                .collect(),
        ),
    }
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// バリデーションを実施し、不正なデータの場合は [`ConfigError::Validation`] を返します。
impl TryFrom<WorkflowStepDto> for WorkflowStep {
    type Error = ConfigError;

    fn try_from(dto: WorkflowStepDto) -> Result<Self, Self::Error> {
        let name = dto.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::Validation("ステップ名が空です".to_string()));
        }

        let url = reqwest::Url::parse(&dto.url).map_err(|e| {
            ConfigError::Validation(format!(
                "ステップ '{}' の URL が不正です: {} ({})",
                name, dto.url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "ステップ '{}' の URL スキームは http または https である必要があります: {}",
                name,
                url.scheme()
            )));
        }

        if dto.method == HttpMethod::Get && dto.body.is_some() {
            return Err(ConfigError::Validation(format!(
                "ステップ '{}' は GET のためボディを指定できません",
                name
            )));
        }

        if dto.timeout == Some(0) {
            return Err(ConfigError::Validation(format!(
                "ステップ '{}' のタイムアウトは1秒以上である必要があります",
                name
            )));
        }

        Ok(WorkflowStep {
            name,
            url: dto.url,
            method: dto.method,
            timeout: dto.timeout,
            body: dto.body,
        })
    }
}

/// ドメインモデルから DTO への変換（書き込み方向）
///
/// バリデーション済みのドメインモデルから DTO を生成するため、
/// この変換は失敗しません（`From` トレイトを使用）。
impl From<WorkflowStep> for WorkflowStepDto {
    fn from(step: WorkflowStep) -> Self {
        WorkflowStepDto {
            name: step.name,
            url: step.url,
            method: step.method,
            timeout: step.timeout,
            body: step.body,
        }
    }
}
