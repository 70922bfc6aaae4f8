//! Workflow 定義の読み込みと管理を行うモジュール
//!
//! # 責務
//!
//! このモジュールは、リモートエージェントを順番に呼び出すパイプラインを
//! TOML 形式で定義し、それを Rust の型として扱うための機能を提供します。
//!
//! ## 主な機能
//!
//! - **TOML パース**: `workflows/` ディレクトリ内の TOML ファイルを読み込み、
//!   [`Workflow`] 構造体にデシリアライズ
//! - **ワークフロー定義**: 抽出→確認→分析→評価 のようなエージェント連鎖を
//!   ステップの配列として表現
//! - **クライアント設定**: タイムアウトと認証トークンの取得元
//! - **コンテキスト変数**: リクエストボディの `{name}` プレースホルダーに埋め込む値
//!
//! ## 使用例
//!
//! ```toml
//! [workflow]
//! name = "credit-assessment"
//! description = "与信審査ワークフロー"
//!
//! [context]
//! bucket = "reports"
//! prefix = "incoming/"
//!
//! [[steps]]
//! name = "Document Extractor"
//! url = "https://example.com/extract"
//! body = { bucket = "{bucket}", prefix = "{prefix}" }
//!
//! [[steps]]
//! name = "Risk Evaluator"
//! url = "https://example.com/risk"
//! method = "get"
//! ```
//!
//! ## 関連モジュール
//!
//! - [`crate::config::step`]: 各ステップの定義
//! - [`crate::engine::orchestrator`]: ワークフローの実行エンジン

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::dto::{ClientDto, WorkflowDto, WorkflowMetadataDto};
use super::step::WorkflowStep;
use crate::engine::context::placeholders;
use crate::error::ConfigError;

/// ワークフロー定義（ドメインモデル）
///
/// バリデーション済みの状態を保証します。
///
/// ## DTO との違い
///
/// - [`WorkflowDto`]: TOML デシリアライズ専用、バリデーション前の生データ
/// - [`Workflow`]: バリデーション済み、ドメインロジックを持つ
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    name: String,
    description: Option<String>,
    version: Option<String>,
    client: ClientSettings,
    context: BTreeMap<String, String>,
    steps: Vec<WorkflowStep>,
}

/// HTTP クライアント設定
///
/// タイムアウトと認証はいずれも任意です。未設定の場合、リクエストは
/// タイムアウトなし・認証ヘッダーなしで送信されます。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSettings {
    /// 全ステップ共通のタイムアウト（秒）
    pub timeout_secs: Option<u64>,
    /// Bearer トークンを読み込む環境変数名
    pub auth_token_env: Option<String>,
}

impl ClientSettings {
    /// 環境変数から Bearer トークンを解決する
    ///
    /// `auth_token_env` が未設定、または環境変数が空の場合は `None` を返します。
    pub fn resolve_token(&self) -> Option<String> {
        self.auth_token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|token| !token.trim().is_empty())
    }
}

impl Workflow {
    /// TOML ファイルからワークフローを読み込む
    ///
    /// # 処理フロー
    ///
    /// 1. ファイル読み込み
    /// 2. TOML デシリアライズ → [`WorkflowDto`]
    /// 3. バリデーション & 変換 → [`Workflow`]
    ///
    /// # エラー
    ///
    /// ファイルの読み込み、パース、バリデーションのいずれかに失敗した場合
    /// [`ConfigError`] を返します。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// TOML 文字列からワークフローを読み込む
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let dto: WorkflowDto = toml::from_str(toml)?;
        Workflow::try_from(dto)
    }

    /// ワークフローを TOML 文字列に変換
    pub fn to_string(&self) -> Result<String, ConfigError> {
        let dto: WorkflowDto = self.clone().into();
        Ok(toml::to_string(&dto)?)
    }

    /// ワークフローを TOML ファイルに保存
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = self.to_string()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// コンテキスト変数を上書きした新しいワークフローを返す
    ///
    /// CLI の `--var key=value` 指定に使用します。上書き後もプレースホルダーの
    /// 整合性は保たれます（変数は追加・更新のみで削除されないため）。
    pub fn with_context_overrides<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.context.insert(key.into(), value.into());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn client(&self) -> &ClientSettings {
        &self.client
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// # 処理フロー
///
/// 1. 各フィールドのバリデーション
/// 2. ステップの変換（`WorkflowStepDto` → `WorkflowStep`）
/// 3. ステップ名の重複とプレースホルダーの参照先を検証
/// 4. `Workflow` の構築
impl TryFrom<WorkflowDto> for Workflow {
    type Error = ConfigError;

    fn try_from(dto: WorkflowDto) -> Result<Self, Self::Error> {
        let name = dto.workflow.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::Validation("ワークフロー名が空です".to_string()));
        }

        if dto.steps.is_empty() {
            return Err(ConfigError::Validation(format!(
                "ワークフロー '{}' にステップがありません",
                name
            )));
        }

        if dto.client.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "client.timeout_secs は1秒以上である必要があります".to_string(),
            ));
        }

        let steps = dto
            .steps
            .into_iter()
            .map(WorkflowStep::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name()) {
                return Err(ConfigError::Validation(format!(
                    "ステップ名が重複しています: {}",
                    step.name()
                )));
            }

            if let Some(body) = step.body_json() {
                let missing: Vec<String> = placeholders(&body)
                    .into_iter()
                    .filter(|var| !dto.context.contains_key(var))
                    .collect();
                if !missing.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "ステップ '{}' が未定義のコンテキスト変数を参照しています: {}",
                        step.name(),
                        missing.join(", ")
                    )));
                }
            }
        }

        Ok(Workflow {
            name,
            description: dto.workflow.description,
            version: dto.workflow.version,
            client: ClientSettings {
                timeout_secs: dto.client.timeout_secs,
                auth_token_env: dto.client.auth_token_env,
            },
            context: dto.context,
            steps,
        })
    }
}

/// ドメインモデルから DTO への変換（書き込み方向）
///
/// バリデーション済みのドメインモデルから DTO を生成するため、
/// この変換は失敗しません（`From` トレイトを使用）。
impl From<Workflow> for WorkflowDto {
    fn from(workflow: Workflow) -> Self {
        WorkflowDto {
            workflow: WorkflowMetadataDto {
                name: workflow.name,
                description: workflow.description,
                version: workflow.version,
            },
            client: ClientDto {
                timeout_secs: workflow.client.timeout_secs,
                auth_token_env: workflow.client.auth_token_env,
            },
            context: workflow.context,
            steps: workflow.steps.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::step::HttpMethod;

    const SAMPLE: &str = r#"
[workflow]
name = "credit-assessment"
description = "与信審査"
version = "1.0.0"

[client]
timeout_secs = 30
auth_token_env = "AGENT_CHAIN_TEST_TOKEN_UNSET"

[context]
bucket = "reports"
prefix = "incoming/"

[[steps]]
name = "Document Extractor"
url = "https://example.com/extract"
body = { bucket = "{bucket}", prefix = "{prefix}" }

[[steps]]
name = "Risk Evaluator"
url = "https://example.com/risk"
method = "get"
timeout = 90
"#;

    #[test]
    fn test_parse_sample() {
        let workflow = Workflow::from_toml(SAMPLE).unwrap();

        assert_eq!(workflow.name(), "credit-assessment");
        assert_eq!(workflow.description(), Some("与信審査"));
        assert_eq!(workflow.version(), Some("1.0.0"));
        assert_eq!(workflow.client().timeout_secs, Some(30));
        assert_eq!(workflow.context().get("bucket").map(String::as_str), Some("reports"));
        assert_eq!(workflow.steps().len(), 2);
        assert_eq!(workflow.steps()[0].method(), HttpMethod::Post);
        assert_eq!(workflow.steps()[1].method(), HttpMethod::Get);
        assert_eq!(workflow.steps()[1].timeout(), Some(90));
    }

    #[test]
    fn test_roundtrip() {
        let original = Workflow::from_toml(SAMPLE).unwrap();
        let text = original.to_string().unwrap();
        let restored = Workflow::from_toml(&text).unwrap();

        assert_eq!(original, restored);
    }

    #[test]
    fn test_minimal_workflow() {
        let workflow = Workflow::from_toml(
            "[workflow]\nname = \"w\"\n\n[[steps]]\nname = \"s\"\nurl = \"http://localhost/x\"\n",
        )
        .unwrap();

        assert_eq!(workflow.client(), &ClientSettings::default());
        assert!(workflow.context().is_empty());
        assert!(workflow.description().is_none());
    }

    #[test]
    fn test_no_steps_rejected() {
        let result = Workflow::from_toml("[workflow]\nname = \"w\"\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let toml = "[workflow]\nname = \"w\"\n\n\
                    [[steps]]\nname = \"a\"\nurl = \"http://localhost/1\"\n\n\
                    [[steps]]\nname = \"a\"\nurl = \"http://localhost/2\"\n";
        let err = Workflow::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("重複"));
    }

    #[test]
    fn test_undefined_placeholder_rejected() {
        let toml = "[workflow]\nname = \"w\"\n\n\
                    [[steps]]\nname = \"a\"\nurl = \"http://localhost/1\"\n\
                    body = { bucket = \"{bucket}\" }\n";
        let err = Workflow::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("bucket"));
    }

    #[test]
    fn test_zero_client_timeout_rejected() {
        let toml = "[workflow]\nname = \"w\"\n\n[client]\ntimeout_secs = 0\n\n\
                    [[steps]]\nname = \"a\"\nurl = \"http://localhost/1\"\n";
        assert!(matches!(
            Workflow::from_toml(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Workflow::from_toml("[workflow\nname ="),
            Err(ConfigError::TomlDeserialize(_))
        ));
    }

    #[test]
    fn test_context_overrides() {
        let workflow = Workflow::from_toml(SAMPLE)
            .unwrap()
            .with_context_overrides([("bucket", "other"), ("extra", "1")]);

        assert_eq!(workflow.context().get("bucket").map(String::as_str), Some("other"));
        assert_eq!(workflow.context().get("extra").map(String::as_str), Some("1"));
        assert_eq!(workflow.context().get("prefix").map(String::as_str), Some("incoming/"));
    }

    #[test]
    fn test_resolve_token_unset() {
        let workflow = Workflow::from_toml(SAMPLE).unwrap();
        assert!(workflow.client().resolve_token().is_none());
        assert!(ClientSettings::default().resolve_token().is_none());
    }

    #[test]
    fn test_file_roundtrip() {
        let workflow = Workflow::from_toml(SAMPLE).unwrap();
        let path = std::env::temp_dir().join(format!(
            "agent-chain-workflow-{}.toml",
            std::process::id()
        ));

        workflow.to_file(&path).unwrap();
        let restored = Workflow::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(workflow, restored);
    }
}
