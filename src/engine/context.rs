//! リクエスト生成用のコンテキスト
//!
//! # 責務
//!
//! - ステップのリクエストボディに埋め込む変数（バケット名、プレフィックス等）を保持
//! - ボディテンプレート内の `{name}` プレースホルダーの抽出と展開
//!
//! # 使用例
//!
//! ```rust
//! use agent_chain::engine::context::InvocationContext;
//! use serde_json::json;
//!
//! let ctx = InvocationContext::new()
//!     .with_var("bucket", "reports")
//!     .with_var("prefix", "2024/");
//!
//! let body = ctx.render(&json!({ "bucket": "{bucket}", "prefix": "{prefix}q1" }));
//! assert_eq!(body, json!({ "bucket": "reports", "prefix": "2024/q1" }));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

/// リクエスト生成用の変数セット
///
/// 実行中に変更されることはなく、全ステップで共有されます。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    vars: BTreeMap<String, String>,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vars(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// JSON テンプレート内の文字列値に含まれるプレースホルダーを展開する
    ///
    /// 未定義の変数はそのまま残します。オブジェクトのキーは展開しません。
    pub fn render(&self, template: &Value) -> Value {
        match template {
            Value::String(s) => Value::String(self.render_str(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), self.render(value)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn render_str(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for segment in split_template(s) {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(name) => match self.vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                },
            }
        }
        out
    }
}

/// JSON テンプレート内で参照されているプレースホルダー名を列挙する（重複なし・昇順）
pub fn placeholders(template: &Value) -> Vec<String> {
    let mut names = BTreeSet::new();
    collect_placeholders(template, &mut names);
    names.into_iter().collect()
}

fn collect_placeholders(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for segment in split_template(s) {
                if let Segment::Var(name) = segment {
                    names.insert(name.to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_placeholders(v, names)),
        Value::Object(map) => map.values().for_each(|v| collect_placeholders(v, names)),
        _ => {}
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Var(&'a str),
}

fn is_var_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_template(s: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = s;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_var_name(&after[..close]) => {
                if open > 0 {
                    segments.push(Segment::Text(&rest[..open]));
                }
                segments.push(Segment::Var(&after[..close]));
                rest = &after[close + 1..];
            }
            _ => {
                segments.push(Segment::Text(&rest[..=open]));
                rest = after;
            }
        }
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}
