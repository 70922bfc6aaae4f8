//! 署名付き URL によるドキュメント転送
//!
//! # 責務
//!
//! - ナレッジベースへのドキュメントアップロード
//!   1. `GET <endpoint>?filename=<name>` で署名付き URL（`{"url": "..."}`）を取得
//!   2. その URL にファイル本体を `PUT`
//! - 生成済みレポートのダウンロード
//!   1. `GET <endpoint>` で署名付き URL を取得
//!   2. その URL からファイル本体を取得して保存
//!
//! 複数ファイルのアップロードは1件ずつ順に処理し、途中で失敗しても残りは続行します。

use std::path::{Path, PathBuf};

use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::TransferError;

/// アップロードの進行状況
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Processing,
    Processed,
    Failed,
}

/// アップロード1件分の記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRecord {
    /// ファイル名
    pub name: String,

    /// 拡張子（小文字）
    pub extension: String,

    /// 表示用サイズ（例: "1.2 MB"）
    pub size: String,

    /// 状態
    pub status: UploadStatus,

    /// 失敗時のエラーメッセージ
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct PresignedResponse {
    #[serde(default)]
    url: Option<String>,
}

/// 署名付き URL を使った転送クライアント
pub struct TransferClient {
    client: reqwest::Client,
}

impl TransferClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// 複数ファイルを順にアップロードする
    ///
    /// 各ファイルの状態が変わるたびに `on_update` が呼ばれます
    /// （`processing` → `processed` / `failed`）。
    pub async fn upload_all(
        &self,
        endpoint: &str,
        paths: &[PathBuf],
        mut on_update: impl FnMut(&UploadRecord),
    ) -> Vec<UploadRecord> {
        let mut records = Vec::with_capacity(paths.len());

        for path in paths {
            let size = tokio::fs::metadata(path)
                .await
                .map(|meta| human_size(meta.len()))
                .unwrap_or_else(|_| "-".to_string());
            let mut record = UploadRecord {
                name: file_name(path),
                extension: extension(path),
                size,
                status: UploadStatus::Processing,
                error: None,
            };
            on_update(&record);

            match self.upload_file(endpoint, path).await {
                Ok(()) => {
                    info!(file = %record.name, "アップロード完了");
                    record.status = UploadStatus::Processed;
                }
                Err(err) => {
                    warn!(file = %record.name, error = %err, "アップロード失敗");
                    record.status = UploadStatus::Failed;
                    record.error = Some(err.to_string());
                }
            }
            on_update(&record);
            records.push(record);
        }

        records
    }

    /// 1ファイルをアップロードする
    pub async fn upload_file(&self, endpoint: &str, path: &Path) -> Result<(), TransferError> {
        // 読めないファイルのために署名付き URL を発行させない
        let bytes = tokio::fs::read(path).await?;

        let name = file_name(path);
        let presign = presign_url(endpoint, &name)?;
        let url = self.fetch_presigned(presign).await?;

        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type_for(path))
            .body(bytes)
            .send()
            .await?;
        ensure_success(response.status().as_u16(), &url)?;

        Ok(())
    }

    /// 署名付き URL 経由でファイルをダウンロードし、`output` に保存する
    ///
    /// # 戻り値
    ///
    /// 保存したバイト数
    pub async fn download(&self, endpoint: &str, output: &Path) -> Result<u64, TransferError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TransferError::InvalidEndpoint(format!("{} ({})", endpoint, e)))?;
        let url = self.fetch_presigned(endpoint).await?;

        let response = self.client.get(&url).send().await?;
        ensure_success(response.status().as_u16(), &url)?;
        let bytes = response.bytes().await?;

        tokio::fs::write(output, &bytes).await?;
        info!(path = %output.display(), bytes = bytes.len(), "ダウンロード完了");
        Ok(bytes.len() as u64)
    }

    async fn fetch_presigned(&self, endpoint: Url) -> Result<String, TransferError> {
        let target = endpoint.to_string();
        let response = self.client.get(endpoint).send().await?;
        ensure_success(response.status().as_u16(), &target)?;
        let body = response.text().await?;
        parse_presigned(&body)
    }
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_success(status: u16, url: &str) -> Result<(), TransferError> {
    if (200..=299).contains(&status) {
        Ok(())
    } else {
        Err(TransferError::Http {
            status,
            url: url.to_string(),
        })
    }
}

/// 署名付き URL 取得用のリクエスト URL を組み立てる
pub fn presign_url(endpoint: &str, filename: &str) -> Result<Url, TransferError> {
    Url::parse_with_params(endpoint, &[("filename", filename)])
        .map_err(|e| TransferError::InvalidEndpoint(format!("{} ({})", endpoint, e)))
}

/// 署名付き URL 応答から URL を取り出す
pub fn parse_presigned(body: &str) -> Result<String, TransferError> {
    let response: PresignedResponse =
        serde_json::from_str(body).map_err(|e| TransferError::Parse(e.to_string()))?;
    response
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(TransferError::MissingUrl)
}

/// 拡張子から Content-Type を決める
pub fn content_type_for(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// バイト数を MB 表記（小数点以下1桁）にする
pub fn human_size(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
