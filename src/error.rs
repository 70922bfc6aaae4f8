//! エラー型の定義
//!
//! このモジュールは、agent-chain 全体で使用されるエラー型を定義します。
//!
//! - [`ConfigError`]: ワークフロー定義の読み込み・バリデーション
//! - [`InvokeError`]: ステップのリモート呼び出し
//! - [`TransferError`]: 署名付き URL によるドキュメント転送
//! - [`TelemetryError`]: ログ出力の初期化

use thiserror::Error;

/// 設定関連のエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// ファイルの読み込みに失敗
    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    FileRead(#[from] std::io::Error),

    /// TOML のデシリアライズに失敗
    #[error("TOML のデシリアライズに失敗しました: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    /// TOML のシリアライズに失敗
    #[error("TOML のシリアライズに失敗しました: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// バリデーションエラー
    #[error("設定のバリデーションに失敗しました: {0}")]
    Validation(String),
}

/// ステップ呼び出しのエラー
///
/// すべてのバリアントはステップランナーの境界で [`StepState`](crate::engine::StepState)
/// のエラーメッセージへ変換されます。オーケストレーターは種別を区別せず、
/// いずれの場合もチェーンを停止します。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// エンドポイントに到達できなかった（DNS・接続失敗など）
    #[error("ネットワークエラー: {0}")]
    Network(String),

    /// 成功以外の HTTP ステータス
    #[error("HTTP エラー: ステータス {status}: {body}")]
    Http {
        /// ステータスコード
        status: u16,
        /// レスポンスボディ（空の場合あり）
        body: String,
    },

    /// レスポンスボディが JSON として解釈できない
    #[error("レスポンスの解析に失敗しました: {0}")]
    Parse(String),

    /// 設定されたタイムアウトを超過
    #[error("タイムアウト: {secs}秒以内に応答がありませんでした")]
    Timeout {
        /// タイムアウト時間（秒）
        secs: u64,
    },
}

/// ドキュメント転送のエラー
#[derive(Debug, Error)]
pub enum TransferError {
    /// ローカルファイルの読み書きに失敗
    #[error("ファイル操作に失敗しました: {0}")]
    Io(#[from] std::io::Error),

    /// エンドポイント URL が不正
    #[error("エンドポイント URL が不正です: {0}")]
    InvalidEndpoint(String),

    /// 通信エラー
    #[error("ネットワークエラー: {0}")]
    Network(String),

    /// 成功以外の HTTP ステータス
    #[error("HTTP エラー: ステータス {status} ({url})")]
    Http {
        /// ステータスコード
        status: u16,
        /// リクエスト先
        url: String,
    },

    /// 署名付き URL 応答の解析に失敗
    #[error("署名付き URL 応答の解析に失敗しました: {0}")]
    Parse(String),

    /// 応答に署名付き URL が含まれていない
    #[error("署名付き URL が返されませんでした")]
    MissingUrl,
}

/// ログ初期化のエラー
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// ログファイルの準備に失敗
    #[error("ログファイルを作成できません: {0}")]
    LogFile(String),

    /// サブスクライバーの登録に失敗（既に登録済みなど）
    #[error("ロガーの初期化に失敗しました: {0}")]
    Init(String),
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        TransferError::Network(err.to_string())
    }
}
