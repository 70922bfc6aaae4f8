//! ステップランナー
//!
//! # 責務
//!
//! 1ステップ分のリモート呼び出しを実行し、状態遷移を報告します。
//!
//! 1. 状態を Running にし、開始時刻を記録
//! 2. 呼び出し完了まで1秒ごとに経過秒数を加算
//! 3. 成功なら Succeeded（レスポンスを保存）、失敗なら Failed（エラーメッセージを保存）
//!
//! 呼び出しとティッカーは同じ `select!` ループでポーリングするため、
//! ステップが Running を抜けた時点でティッカーも必ず止まります。
//! リトライは行いません。

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use super::board::StepSlot;
use super::context::InvocationContext;
use super::descriptor::StepDescriptor;
use super::state::StepState;
use crate::error::InvokeError;
use crate::invoker::{StepInvoker, StepRequest};

const TICK: Duration = Duration::from_secs(1);

/// ステップ実行の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 成功し、状態に反映された
    Succeeded,

    /// 失敗し、状態に反映された
    Failed,

    /// 実行中に新しい実行へ置き換えられた（状態は変更していない）
    Superseded,
}

/// 1ステップを実行するランナー
pub struct StepRunner {
    invoker: Arc<dyn StepInvoker>,
}

impl StepRunner {
    pub fn new(invoker: Arc<dyn StepInvoker>) -> Self {
        Self { invoker }
    }

    /// ステップを実行する
    ///
    /// 外部呼び出しは必ず1回だけ行われます。エラーはすべてここで
    /// [`StepState`] のエラーメッセージに変換され、呼び出し元には伝播しません。
    ///
    /// # 戻り値
    ///
    /// スロットが置き換えられていた場合は [`StepOutcome::Superseded`] を返し、
    /// 状態は一切変更しません。
    pub async fn run(
        &self,
        descriptor: &StepDescriptor,
        context: &InvocationContext,
        slot: &StepSlot,
    ) -> StepOutcome {
        let request = descriptor.build_request(context);

        if !slot.update(|state| *state = StepState::running(SystemTime::now())) {
            return StepOutcome::Superseded;
        }
        info!(step = descriptor.name(), index = descriptor.id(), "ステップ開始");

        let call = self.invoke_with_timeout(descriptor, &request);
        tokio::pin!(call);
        let mut ticker = interval_at(Instant::now() + TICK, TICK);

        let result = loop {
            tokio::select! {
                biased;
                result = &mut call => break result,
                _ = ticker.tick() => {
                    if !slot.update(StepState::tick) {
                        debug!(step = descriptor.name(), "実行が置き換えられたため呼び出しを中断");
                        return StepOutcome::Superseded;
                    }
                }
            }
        };

        let (applied, outcome) = match result {
            Ok(payload) => {
                info!(step = descriptor.name(), index = descriptor.id(), "ステップ成功");
                (
                    slot.update(|state| *state = StepState::succeeded(payload)),
                    StepOutcome::Succeeded,
                )
            }
            Err(err) => {
                warn!(step = descriptor.name(), index = descriptor.id(), error = %err, "ステップ失敗");
                (
                    slot.update(|state| *state = StepState::failed(err.to_string())),
                    StepOutcome::Failed,
                )
            }
        };

        if applied {
            outcome
        } else {
            debug!(step = descriptor.name(), "古い実行の結果を破棄");
            StepOutcome::Superseded
        }
    }

    async fn invoke_with_timeout(
        &self,
        descriptor: &StepDescriptor,
        request: &StepRequest,
    ) -> Result<Value, InvokeError> {
        match descriptor.timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.invoker.invoke(request)).await {
                Ok(result) => result,
                Err(_) => Err(InvokeError::Timeout {
                    secs: limit.as_secs(),
                }),
            },
            None => self.invoker.invoke(request).await,
        }
    }
}
