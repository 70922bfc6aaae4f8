//! ワークフローオーケストレーター
//!
//! # 責務
//!
//! このモジュールは、ステップを宣言順に1つずつ実行する [`WorkflowOrchestrator`] を提供します。
//!
//! # 実行フロー
//!
//! 1. `start` で全ステップを Idle に戻し、新しい実行世代を発行
//! 2. ドライバータスクを起動し、先頭ステップからステップランナーを実行
//!    - 成功したら次のステップへ進む
//!    - 失敗したらその場で停止（後続ステップは呼び出さない）
//! 3. 最後のステップが成功したら完了
//!
//! 実行中に `start` を再度呼ぶと、前の実行は破棄されます。前の実行のドライバーは
//! 中断され、遅れて届いた結果も世代チェックにより新しい実行には反映されません。
//!
//! # 使用例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agent_chain::config::Workflow;
//! use agent_chain::engine::{RunOutcome, WorkflowOrchestrator};
//! use agent_chain::invoker::HttpInvoker;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let workflow = Workflow::from_file("workflows/credit-assessment.toml")?;
//!     let invoker = Arc::new(HttpInvoker::from_settings(workflow.client()));
//!     let orchestrator = WorkflowOrchestrator::new(&workflow, invoker);
//!
//!     let outcome = orchestrator.start().wait().await;
//!     if let RunOutcome::Halted { index } = outcome {
//!         println!("ステップ {} で停止しました", index + 1);
//!     }
//!
//!     println!("{}", orchestrator.snapshot().to_json()?);
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, warn};

use super::board::{Board, StepSlot};
use super::context::InvocationContext;
use super::descriptor::{StepDescriptor, descriptors};
use super::runner::{StepOutcome, StepRunner};
use super::state::{RunOutcome, RunPhase, StepSnapshot, StepState, WorkflowSnapshot};
use crate::config::workflow::Workflow;
use crate::invoker::StepInvoker;

/// 1回分の実行で使うステップ列とコンテキスト
struct Pipeline {
    steps: Vec<StepDescriptor>,
    context: InvocationContext,
}

struct Control {
    pipeline: Arc<Pipeline>,
    driver: Option<AbortHandle>,
}

/// ワークフローオーケストレーター
///
/// ステップ列を所有し、実行の開始・置き換えと、ステップごとの状態の
/// 読み取りを提供します。`start` は Tokio ランタイム上で呼び出す必要があります。
pub struct WorkflowOrchestrator {
    name: String,
    board: Arc<Board>,
    runner: Arc<StepRunner>,
    control: Mutex<Control>,
}

impl WorkflowOrchestrator {
    /// ワークフロー定義から生成する
    pub fn new(workflow: &Workflow, invoker: Arc<dyn StepInvoker>) -> Self {
        Self::from_parts(
            workflow.name(),
            descriptors(workflow),
            InvocationContext::from_vars(workflow.context().clone()),
            invoker,
        )
    }

    /// ステップ列とコンテキストを直接指定して生成する
    pub fn from_parts(
        name: impl Into<String>,
        steps: Vec<StepDescriptor>,
        context: InvocationContext,
        invoker: Arc<dyn StepInvoker>,
    ) -> Self {
        let len = steps.len();
        Self {
            name: name.into(),
            board: Arc::new(Board::new(len)),
            runner: Arc::new(StepRunner::new(invoker)),
            control: Mutex::new(Control {
                pipeline: Arc::new(Pipeline { steps, context }),
                driver: None,
            }),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登録済みのステップ列で新しい実行を開始する
    ///
    /// 実行中の場合、前の実行は破棄されます。
    pub fn start(&self) -> RunHandle {
        let mut control = self.control();
        self.launch(&mut control)
    }

    /// ステップ列を置き換えて新しい実行を開始する
    ///
    /// ステップ数が変わった場合、既存の購読者のチャネルは閉じられます。
    pub fn start_with(&self, steps: Vec<StepDescriptor>) -> RunHandle {
        let mut control = self.control();
        control.pipeline = Arc::new(Pipeline {
            steps,
            context: control.pipeline.context.clone(),
        });
        self.launch(&mut control)
    }

    fn launch(&self, control: &mut Control) -> RunHandle {
        if let Some(previous) = control.driver.take() {
            if !previous.is_finished() {
                info!(workflow = %self.name, "実行中のワークフローを置き換えます");
            }
            previous.abort();
        }

        let pipeline = Arc::clone(&control.pipeline);
        let generation = self.board.begin(pipeline.steps.len());
        info!(
            workflow = %self.name,
            generation,
            steps = pipeline.steps.len(),
            "ワークフロー開始"
        );

        let task = tokio::spawn(drive(
            self.name.clone(),
            Arc::clone(&self.board),
            Arc::clone(&self.runner),
            pipeline,
            generation,
        ));
        control.driver = Some(task.abort_handle());

        RunHandle { generation, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 現在の実行世代（未開始なら 0）
    pub fn generation(&self) -> u64 {
        self.board.generation()
    }

    pub fn phase(&self) -> RunPhase {
        self.board.phase()
    }

    pub fn step_count(&self) -> usize {
        self.control().pipeline.steps.len()
    }

    pub fn step_names(&self) -> Vec<String> {
        self.control()
            .pipeline
            .steps
            .iter()
            .map(|step| step.name().to_string())
            .collect()
    }

    pub fn step_state(&self, index: usize) -> Option<StepState> {
        self.board.state(index)
    }

    /// ステップの状態変化を購読する
    pub fn subscribe(&self, index: usize) -> Option<watch::Receiver<StepState>> {
        self.board.subscribe(index)
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let names = self.step_names();
        let generation = self.board.generation();
        let phase = self.board.phase();
        let steps = names
            .into_iter()
            .zip(self.board.states())
            .enumerate()
            .map(|(index, (name, state))| StepSnapshot { index, name, state })
            .collect();

        WorkflowSnapshot {
            workflow_name: self.name.clone(),
            generation,
            phase,
            steps,
        }
    }
}

impl Drop for WorkflowOrchestrator {
    fn drop(&mut self) {
        if let Some(driver) = self.control().driver.take() {
            driver.abort();
        }
    }
}

/// 開始した実行へのハンドル
pub struct RunHandle {
    generation: u64,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 実行の終了を待つ
    ///
    /// 後続の `start` によって中断された場合は [`RunOutcome::Superseded`] を返します。
    pub async fn wait(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => RunOutcome::Superseded,
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}

async fn drive(
    name: String,
    board: Arc<Board>,
    runner: Arc<StepRunner>,
    pipeline: Arc<Pipeline>,
    generation: u64,
) -> RunOutcome {
    for (index, descriptor) in pipeline.steps.iter().enumerate() {
        if !board.set_phase(generation, RunPhase::Running { index }) {
            return RunOutcome::Superseded;
        }

        let slot = StepSlot::new(Arc::clone(&board), generation, index);
        match runner.run(descriptor, &pipeline.context, &slot).await {
            StepOutcome::Succeeded => continue,
            StepOutcome::Failed => {
                board.set_phase(generation, RunPhase::Halted { index });
                warn!(
                    workflow = %name,
                    generation,
                    step = descriptor.name(),
                    "ステップ失敗のためワークフローを停止"
                );
                return RunOutcome::Halted { index };
            }
            StepOutcome::Superseded => return RunOutcome::Superseded,
        }
    }

    if !board.set_phase(generation, RunPhase::Completed) {
        return RunOutcome::Superseded;
    }
    info!(workflow = %name, generation, "ワークフロー完了");
    RunOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::step::HttpMethod;
    use crate::engine::state::StepStatus;
    use crate::error::InvokeError;
    use crate::invoker::StepRequest;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::oneshot;

    type Reply = Result<Value, InvokeError>;

    /// 呼び出しごとに oneshot を払い出し、テスト側から応答タイミングを制御するモック
    #[derive(Default)]
    struct ScriptedInvoker {
        calls: Mutex<Vec<String>>,
        pending: Mutex<HashMap<usize, oneshot::Sender<Reply>>>,
    }

    impl ScriptedInvoker {
        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// n 番目（0始まり）の呼び出しに応答する
        fn reply(&self, call: usize, reply: Reply) {
            let tx = self
                .pending
                .lock()
                .unwrap()
                .remove(&call)
                .expect("no pending call");
            let _ = tx.send(reply);
        }
    }

    #[async_trait]
    impl StepInvoker for ScriptedInvoker {
        async fn invoke(&self, request: &StepRequest) -> Result<Value, InvokeError> {
            let (tx, rx) = oneshot::channel();
            {
                let mut calls = self.calls.lock().unwrap();
                self.pending.lock().unwrap().insert(calls.len(), tx);
                calls.push(request.url.clone());
            }
            rx.await
                .unwrap_or_else(|_| Err(InvokeError::Network("dropped".to_string())))
        }
    }

    /// 決められた応答を即座に返すモック
    struct FixedInvoker {
        replies: Mutex<Vec<Reply>>,
        calls: Mutex<usize>,
    }

    impl FixedInvoker {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl StepInvoker for FixedInvoker {
        async fn invoke(&self, _request: &StepRequest) -> Result<Value, InvokeError> {
            *self.calls.lock().unwrap() += 1;
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(json!({}))
            } else {
                replies.remove(0)
            }
        }
    }

    const NAMES: [&str; 4] = [
        "Document Extractor",
        "Information Checking",
        "Financial Analyst",
        "Risk Evaluator",
    ];

    fn steps(count: usize) -> Vec<StepDescriptor> {
        (0..count)
            .map(|i| {
                StepDescriptor::new(
                    i,
                    NAMES[i % NAMES.len()],
                    HttpMethod::Post,
                    format!("http://localhost/step{}", i),
                )
            })
            .collect()
    }

    fn orchestrator(count: usize, invoker: Arc<dyn StepInvoker>) -> WorkflowOrchestrator {
        WorkflowOrchestrator::from_parts("credit", steps(count), InvocationContext::new(), invoker)
    }

    fn statuses(orch: &WorkflowOrchestrator) -> Vec<StepStatus> {
        (0..orch.step_count())
            .map(|i| orch.step_state(i).unwrap().status())
            .collect()
    }

    /// 条件を満たすまでランタイムに制御を譲る
    async fn settle_until(mut done: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_not_started_initially() {
        let orch = orchestrator(3, FixedInvoker::new(vec![]));
        assert_eq!(orch.phase(), RunPhase::NotStarted);
        assert_eq!(orch.generation(), 0);
        assert!(statuses(&orch).iter().all(|s| *s == StepStatus::Idle));
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let invoker = FixedInvoker::new(vec![]);
        let orch = orchestrator(4, invoker.clone());

        let outcome = orch.start().wait().await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(orch.phase(), RunPhase::Completed);
        assert_eq!(*invoker.calls.lock().unwrap(), 4);
        assert!(statuses(&orch).iter().all(|s| *s == StepStatus::Succeeded));
        assert_eq!(orch.snapshot().completed_steps(), 4);
    }

    #[tokio::test]
    async fn test_first_step_runs_before_others_leave_idle() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let orch = orchestrator(4, invoker.clone());

        let _handle = orch.start();
        let mut first = orch.subscribe(0).unwrap();
        first
            .wait_for(|state| state.status() == StepStatus::Running)
            .await
            .unwrap();

        assert_eq!(
            statuses(&orch),
            vec![
                StepStatus::Running,
                StepStatus::Idle,
                StepStatus::Idle,
                StepStatus::Idle
            ]
        );
        assert_eq!(orch.phase(), RunPhase::Running { index: 0 });
    }

    #[tokio::test]
    async fn test_success_advances_and_failure_halts() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let orch = orchestrator(4, invoker.clone());
        let handle = orch.start();

        settle_until(|| invoker.call_count() == 1).await;
        invoker.reply(0, Ok(json!({ "ok": true })));
        settle_until(|| invoker.call_count() == 2).await;

        assert_eq!(
            statuses(&orch),
            vec![
                StepStatus::Succeeded,
                StepStatus::Running,
                StepStatus::Idle,
                StepStatus::Idle
            ]
        );
        assert_eq!(orch.step_state(0).unwrap().result(), Some(&json!({ "ok": true })));

        invoker.reply(
            1,
            Err(InvokeError::Http {
                status: 500,
                body: "boom".to_string(),
            }),
        );
        assert_eq!(handle.wait().await, RunOutcome::Halted { index: 1 });

        let labels: Vec<_> = (0..4)
            .map(|i| crate::engine::projector::project(&orch.step_state(i).unwrap()).to_string())
            .collect();
        assert_eq!(labels, vec!["success", "failed", "waiting", "waiting"]);
        assert!(orch.step_state(1).unwrap().error().unwrap().contains("500"));
        assert_eq!(orch.phase(), RunPhase::Halted { index: 1 });

        // 停止後は追加の呼び出しが発生しない
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(invoker.call_count(), 2);
        assert_eq!(orch.step_state(2).unwrap().status(), StepStatus::Idle);
    }

    #[tokio::test]
    async fn test_single_step_network_failure() {
        let invoker = FixedInvoker::new(vec![Err(InvokeError::Network(
            "dns error: no such host".to_string(),
        ))]);
        let orch = orchestrator(1, invoker);

        assert_eq!(orch.start().wait().await, RunOutcome::Halted { index: 0 });

        let state = orch.step_state(0).unwrap();
        assert_eq!(state.status(), StepStatus::Failed);
        assert!(!state.error().unwrap().is_empty());
        assert_eq!(state.elapsed_seconds(), 0);
    }

    #[tokio::test]
    async fn test_restart_ignores_stale_results() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let orch = orchestrator(2, invoker.clone());

        let first = orch.start();
        settle_until(|| invoker.call_count() == 1).await;

        let second = orch.start();
        assert_eq!(second.generation(), first.generation() + 1);
        assert_eq!(first.wait().await, RunOutcome::Superseded);

        settle_until(|| invoker.call_count() == 2).await;
        assert_eq!(orch.step_state(0).unwrap().status(), StepStatus::Running);

        // 1回目の実行の呼び出しは中断済みのため、応答先が存在しない
        assert!(invoker.pending.lock().unwrap().get(&0).is_none_or(|tx| tx.is_closed()));

        invoker.reply(1, Ok(json!({ "run": 2 })));
        settle_until(|| invoker.call_count() == 3).await;
        invoker.reply(2, Ok(json!({ "run": 2, "step": 2 })));

        assert_eq!(second.wait().await, RunOutcome::Completed);
        assert_eq!(orch.step_state(0).unwrap().result(), Some(&json!({ "run": 2 })));
        assert_eq!(
            invoker.calls(),
            vec![
                "http://localhost/step0",
                "http://localhost/step0",
                "http://localhost/step1"
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_slot_write_is_rejected_after_restart() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let orch = orchestrator(1, invoker.clone());

        let first = orch.start();
        settle_until(|| invoker.call_count() == 1).await;
        let stale = StepSlot::new(Arc::clone(&orch.board), first.generation(), 0);

        let _second = orch.start();
        settle_until(|| invoker.call_count() == 2).await;

        // 遅れて届いた1回目の結果を直接書き込もうとしても反映されない
        assert!(!stale.update(|s| *s = StepState::succeeded(json!({ "run": 1 }))));
        assert_eq!(orch.step_state(0).unwrap().status(), StepStatus::Running);
    }

    #[tokio::test]
    async fn test_restart_after_failure_runs_from_first_step() {
        let invoker = FixedInvoker::new(vec![
            Ok(json!(1)),
            Err(InvokeError::Parse("expected value".to_string())),
        ]);
        let orch = orchestrator(3, invoker.clone());

        assert_eq!(orch.start().wait().await, RunOutcome::Halted { index: 1 });
        assert_eq!(orch.start().wait().await, RunOutcome::Completed);

        assert_eq!(*invoker.calls.lock().unwrap(), 5);
        assert_eq!(orch.generation(), 2);
        assert!(statuses(&orch).iter().all(|s| *s == StepStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_start_with_replaces_steps() {
        let invoker = FixedInvoker::new(vec![]);
        let orch = orchestrator(4, invoker);

        let outcome = orch.start_with(steps(2)).wait().await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(orch.step_count(), 2);
        assert_eq!(orch.snapshot().steps.len(), 2);
        assert!(orch.step_state(2).is_none());
    }

    #[tokio::test]
    async fn test_snapshot_reflects_names_and_phase() {
        let invoker = FixedInvoker::new(vec![]);
        let orch = orchestrator(2, invoker);
        orch.start().wait().await;

        let snapshot = orch.snapshot();
        assert_eq!(snapshot.workflow_name, "credit");
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.phase, RunPhase::Completed);
        assert_eq!(snapshot.steps[0].name, "Document Extractor");
        assert_eq!(snapshot.steps[1].name, "Information Checking");
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_counter_through_orchestrator() {
        let invoker = Arc::new(ScriptedInvoker::default());
        let orch = orchestrator(2, invoker.clone());
        let handle = orch.start();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(orch.step_state(0).unwrap().elapsed_seconds(), 3);

        invoker.reply(0, Ok(json!({})));
        settle_until(|| invoker.call_count() == 2).await;
        assert_eq!(orch.step_state(0).unwrap().elapsed_seconds(), 0);
        assert_eq!(orch.step_state(1).unwrap().elapsed_seconds(), 0);

        invoker.reply(1, Ok(json!({})));
        assert_eq!(handle.wait().await, RunOutcome::Completed);
    }
}
