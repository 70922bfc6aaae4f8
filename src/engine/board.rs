//! 実行中ワークフローの状態ボード
//!
//! ステップごとの状態スロット（`watch` チャネル）と実行世代を保持します。
//! すべての更新は世代チェックを通るため、置き換えられた実行から遅れて
//! 届いた結果が新しい実行の状態を書き換えることはありません。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use super::state::{RunPhase, StepState};

pub(crate) struct Board {
    inner: Mutex<BoardInner>,
}

struct BoardInner {
    generation: u64,
    phase: RunPhase,
    slots: Vec<watch::Sender<StepState>>,
}

fn new_slots(len: usize) -> Vec<watch::Sender<StepState>> {
    (0..len)
        .map(|_| watch::Sender::new(StepState::idle()))
        .collect()
}

impl Board {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            inner: Mutex::new(BoardInner {
                generation: 0,
                phase: RunPhase::NotStarted,
                slots: new_slots(len),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 新しい実行を開始し、その世代番号を返す
    ///
    /// 全スロットを Idle に戻す。ステップ数が変わった場合はスロットを作り直すため、
    /// 既存の購読者のチャネルは閉じられる。
    pub(crate) fn begin(&self, len: usize) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.phase = RunPhase::NotStarted;

        if inner.slots.len() == len {
            for slot in &inner.slots {
                slot.send_replace(StepState::idle());
            }
        } else {
            inner.slots = new_slots(len);
        }

        inner.generation
    }

    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub(crate) fn phase(&self) -> RunPhase {
        self.lock().phase
    }

    /// 世代が一致する場合のみフェーズを更新する
    pub(crate) fn set_phase(&self, generation: u64, phase: RunPhase) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.phase = phase;
        true
    }

    /// 世代が一致する場合のみスロットを更新する
    fn update(&self, generation: u64, index: usize, f: impl FnOnce(&mut StepState)) -> bool {
        let inner = self.lock();
        if inner.generation != generation {
            debug!(generation, current = inner.generation, index, "古い実行からの更新を破棄");
            return false;
        }
        match inner.slots.get(index) {
            Some(slot) => {
                slot.send_modify(f);
                true
            }
            None => false,
        }
    }

    pub(crate) fn state(&self, index: usize) -> Option<StepState> {
        self.lock().slots.get(index).map(|slot| slot.borrow().clone())
    }

    pub(crate) fn states(&self) -> Vec<StepState> {
        self.lock()
            .slots
            .iter()
            .map(|slot| slot.borrow().clone())
            .collect()
    }

    pub(crate) fn subscribe(&self, index: usize) -> Option<watch::Receiver<StepState>> {
        self.lock().slots.get(index).map(watch::Sender::subscribe)
    }
}

/// 1つの実行世代における1ステップ分の書き込み権
///
/// [`StepRunner`](super::runner::StepRunner) はこのハンドルを通してのみ
/// 状態を更新します。
#[derive(Clone)]
pub struct StepSlot {
    board: Arc<Board>,
    generation: u64,
    index: usize,
}

impl StepSlot {
    pub(crate) fn new(board: Arc<Board>, generation: u64, index: usize) -> Self {
        Self {
            board,
            generation,
            index,
        }
    }

    /// オーケストレーターを介さない単独スロットを生成する
    ///
    /// ステップランナーを単体で使う場合に利用します。
    pub fn detached() -> Self {
        let board = Arc::new(Board::new(1));
        let generation = board.begin(1);
        Self::new(board, generation, 0)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 状態を更新する
    ///
    /// スロットの世代が既に置き換えられている場合は何もせず `false` を返します。
    pub fn update(&self, f: impl FnOnce(&mut StepState)) -> bool {
        self.board.update(self.generation, self.index, f)
    }

    /// このスロットの世代が現在の実行かどうか
    pub fn is_current(&self) -> bool {
        self.board.generation() == self.generation
    }

    pub fn state(&self) -> StepState {
        self.board.state(self.index).unwrap_or_default()
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<StepState>> {
        self.board.subscribe(self.index)
    }
}
