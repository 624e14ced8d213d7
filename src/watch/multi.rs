//! マルチスロット監視コーディネータ（マルチソース実行モード）
//!
//! N個のフォルダをファイルシステムイベントで並行監視し、検出された
//! ファイルを安定性ゲートに通した上でスロットごとの「準備完了」
//! 状態として保持します。すべてのスロットが同一の照合キーを持つ
//! ファイルで揃った時点でのみ、完成したバッチをリスナーへ発行します。

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use super::matchkey::MatchKeyExtractor;
use super::stability::StabilityGate;
use crate::api::{LicenseGate, MatchKeyStrategy};
use crate::config::{WatchFolderDef, SLOT_RANGE};
use crate::error::SheetFeedError;
use crate::types::has_allowed_extension;

/// イベントループのポーリングタイムアウト
const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// 完成したバッチ
///
/// 各スロットにつき1ファイル、全ファイルが共通の照合キーを持ちます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBatch {
    /// バッチの照合キー
    pub correlation_key: String,

    /// スロット番号→入力ファイルパス
    pub files: BTreeMap<u8, PathBuf>,
}

/// コーディネータから発行されるイベント
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// 完成したバッチがマージ処理へ渡せる状態になった
    BatchReady(SlotBatch),

    /// 監視中のエラー（ループは継続）
    Error { message: String },
}

/// マルチスロット監視コーディネータ
///
/// イベントループは専用スレッド1本で短いタイムアウトのポーリングを
/// 行い、検出ごとの安定性チェックは個別のバックグラウンドスレッドへ
/// ディスパッチされます。あるスロットの長い安定性待機が他スロットの
/// イベント検出をブロックすることはありません。
pub struct MultiSlotWatchCoordinator {
    folders: Vec<WatchFolderDef>,
    shared: Arc<SlotState>,
    running: Arc<AtomicBool>,
    fs_watcher: Option<RecommendedWatcher>,
    loop_handle: Option<JoinHandle<()>>,
    license_gate: Option<Arc<dyn LicenseGate>>,
}

/// スレッド間で共有される監視状態
///
/// スロットごとの準備完了ファイルと、安定性チェック実行中のパス
/// 集合のみがスレッド間で共有されます。それ以外のサイクル内状態は
/// 各処理タスクのローカルです。
struct SlotState {
    /// 正規化済みフォルダパス→スロット番号
    folder_slots: Vec<(PathBuf, u8)>,

    /// 登録スロット数
    slot_count: usize,

    extensions: Vec<String>,
    gate: StabilityGate,
    retries: u32,
    extractor: MatchKeyExtractor,
    events_out: Sender<CoordinatorEvent>,
    running: Arc<AtomicBool>,

    /// スロット番号→準備完了ファイル（後続ファイルが上書きする）
    ready: Mutex<BTreeMap<u8, PathBuf>>,

    /// 安定性チェック実行中のパス集合
    pending_checks: Mutex<HashSet<PathBuf>>,
}

impl MultiSlotWatchCoordinator {
    /// コーディネータを生成
    ///
    /// スロット番号（1..=10、重複なし）とフォルダの存在は生成時点で
    /// 同期的に検証され、違反は`SlotValidation`エラーになります。
    pub fn new(
        folders: Vec<WatchFolderDef>,
        extensions: Vec<String>,
        stability_window: Duration,
        stability_retries: u32,
        strategy: MatchKeyStrategy,
    ) -> Result<(Self, Receiver<CoordinatorEvent>), SheetFeedError> {
        if folders.is_empty() {
            return Err(SheetFeedError::Config(
                "At least one watch folder is required".to_string(),
            ));
        }

        let mut seen_slots = HashSet::new();
        let mut folder_slots = Vec::with_capacity(folders.len());
        for folder in &folders {
            if !SLOT_RANGE.contains(&folder.slot) {
                return Err(SheetFeedError::SlotValidation(format!(
                    "Slot {} is out of range (1..=10)",
                    folder.slot
                )));
            }
            if !seen_slots.insert(folder.slot) {
                return Err(SheetFeedError::SlotValidation(format!(
                    "Slot {} is registered more than once",
                    folder.slot
                )));
            }
            if !folder.path.is_dir() {
                return Err(SheetFeedError::SlotValidation(format!(
                    "Watch folder for slot {} does not exist: {}",
                    folder.slot,
                    folder.path.display()
                )));
            }
            let canonical = std::fs::canonicalize(&folder.path)?;
            folder_slots.push((canonical, folder.slot));
        }

        let (tx, rx) = channel();
        let running = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(SlotState {
            slot_count: folder_slots.len(),
            folder_slots,
            extensions,
            gate: StabilityGate::new(stability_window),
            retries: stability_retries,
            extractor: MatchKeyExtractor::new(strategy),
            events_out: tx,
            running: Arc::clone(&running),
            ready: Mutex::new(BTreeMap::new()),
            pending_checks: Mutex::new(HashSet::new()),
        });

        Ok((
            Self {
                folders,
                shared,
                running,
                fs_watcher: None,
                loop_handle: None,
                license_gate: None,
            },
            rx,
        ))
    }

    /// ライセンスゲートを設定
    pub fn with_license_gate(mut self, gate: Arc<dyn LicenseGate>) -> Self {
        self.license_gate = Some(gate);
        self
    }

    /// 実行中かどうか
    pub fn is_running(&self) -> bool {
        self.loop_handle.is_some()
    }

    /// 監視を開始（冪等）
    ///
    /// 各スロットのフォルダを作成・変更イベントで登録し、イベント
    /// ループスレッドを起動します。
    pub fn start(&mut self) -> Result<(), SheetFeedError> {
        if self.loop_handle.is_some() {
            info!("Coordinator already running, start ignored");
            return Ok(());
        }

        if let Some(gate) = &self.license_gate {
            let decision = gate.check();
            if !decision.allowed {
                let message = decision
                    .message
                    .unwrap_or_else(|| "license check rejected".to_string());
                return Err(SheetFeedError::Config(format!(
                    "Run mode not permitted: {message}"
                )));
            }
        }

        let (event_tx, event_rx) = channel();
        let mut fs_watcher = notify::recommended_watcher(event_tx)?;
        for folder in &self.folders {
            fs_watcher.watch(&folder.path, RecursiveMode::NonRecursive)?;
        }

        self.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);

        let handle = thread::spawn(move || {
            info!(slots = shared.slot_count, "Multi-slot coordinator started");
            while running.load(Ordering::SeqCst) {
                match event_rx.recv_timeout(EVENT_POLL_TIMEOUT) {
                    Ok(Ok(event)) => {
                        if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                            for path in &event.paths {
                                shared.handle_detection(path);
                            }
                        }
                    }
                    Ok(Err(err)) => {
                        warn!(error = %err, "File watch backend error");
                        let _ = shared.events_out.send(CoordinatorEvent::Error {
                            message: format!("File watch backend error: {err}"),
                        });
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("Multi-slot coordinator stopped");
        });

        self.fs_watcher = Some(fs_watcher);
        self.loop_handle = Some(handle);
        Ok(())
    }

    /// 監視を停止（冪等）
    ///
    /// 新しいイベントの受け付けを止め、イベントループを終了し、OSの
    /// 監視登録を解放し、スロット状態をリセットします。実行中の
    /// 安定性チェックは自然に完了しますが、停止後にバッチが発行
    /// されることはありません。
    pub fn stop(&mut self) {
        let Some(handle) = self.loop_handle.take() else {
            info!("Coordinator not running, stop ignored");
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        if handle.join().is_err() {
            warn!("Coordinator loop thread terminated abnormally");
        }

        if let Some(mut fs_watcher) = self.fs_watcher.take() {
            for folder in &self.folders {
                let _ = fs_watcher.unwatch(&folder.path);
            }
        }

        lock_unpoisoned(&self.shared.ready).clear();
        lock_unpoisoned(&self.shared.pending_checks).clear();
    }
}

impl Drop for MultiSlotWatchCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SlotState {
    /// 検出されたパスを処理
    ///
    /// 拡張子とスロットを解決し、安定性チェックをバックグラウンド
    /// スレッドへディスパッチします。同一パスのチェックが既に実行中
    /// なら何もしません。
    fn handle_detection(self: &Arc<Self>, path: &Path) {
        if !has_allowed_extension(path, &self.extensions) {
            return;
        }
        let Some(slot) = self.slot_for(path) else {
            return;
        };

        if !lock_unpoisoned(&self.pending_checks).insert(path.to_path_buf()) {
            return;
        }

        debug!(slot, path = %path.display(), "Dispatching stability check");
        let state = Arc::clone(self);
        let path = path.to_path_buf();
        thread::spawn(move || {
            let stable = state.gate.wait_for_stability(&path, state.retries);
            lock_unpoisoned(&state.pending_checks).remove(&path);

            if !stable {
                warn!(path = %path.display(), "File never stabilized, dropped");
                return;
            }
            if !state.running.load(Ordering::SeqCst) {
                return;
            }
            if let Some(batch) = state.assign_ready(slot, path) {
                info!(key = %batch.correlation_key, "Batch complete, emitting");
                let _ = state.events_out.send(CoordinatorEvent::BatchReady(batch));
            }
        });
    }

    /// イベントパスの親フォルダからスロットを特定
    fn slot_for(&self, path: &Path) -> Option<u8> {
        let parent = path.parent()?;
        let canonical = std::fs::canonicalize(parent).ok()?;
        self.folder_slots
            .iter()
            .find(|(folder, _)| *folder == canonical)
            .map(|(_, slot)| *slot)
    }

    /// 安定したファイルをスロットの準備完了状態として登録
    ///
    /// 同一スロットの未配信ファイルは後続ファイルが上書きします。
    /// 全スロットが揃い、かつ全ファイルの照合キーが一致した場合のみ
    /// バッチを返し、状態をクリアします。キーが一致しない場合は
    /// 部分的なコミットもタイムアウトも行わず、さらなるイベントを
    /// 待ちます。
    fn assign_ready(&self, slot: u8, path: PathBuf) -> Option<SlotBatch> {
        let mut ready = lock_unpoisoned(&self.ready);
        ready.insert(slot, path);

        if ready.len() < self.slot_count {
            return None;
        }

        match self.extractor.find_common_match_key(&ready) {
            Some(key) => {
                let files = std::mem::take(&mut *ready);
                Some(SlotBatch {
                    correlation_key: key,
                    files,
                })
            }
            None => {
                debug!("All slots ready but match keys differ, waiting");
                None
            }
        }
    }
}

/// ポイズニングを無視してロックを取得
fn lock_unpoisoned<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
