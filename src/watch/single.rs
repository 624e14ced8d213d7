//! 単一フォルダウォッチャー（レガシー単一ソース実行モード）
//!
//! 1つのフォルダを固定間隔でポーリングし、該当する新着ファイルを
//! 解析→マッピング→セッション単一のターゲットへ追記→アーカイブ
//! します。1ティック分の処理は専用ワーカースレッド上で逐次実行され、
//! ティック同士が並行することはありません。

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::LicenseGate;
use crate::archive::ArchiveManager;
use crate::error::SheetFeedError;
use crate::mapping::ColumnMapping;
use crate::parser::TextRecordParser;
use crate::types::{has_allowed_extension, AppendFailureKind, AppendResult};
use crate::writer::SpreadsheetWriter;

/// ウォッチャーから呼び出し側へ通知されるイベント
#[derive(Debug)]
pub enum WatchEvent {
    /// ファイルが処理され、アーカイブへ退避された
    Processed {
        source: PathBuf,
        result: AppendResult,
        archived_to: PathBuf,
    },

    /// 追記が失敗した（ターゲットの外部削除を含む）
    ///
    /// 回復（新しいターゲットの作成と継続）は明示的なユーザー判断で
    /// あり、ウォッチャーは自動では行いません。
    AppendFailed {
        source: PathBuf,
        result: AppendResult,
    },

    /// スキャンまたはファイル単位の処理でのエラー（ループは継続）
    ScanError { message: String },
}

/// 単一フォルダウォッチャーの設定
#[derive(Debug, Clone)]
pub struct SingleWatchOptions {
    /// 監視対象フォルダ
    pub folder: PathBuf,

    /// 対象とするファイル拡張子
    pub extensions: Vec<String>,

    /// スキャン間隔
    pub scan_interval: Duration,

    /// セッション単一のターゲットスプレッドシート
    pub target: PathBuf,
}

/// 単一フォルダウォッチャー
///
/// `STOPPED → RUNNING → STOPPED` の状態機械。start/stopは冪等で、
/// 実行中のstartや停止中のstopはログ以外何もしません。スキャンや
/// ファイル単位のエラーは捕捉・ログ・通知され、ループを停止させ
/// ません。
pub struct SingleFolderWatcher {
    worker: Arc<Worker>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    license_gate: Option<Arc<dyn LicenseGate>>,
}

struct Worker {
    options: SingleWatchOptions,
    mappings: Vec<ColumnMapping>,
    parser: TextRecordParser,
    writer: SpreadsheetWriter,
    archiver: ArchiveManager,
    events: Sender<WatchEvent>,

    /// 処理中ファイル名の集合
    ///
    /// 不変条件: セッション内で同一ファイル名の処理タスクは高々1つ。
    in_flight: Mutex<HashSet<String>>,

    /// このセッションでターゲットを作成済みか
    target_created: AtomicBool,
}

impl SingleFolderWatcher {
    /// ウォッチャーを生成
    ///
    /// フォルダの存在とスキャン間隔は生成時点で同期的に検証されます。
    /// 戻り値のレシーバでイベントを受け取ります。
    pub fn new(
        options: SingleWatchOptions,
        mappings: Vec<ColumnMapping>,
        parser: TextRecordParser,
        writer: SpreadsheetWriter,
        archiver: ArchiveManager,
    ) -> Result<(Self, Receiver<WatchEvent>), SheetFeedError> {
        if !options.folder.is_dir() {
            return Err(SheetFeedError::Config(format!(
                "Watch folder does not exist: {}",
                options.folder.display()
            )));
        }
        if options.scan_interval.is_zero() {
            return Err(SheetFeedError::Config(
                "Scan interval must be greater than zero".to_string(),
            ));
        }

        let (tx, rx) = channel();
        let watcher = Self {
            worker: Arc::new(Worker {
                options,
                mappings,
                parser,
                writer,
                archiver,
                events: tx,
                in_flight: Mutex::new(HashSet::new()),
                target_created: AtomicBool::new(false),
            }),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            license_gate: None,
        };
        Ok((watcher, rx))
    }

    /// ライセンスゲートを設定
    ///
    /// 設定されている場合、`start()`で一度だけ評価され、拒否される
    /// とウォッチャーは起動しません。
    pub fn with_license_gate(mut self, gate: Arc<dyn LicenseGate>) -> Self {
        self.license_gate = Some(gate);
        self
    }

    /// 実行中かどうか
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// 監視を開始（冪等）
    pub fn start(&mut self) -> Result<(), SheetFeedError> {
        if self.handle.is_some() {
            info!("Watcher already running, start ignored");
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

        self.running.store(true, Ordering::SeqCst);
        let worker = Arc::clone(&self.worker);
        let running = Arc::clone(&self.running);

        let handle = thread::spawn(move || {
            info!(folder = %worker.options.folder.display(), "Folder watcher started");
            while running.load(Ordering::SeqCst) {
                worker.scan_once();
                sleep_responsive(worker.options.scan_interval, &running);
            }
            info!(folder = %worker.options.folder.display(), "Folder watcher stopped");
        });
        self.handle = Some(handle);
        Ok(())
    }

    /// 監視を停止（冪等）
    ///
    /// 新しいスキャンの受け付けを止め、実行中のティックが自然に
    /// 完了するのを待ってから戻ります（書き込み途中の強制中断は
    /// 行いません）。
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            info!("Watcher not running, stop ignored");
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        if handle.join().is_err() {
            warn!("Watcher worker thread terminated abnormally");
        }
    }
}

impl Drop for SingleFolderWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Worker {
    /// 1回のスキャンを実行
    fn scan_once(&self) {
        let entries = match fs::read_dir(&self.options.folder) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    folder = %self.options.folder.display(),
                    error = %err,
                    "Folder scan failed"
                );
                let _ = self.events.send(WatchEvent::ScanError {
                    message: format!("Folder scan failed: {err}"),
                });
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !has_allowed_extension(&path, &self.options.extensions) {
                continue;
            }

            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };

            if !lock_unpoisoned(&self.in_flight).insert(name.clone()) {
                continue;
            }

            let keep_in_flight = self.process_file(&path);
            if !keep_in_flight {
                lock_unpoisoned(&self.in_flight).remove(&name);
            }
        }
    }

    /// 1ファイルを処理
    ///
    /// 戻り値が`true`の場合、ファイル名は処理中集合に残り、この
    /// セッションでは再処理されません（アーカイブ失敗時の二重追記を
    /// 防ぐため）。
    fn process_file(&self, path: &Path) -> bool {
        debug!(path = %path.display(), "Processing detected file");
        let table = self.parser.parse_file(path);
        if table.is_empty() {
            warn!(path = %path.display(), "Parse produced no rows, nothing to process");
        }

        let target = &self.options.target;
        let result = if target.exists() {
            self.writer.append(&table, &self.mappings, target)
        } else if !self.target_created.load(Ordering::SeqCst) {
            // セッション最初のファイル: ターゲットを新規作成
            match self.writer.create(&table, &self.mappings, target) {
                Ok(result) => result,
                Err(err) => {
                    warn!(target = %target.display(), error = %err, "Target creation failed");
                    let _ = self.events.send(WatchEvent::ScanError {
                        message: format!("Target creation failed: {err}"),
                    });
                    return false;
                }
            }
        } else {
            // ターゲットが外部で削除された: 自動再作成はしない
            AppendResult::failure(
                AppendFailureKind::FileNotFound,
                format!("Target was removed externally: {}", target.display()),
                target,
            )
        };

        if !result.success {
            warn!(
                path = %path.display(),
                error = ?result.error_message,
                "Append failed, leaving source in place"
            );
            let _ = self.events.send(WatchEvent::AppendFailed {
                source: path.to_path_buf(),
                result,
            });
            return false;
        }

        self.target_created.store(true, Ordering::SeqCst);

        match self.archiver.archive_single(path) {
            Ok(archived_to) => {
                let _ = self.events.send(WatchEvent::Processed {
                    source: path.to_path_buf(),
                    result,
                    archived_to,
                });
                false
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Archive failed");
                let _ = self.events.send(WatchEvent::ScanError {
                    message: format!("Archive failed for {}: {err}", path.display()),
                });
                // アーカイブできなかったファイルは処理中集合に残し、
                // 次のティックでの二重追記を防ぐ
                true
            }
        }
    }
}

/// 停止フラグを確認しながらスリープ
fn sleep_responsive(total: Duration, running: &AtomicBool) {
    let slice = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < total && running.load(Ordering::SeqCst) {
        let remaining = total - waited;
        thread::sleep(remaining.min(slice));
        waited += slice;
    }
}

/// ポイズニングを無視してロックを取得
///
/// ワーカースレッドのパニックでウォッチャー全体が死なないようにする。
fn lock_unpoisoned<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
