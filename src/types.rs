//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::warn;

/// 解析済みテーブル
///
/// テキストレポートの解析結果。行の順序付きシーケンスで、各行は
/// 文字列セルの順序付きシーケンスです。行ごとに長さが異なることが
/// あり、短い行は読み出し時に空文字列で論理的にパディングされます。
/// 生成後は不変で、マッピング適用後に破棄されます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    rows: Vec<Vec<String>>,
}

impl ParsedTable {
    /// 行データからテーブルを生成
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// 空のテーブルを生成
    ///
    /// 解析失敗時の縮退結果として使用されます。呼び出し側は空の
    /// テーブルを「処理対象なし」として扱います。
    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    /// 行数を取得
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// テーブルが空かどうか
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 指定セルの値を取得
    ///
    /// 行が範囲外の場合、および列が行の実際の幅を超える場合は
    /// `None`を返します。幅超過時の扱い（スキップ/空文字列）は
    /// 呼び出し側のポリシーが決定します。
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col)).map(String::as_str)
    }

    /// 指定セルの値を取得（行内の幅超過は空文字列にパディング）
    ///
    /// 行自体が範囲外の場合のみ`None`を返します。
    pub fn cell_padded(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .map(|r| r.get(col).map(String::as_str).unwrap_or(""))
    }

    /// 全行への参照を取得
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// 1件のセル書き込み
///
/// マッピングエンジンの出力単位。座標は0始まりです。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    /// 行インデックス（0始まり）
    pub row: u32,

    /// 列インデックス（0始まり）
    pub col: u16,

    /// 書き込む文字列値
    ///
    /// 有限の10進数として解釈できる値は、スプレッドシートへの
    /// コミット時に数値セルとして格納されます（マッピング時点では
    /// 変換しません）。
    pub value: String,
}

impl CellWrite {
    /// 新しいセル書き込みを生成
    pub fn new(row: u32, col: u16, value: impl Into<String>) -> Self {
        Self {
            row,
            col,
            value: value.into(),
        }
    }
}

/// 追記失敗の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendFailureKind {
    /// 対象ファイルが存在しない
    ///
    /// 呼び出し側は新規作成パスへのフォールバックを期待されます。
    /// 追記のリトライは行いません。
    FileNotFound,

    /// 対象ファイルがロックされているかアクセス拒否された
    ///
    /// 別プロセスが排他的に開いている場合などです。
    Locked,

    /// 既存ファイルがスプレッドシートとして読み取れない
    MalformedTarget,
}

/// 1回の追記操作の結果
///
/// 生成後は変更されない値オブジェクトです。失敗は[`SheetFeedError`]
/// ではなくこの型で表現され、回復方針（ターゲット再作成、スキップ、
/// セッション停止）は呼び出し側が決定します。
///
/// [`SheetFeedError`]: crate::SheetFeedError
#[derive(Debug, Clone)]
pub struct AppendResult {
    /// 操作が成功したか
    pub success: bool,

    /// 追加された新規行数
    pub rows_added: u32,

    /// 新規データの開始行インデックス（オフセット）
    pub row_offset: u32,

    /// 解決済みターゲットパス
    pub target_path: PathBuf,

    /// 処理中に蓄積された警告（破棄されたタイトルなど）
    pub warnings: Vec<String>,

    /// 失敗の分類（成功時は`None`）
    pub failure: Option<AppendFailureKind>,

    /// 失敗時のメッセージ
    pub error_message: Option<String>,
}

impl AppendResult {
    /// 成功の結果を生成
    pub fn success(
        rows_added: u32,
        row_offset: u32,
        target_path: impl Into<PathBuf>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            rows_added,
            row_offset,
            target_path: target_path.into(),
            warnings,
            failure: None,
            error_message: None,
        }
    }

    /// 失敗の結果を生成
    pub fn failure(
        kind: AppendFailureKind,
        message: impl Into<String>,
        target_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            success: false,
            rows_added: 0,
            row_offset: 0,
            target_path: target_path.into(),
            warnings: Vec::new(),
            failure: Some(kind),
            error_message: Some(message.into()),
        }
    }
}

/// 処理ジョブの状態
///
/// `Pending → Processing → Completed | Failed` の状態機械です。
/// 終端状態（Completed / Failed）からの遷移はありません。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// 終端状態かどうか
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// マルチソースバッチの処理ジョブ
///
/// 照合キーの一致したバッチが揃った時点で生成され、マージパイプ
/// ラインのライフサイクルを記録します。不正な遷移は警告ログを
/// 出力して無視されます（無人運転中にパニックしないため）。
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    /// バッチの照合キー
    pub correlation_key: String,

    /// スロット番号→入力ファイルパス
    pub inputs: BTreeMap<u8, PathBuf>,

    /// 出力スプレッドシートのパス（完了時に設定）
    pub output_path: Option<PathBuf>,

    /// アーカイブ先フォルダ（完了時に設定）
    pub archive_path: Option<PathBuf>,

    /// 現在の状態
    state: JobState,

    /// 処理開始時刻
    pub started_at: Option<DateTime<Local>>,

    /// 処理終了時刻
    pub finished_at: Option<DateTime<Local>>,

    /// 失敗時のエラーメッセージ
    pub error_message: Option<String>,
}

impl ProcessingJob {
    /// 新しいジョブを`Pending`状態で生成
    pub fn new(correlation_key: impl Into<String>, inputs: BTreeMap<u8, PathBuf>) -> Self {
        Self {
            correlation_key: correlation_key.into(),
            inputs,
            output_path: None,
            archive_path: None,
            state: JobState::Pending,
            started_at: None,
            finished_at: None,
            error_message: None,
        }
    }

    /// 現在の状態を取得
    pub fn state(&self) -> JobState {
        self.state
    }

    /// `Pending → Processing` 遷移
    pub fn start(&mut self) {
        if self.state != JobState::Pending {
            warn!(
                key = %self.correlation_key,
                state = ?self.state,
                "Ignoring invalid job transition to Processing"
            );
            return;
        }
        self.state = JobState::Processing;
        self.started_at = Some(Local::now());
    }

    /// `Processing → Completed` 遷移
    pub fn complete(&mut self, output_path: impl Into<PathBuf>, archive_path: impl Into<PathBuf>) {
        if self.state != JobState::Processing {
            warn!(
                key = %self.correlation_key,
                state = ?self.state,
                "Ignoring invalid job transition to Completed"
            );
            return;
        }
        self.state = JobState::Completed;
        self.output_path = Some(output_path.into());
        self.archive_path = Some(archive_path.into());
        self.finished_at = Some(Local::now());
    }

    /// `Processing → Failed` 遷移
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.state != JobState::Processing {
            warn!(
                key = %self.correlation_key,
                state = ?self.state,
                "Ignoring invalid job transition to Failed"
            );
            return;
        }
        self.state = JobState::Failed;
        self.error_message = Some(message.into());
        self.finished_at = Some(Local::now());
    }
}

/// 列識別子を0始まりの列インデックスに変換
///
/// 識別子は文字（`A`, `B`, ..., `AA`）または整数（`"3"`）のどちらか
/// です。文字は1桁目を1とする基数26で解釈され、結果は0始まりに
/// 変換されます（`A`→0, `Z`→25, `AA`→26）。整数はそのまま0始まりの
/// インデックスとして扱います。どちらにも該当しない場合は`None`。
pub fn column_index_from_id(id: &str) -> Option<u32> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.parse::<u32>().ok();
    }

    if trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        let mut value: u32 = 0;
        for c in trimmed.chars() {
            let digit = (c.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
            value = value.checked_mul(26)?.checked_add(digit)?;
        }
        return Some(value - 1);
    }

    None
}

/// 0始まりの列インデックスを文字識別子に変換（0 → "A", 26 → "AA"）
pub fn column_letter(mut col: u32) -> String {
    let mut result = String::new();
    loop {
        let remainder = col % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    result
}

/// A1形式のセル参照を0始まりの(行, 列)に変換
///
/// 例: `"A1"` → `(0, 0)`, `"C10"` → `(9, 2)`。形式が不正な場合は
/// `None`を返します。
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let trimmed = cell_ref.trim();
    let letter_end = trimmed.find(|c: char| c.is_ascii_digit())?;
    if letter_end == 0 {
        return None;
    }

    let (letters, digits) = trimmed.split_at(letter_end);
    if !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let col = column_index_from_id(letters)?;
    let row_1based: u32 = digits.parse().ok()?;
    if row_1based == 0 {
        return None;
    }

    Some((row_1based - 1, col))
}

/// 拡張子が設定された許可リストに含まれるかを判定
///
/// 比較は大文字小文字を区別しません。許可リストの項目は先頭の
/// ドットの有無どちらでも受け付けます。
pub(crate) fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
}
