//! Writer Module
//!
//! スプレッドシートの新規作成と冪等な追記を実装するモジュール。
//! 追記は既存内容を保全したまま、最後の非空行の直後へ新しい
//! ブロックを配置します。コミットは全書き込みをメモリ上で構築して
//! 一時ファイルへ保存し、リネームで置き換えることで原子性を保証
//! します（途中で失敗した場合、ディスク上のファイルは変化しません）。

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::{debug, warn};

use crate::api::MissingColumnPolicy;
use crate::error::SheetFeedError;
use crate::mapping::{ColumnMapping, MappingEngine, MappingOutcome};
use crate::types::{AppendFailureKind, AppendResult, CellWrite, ParsedTable};

/// 新規ドキュメントの既定シート名
const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// 既存セルの値
///
/// 追記時の再構築で元の型を保持するための表現。
#[derive(Debug, Clone, PartialEq)]
enum ExistingValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

/// 既存シートのスナップショット
///
/// 追記前に既存ワークブックの先頭シートを読み取った結果。
#[derive(Debug, Default)]
struct SheetSnapshot {
    /// シート名（既存ワークブックの先頭シート）
    sheet_name: Option<String>,

    /// 非空セルの絶対座標と値
    cells: Vec<(u32, u16, ExistingValue)>,

    /// 最後に物理的に占有されている行インデックス
    ///
    /// 行数のカウントではなく最後の非空行の位置です。途中に空白行を
    /// 挟むスパースなシートでも正しいオフセットが得られます。
    last_occupied_row: Option<u32>,
}

impl SheetSnapshot {
    /// 次の追記オフセット（最後の占有行 + 1、空シートは0）
    fn next_offset(&self) -> u32 {
        self.last_occupied_row.map(|r| r + 1).unwrap_or(0)
    }

    /// 指定座標の既存テキストを取得
    fn text_at(&self, row: u32, col: u16) -> Option<&str> {
        self.cells.iter().find_map(|(r, c, value)| {
            if *r == row && *c == col {
                match value {
                    ExistingValue::Text(s) => Some(s.as_str()),
                    _ => None,
                }
            } else {
                None
            }
        })
    }
}

/// 追記可能スプレッドシートライター
///
/// 対象のスプレッドシートを開くか作成し、次の空き行を計算して
/// 既存内容を乱さずに新しいセル値を書き込み、失敗を分類します。
#[derive(Debug, Clone)]
pub struct SpreadsheetWriter {
    sheet_name: String,
}

impl Default for SpreadsheetWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpreadsheetWriter {
    /// 既定のシート名でライターを生成
    pub fn new() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
        }
    }

    /// 新規作成時のシート名を指定
    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    /// テーブルとマッピングから新規ドキュメントを作成
    ///
    /// 既存ファイルがある場合は置き換えられます。セッションの最初の
    /// ファイル、およびマルチソースのバッチごとの出力で使用されます。
    pub fn create(
        &self,
        table: &ParsedTable,
        mappings: &[ColumnMapping],
        target: &Path,
    ) -> Result<AppendResult, SheetFeedError> {
        let engine = MappingEngine::new(MissingColumnPolicy::Skip);
        let outcome = engine.plan(table, mappings, None);
        self.create_from_outcome(&outcome, target)
    }

    /// 算出済みのマッピング結果から新規ドキュメントを作成
    pub(crate) fn create_from_outcome(
        &self,
        outcome: &MappingOutcome,
        target: &Path,
    ) -> Result<AppendResult, SheetFeedError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name)?;

        for write in outcome.titles.iter().chain(outcome.data.iter()) {
            write_coerced(worksheet, write)?;
        }

        save_atomic(&mut workbook, target)?;

        let rows_added = distinct_rows(&outcome.data);
        debug!(target = %target.display(), rows_added, "Created new spreadsheet");
        Ok(AppendResult::success(
            rows_added,
            0,
            resolved_path(target),
            outcome.warnings.clone(),
        ))
    }

    /// 既存ドキュメントへテーブルを追記
    ///
    /// 失敗はエラーではなく[`AppendResult`]で分類して返します。
    /// 内部でのリトライは行わず、回復方針は呼び出し側が決定します。
    ///
    /// # 失敗の分類
    ///
    /// * `FileNotFound` - 対象が存在しない（呼び出し側は新規作成へ
    ///   フォールバックする）
    /// * `Locked` - 別プロセスが排他的に開いているなどのアクセス問題
    /// * `MalformedTarget` - 既存ファイルがスプレッドシートとして
    ///   読み取れない
    pub fn append(
        &self,
        table: &ParsedTable,
        mappings: &[ColumnMapping],
        target: &Path,
    ) -> AppendResult {
        if !target.exists() {
            return AppendResult::failure(
                AppendFailureKind::FileNotFound,
                format!("Target file does not exist: {}", target.display()),
                target,
            );
        }

        // 読み書き両用で開けることを確認する（ロック検出）
        if let Err(err) = OpenOptions::new().read(true).write(true).open(target) {
            let kind = match err.kind() {
                ErrorKind::NotFound => AppendFailureKind::FileNotFound,
                _ => AppendFailureKind::Locked,
            };
            return AppendResult::failure(
                kind,
                format!("Cannot open target for writing: {err}"),
                target,
            );
        }

        let snapshot = match load_snapshot(target) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                return AppendResult::failure(
                    AppendFailureKind::MalformedTarget,
                    format!("Target is not a readable spreadsheet: {err}"),
                    target,
                );
            }
        };

        let offset = snapshot.next_offset();

        // 空のシートへの追記は新規シートと同じセマンティクス
        // （アンカー行を尊重する）。占有済みのシートでは各ブロックを
        // オフセットへ再アンカーし、隙間行を作らない。
        let row_base = if snapshot.last_occupied_row.is_some() {
            Some(offset)
        } else {
            None
        };

        let engine = MappingEngine::new(MissingColumnPolicy::Skip);
        let mut outcome = engine.plan(table, mappings, row_base);

        // 既にシートへ書かれているタイトルは再書き込みしない
        outcome.titles.retain(|title| {
            match snapshot.text_at(title.row, title.col) {
                Some(existing) if existing == title.value => {
                    debug!(row = title.row, col = title.col, "Title already present, skipped");
                    false
                }
                _ => true,
            }
        });

        match self.commit_append(&snapshot, &outcome, target) {
            Ok(()) => {
                let rows_added = distinct_rows(&outcome.data);
                AppendResult::success(
                    rows_added,
                    offset,
                    resolved_path(target),
                    outcome.warnings.clone(),
                )
            }
            Err(err) => {
                warn!(target = %target.display(), error = %err, "Append commit failed");
                AppendResult::failure(
                    classify_commit_error(&err),
                    format!("Failed to commit append: {err}"),
                    target,
                )
            }
        }
    }

    /// 既存内容と新規書き込みからワークブックを再構築して保存
    fn commit_append(
        &self,
        snapshot: &SheetSnapshot,
        outcome: &MappingOutcome,
        target: &Path,
    ) -> Result<(), SheetFeedError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let name = snapshot.sheet_name.as_deref().unwrap_or(&self.sheet_name);
        worksheet.set_name(name)?;

        for (row, col, value) in &snapshot.cells {
            match value {
                ExistingValue::Number(n) => worksheet.write_number(*row, *col, *n)?,
                ExistingValue::Text(s) => worksheet.write_string(*row, *col, s)?,
                ExistingValue::Bool(b) => worksheet.write_boolean(*row, *col, *b)?,
            };
        }

        for write in outcome.titles.iter().chain(outcome.data.iter()) {
            write_coerced(worksheet, write)?;
        }

        save_atomic(&mut workbook, target)
    }
}

/// 既存ワークブックの先頭シートを読み取る
fn load_snapshot(path: &Path) -> Result<SheetSnapshot, SheetFeedError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet_names = workbook.sheet_names().to_vec();
    let Some(first) = sheet_names.first() else {
        return Ok(SheetSnapshot::default());
    };

    let range = workbook.worksheet_range(first)?;
    let mut snapshot = SheetSnapshot {
        sheet_name: Some(first.clone()),
        ..SheetSnapshot::default()
    };

    let Some((start_row, start_col)) = range.start() else {
        return Ok(snapshot);
    };

    for (row_idx, row) in range.rows().enumerate() {
        let abs_row = start_row + row_idx as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            let Some(value) = existing_value(cell) else {
                continue;
            };
            let abs_col = start_col + col_idx as u32;
            let Ok(col) = u16::try_from(abs_col) else {
                warn!(row = abs_row, col = abs_col, "Cell beyond column limit ignored");
                continue;
            };
            snapshot.cells.push((abs_row, col, value));
            snapshot.last_occupied_row = Some(
                snapshot
                    .last_occupied_row
                    .map_or(abs_row, |last| last.max(abs_row)),
            );
        }
    }

    Ok(snapshot)
}

/// calamineのセル値を保全用の表現へ変換
///
/// 空セルと空文字列セルは「非空」とみなされず、オフセット計算にも
/// 含まれません。
fn existing_value(cell: &Data) -> Option<ExistingValue> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(ExistingValue::Text(s.clone())),
        Data::Int(i) => Some(ExistingValue::Number(*i as f64)),
        Data::Float(f) => Some(ExistingValue::Number(*f)),
        Data::Bool(b) => Some(ExistingValue::Bool(*b)),
        Data::DateTime(dt) => Some(ExistingValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) => Some(ExistingValue::Text(s.clone())),
        Data::DurationIso(s) => Some(ExistingValue::Text(s.clone())),
        Data::Error(e) => Some(ExistingValue::Text(format!("{e:?}"))),
    }
}

/// 数値として解釈できる値は数値セルとして書き込む
///
/// 有限の10進数として解釈できる場合のみ数値になります。変換は
/// マッピング時ではなくコミット時に行われます。
fn write_coerced(worksheet: &mut Worksheet, write: &CellWrite) -> Result<(), SheetFeedError> {
    let trimmed = write.value.trim();
    match trimmed.parse::<f64>() {
        Ok(number) if number.is_finite() => {
            worksheet.write_number(write.row, write.col, number)?;
        }
        _ => {
            worksheet.write_string(write.row, write.col, &write.value)?;
        }
    }
    Ok(())
}

/// 一時ファイルへ保存してからリネームで置き換える
///
/// 保存が途中で失敗しても既存ファイルは変化しません。
fn save_atomic(workbook: &mut Workbook, target: &Path) -> Result<(), SheetFeedError> {
    let tmp_path = temp_path_for(target);
    if let Err(err) = workbook.save(&tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    if let Err(err) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.xlsx".to_string());
    name.push_str(".tmp");
    target.with_file_name(name)
}

fn resolved_path(target: &Path) -> PathBuf {
    fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf())
}

fn distinct_rows(writes: &[CellWrite]) -> u32 {
    writes.iter().map(|w| w.row).collect::<HashSet<_>>().len() as u32
}

fn classify_commit_error(err: &SheetFeedError) -> AppendFailureKind {
    match err {
        SheetFeedError::Io(io_err) if io_err.kind() == ErrorKind::NotFound => {
            AppendFailureKind::FileNotFound
        }
        _ => AppendFailureKind::Locked,
    }
}
