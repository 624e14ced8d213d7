//! Parser Module
//!
//! 半構造化テキストレポートの形式スニッフィングと解析を実装する
//! モジュール。先頭最大10行のサンプルをパターン照合で分類し、
//! 優先順位付きの(述語, パーサー)ペアのリストで解析戦略を選択します。

mod fixed;
mod flat;
mod grouped;

pub use fixed::FixedColumnLayout;

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::SheetFeedError;
use crate::security::SecurityConfig;
use crate::types::ParsedTable;

/// 形式判定でサンプリングする最大行数
const SNIFF_SAMPLE_LINES: usize = 10;

/// 入力レポートの形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// グループ化ブロック形式
    ///
    /// `Circle ... (ID: ...)` のようなヘッダー行の配下に
    /// `label = value1 value2 ...` 行が続く形式。
    GroupedBlock,

    /// 固定幅列形式
    ///
    /// 各行が設定された列幅で区切られる形式。
    FixedColumn,

    /// フラットテーブル形式（フォールバック）
    ///
    /// 2文字以上の空白の連続で列が区切られる形式。
    FlatTable,
}

fn grouped_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(Circle|Line|Plane|Point|Distance|Angle).*\(ID:.*\).*")
            .expect("grouped-block header pattern is valid")
    })
}

fn fixed_column_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s*\d+\s+N\d+\s+.*\s+\*+.*").expect("fixed-column pattern is valid")
    })
}

/// テキストレコードパーサー
///
/// 生のファイル内容から矩形の文字列テーブルを生成します。解析の
/// 失敗は空のテーブルへ縮退し、呼び出し側へ伝播しません（長時間
/// 稼働するウォッチャーが1件の不正ファイルで停止しないため）。
#[derive(Debug, Clone)]
pub struct TextRecordParser {
    security: SecurityConfig,
    fixed_layout: FixedColumnLayout,
}

impl Default for TextRecordParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecordParser {
    /// 既定の設定でパーサーを生成
    ///
    /// 固定幅列形式は組み込みの9列幅テーブルを使用します。
    pub fn new() -> Self {
        Self {
            security: SecurityConfig::default(),
            fixed_layout: FixedColumnLayout::default(),
        }
    }

    /// 固定幅列レイアウトを指定してパーサーを生成
    pub fn with_layout(fixed_layout: FixedColumnLayout) -> Self {
        Self {
            security: SecurityConfig::default(),
            fixed_layout,
        }
    }

    /// セキュリティ設定を差し替える
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    /// ファイルを解析してテーブルを生成
    ///
    /// I/Oエラー・解析エラーはすべてここで捕捉され、空のテーブル
    /// （0行）が返ります。呼び出し側は空の結果を「処理対象なし」と
    /// して扱い、ハードエラーにしてはいけません。
    pub fn parse_file(&self, path: &Path) -> ParsedTable {
        match self.try_parse_file(path) {
            Ok(table) => table,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Parse failed, degrading to empty table");
                ParsedTable::empty()
            }
        }
    }

    /// ファイルを解析（エラーを伝播する内部版）
    fn try_parse_file(&self, path: &Path) -> Result<ParsedTable, SheetFeedError> {
        let metadata = fs::metadata(path)?;
        self.security
            .check_input_size(metadata.len())
            .map_err(SheetFeedError::Config)?;

        let bytes = fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        self.parse_str(&content)
    }

    /// 文字列内容を解析してテーブルを生成
    pub fn parse_str(&self, content: &str) -> Result<ParsedTable, SheetFeedError> {
        self.security
            .check_line_count(content.lines().count())
            .map_err(SheetFeedError::Config)?;

        let format = self.sniff_format(content);
        debug!(?format, "Report format detected");

        let rows = match format {
            ReportFormat::GroupedBlock => grouped::parse(content),
            ReportFormat::FixedColumn => fixed::parse(content, &self.fixed_layout),
            ReportFormat::FlatTable => flat::parse(content),
        };

        let cell_count: usize = rows.iter().map(Vec::len).sum();
        self.security
            .check_cell_count(cell_count)
            .map_err(SheetFeedError::Config)?;

        Ok(ParsedTable::new(rows))
    }

    /// 先頭サンプル行から形式を分類
    ///
    /// (述語, パーサー)ペアを優先順位の順に評価し、最初に一致した
    /// 戦略を返します。どれにも一致しない場合はフラットテーブルへ
    /// フォールバックします。
    pub fn sniff_format(&self, content: &str) -> ReportFormat {
        let sample: Vec<&str> = content.lines().take(SNIFF_SAMPLE_LINES).collect();

        let strategies: [(ReportFormat, &Regex); 2] = [
            (ReportFormat::GroupedBlock, grouped_header_re()),
            (ReportFormat::FixedColumn, fixed_column_re()),
        ];

        for (format, predicate) in strategies {
            if sample.iter().any(|line| predicate.is_match(line)) {
                return format;
            }
        }
        ReportFormat::FlatTable
    }
}
