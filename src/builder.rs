//! Builder Module
//!
//! Fluent Builder APIを提供し、`Ingestor`インスタンスを段階的に
//! 構築する。

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::SheetFeedError;
use crate::mapping::ColumnMapping;
use crate::parser::{FixedColumnLayout, TextRecordParser};
use crate::security::SecurityConfig;
use crate::types::AppendResult;
use crate::writer::SpreadsheetWriter;

/// 一括変換の入口
///
/// テキストレポート1ファイルを解析し、マッピングを適用して
/// スプレッドシートを生成・追記します。実行モード（フォルダ監視）の
/// 対話的な対向となる、1回きりの変換に使用します。
///
/// # 使用例
///
/// ```rust,no_run
/// use std::path::Path;
/// use sheetfeed::{ColumnMapping, IngestorBuilder};
///
/// fn main() -> Result<(), sheetfeed::SheetFeedError> {
///     let ingestor = IngestorBuilder::new().build()?;
///     let mappings = vec![ColumnMapping::vertical(0, 0, 0)];
///     let result = ingestor.convert_file(
///         Path::new("report.txt"),
///         &mappings,
///         Path::new("output.xlsx"),
///     )?;
///     println!("{} rows written", result.rows_added);
///     Ok(())
/// }
/// ```
pub struct Ingestor {
    parser: TextRecordParser,
    writer: SpreadsheetWriter,
}

impl Ingestor {
    /// 内部パーサーへの参照を取得
    pub fn parser(&self) -> &TextRecordParser {
        &self.parser
    }

    /// テキストレポートを新規スプレッドシートへ変換
    ///
    /// 解析が空のテーブルへ縮退した場合も警告ログの上で処理を継続し、
    /// 0行のドキュメントを生成します。
    pub fn convert_file(
        &self,
        input: &Path,
        mappings: &[ColumnMapping],
        target: &Path,
    ) -> Result<AppendResult, SheetFeedError> {
        let table = self.parser.parse_file(input);
        if table.is_empty() {
            warn!(input = %input.display(), "Parse produced no rows, nothing to process");
        }
        self.writer.create(&table, mappings, target)
    }

    /// テキストレポートを既存スプレッドシートへ追記
    ///
    /// 失敗は[`AppendResult`]で分類して返されます（エラー伝播
    /// しません）。
    pub fn append_file(
        &self,
        input: &Path,
        mappings: &[ColumnMapping],
        target: &Path,
    ) -> AppendResult {
        let table = self.parser.parse_file(input);
        if table.is_empty() {
            warn!(input = %input.display(), "Parse produced no rows, nothing to process");
        }
        self.writer.append(&table, mappings, target)
    }
}

/// Fluent Builder APIを提供する構造体
///
/// `Ingestor`インスタンスを段階的に構築するためのビルダーです。
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみを
/// オーバーライドできます。
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetfeed::IngestorBuilder;
///
/// # fn main() -> Result<(), sheetfeed::SheetFeedError> {
/// let ingestor = IngestorBuilder::new()
///     .with_width_config_path("column_widths.json")
///     .with_sheet_name("Inspection")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct IngestorBuilder {
    width_config_path: Option<PathBuf>,
    security: Option<SecurityConfig>,
    sheet_name: Option<String>,
}

impl IngestorBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - 固定幅列レイアウト: 組み込みの9列幅テーブル
    /// - セキュリティ制限: 既定値（入力64MB、100万行）
    /// - シート名: "Sheet1"
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定幅列パーサーの列幅設定ファイルを指定する
    ///
    /// ファイルが存在しない・読み取れない場合は警告ログの上で
    /// 組み込みのレイアウトへフォールバックします。
    pub fn with_width_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.width_config_path = Some(path.into());
        self
    }

    /// セキュリティ制限を指定する
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = Some(security);
        self
    }

    /// 出力ドキュメントのシート名を指定する
    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = Some(name.into());
        self
    }

    /// 設定を検証して`Ingestor`を構築する
    ///
    /// # エラー
    ///
    /// シート名が空の場合は`Config`エラーになります。
    pub fn build(self) -> Result<Ingestor, SheetFeedError> {
        let sheet_name = self.sheet_name.unwrap_or_else(|| "Sheet1".to_string());
        if sheet_name.trim().is_empty() {
            return Err(SheetFeedError::Config(
                "Sheet name must not be empty".to_string(),
            ));
        }

        let layout = match &self.width_config_path {
            Some(path) => FixedColumnLayout::load(path),
            None => FixedColumnLayout::default(),
        };

        let mut parser = TextRecordParser::with_layout(layout);
        if let Some(security) = self.security {
            parser = parser.with_security(security);
        }

        Ok(Ingestor {
            parser,
            writer: SpreadsheetWriter::new().with_sheet_name(sheet_name),
        })
    }
}
