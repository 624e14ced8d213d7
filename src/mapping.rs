//! Mapping Module
//!
//! 列→セルマッピングの適用アルゴリズムを実装するモジュール。
//! 解析済みテーブルとマッピングリストから、スパースなセル書き込みの
//! 順序付きシーケンスを算出します。

use tracing::warn;

use crate::api::{Direction, MissingColumnPolicy, RowPatternKind};
use crate::types::{CellWrite, ParsedTable};

/// 行セレクタ
///
/// マッピングが消費するソース行の指定方法。明示的なインデックス
/// リストか、生成パターンのどちらかです。マッピング適用前に具体的な
/// リストへ解決されます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSelector {
    /// 明示的な0始まり行インデックスの順序付きリスト
    Explicit(Vec<usize>),

    /// パターンから生成（開始インデックス以降の奇数行/偶数行/全行）
    Generated {
        kind: RowPatternKind,
        start: usize,
    },
}

impl RowSelector {
    /// セレクタを具体的な行インデックスリストへ解決
    ///
    /// 明示リストはそのまま返します（範囲外の行はマッピング適用時に
    /// スキップされます）。生成パターンはテーブルの行数を上限として
    /// 展開されます。
    pub fn resolve(&self, total_rows: usize) -> Vec<usize> {
        match self {
            RowSelector::Explicit(indexes) => indexes.clone(),
            RowSelector::Generated { kind, start } => generate_indexes(total_rows, *kind, *start),
        }
    }
}

/// パターンから行インデックスリストを生成
///
/// 奇偶の判定は1始まりの行番号で行います。0始まりインデックス`i`の
/// 行番号は`i + 1`なので、`Odd`は偶数インデックス、`Even`は奇数
/// インデックスを選択します。
///
/// # 例
///
/// ```
/// use sheetfeed::{generate_indexes, RowPatternKind};
///
/// assert_eq!(generate_indexes(10, RowPatternKind::Odd, 0), vec![0, 2, 4, 6, 8]);
/// assert_eq!(generate_indexes(10, RowPatternKind::Even, 0), vec![1, 3, 5, 7, 9]);
/// assert_eq!(generate_indexes(4, RowPatternKind::All, 0), vec![0, 1, 2, 3]);
/// ```
pub fn generate_indexes(total: usize, kind: RowPatternKind, start: usize) -> Vec<usize> {
    (start..total)
        .filter(|i| match kind {
            RowPatternKind::All => true,
            RowPatternKind::Odd => (i + 1) % 2 == 1,
            RowPatternKind::Even => (i + 1) % 2 == 0,
        })
        .collect()
}

/// 1本の列→セルマッピング
///
/// どのソース列をどのターゲットセルからどの方向に書き込むかの規則。
/// 座標はすべて0始まりです。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// ソース列インデックス（0始まり）
    pub source_column: u32,

    /// マルチソースモードでこのマッピングが消費するファイルスロット
    ///
    /// 単一ソースモードでは無視されます。
    pub source_file_slot: u8,

    /// ターゲットアンカーの行（0始まり）
    pub target_row: u32,

    /// ターゲットアンカーの列（0始まり）
    pub target_col: u16,

    /// 書き込み方向
    pub direction: Direction,

    /// 行セレクタ
    pub row_selector: RowSelector,

    /// タイトル（アンカーの1単位手前に書き込まれる）
    ///
    /// 計算された位置が負になる場合は書き込まれず、警告とともに
    /// 破棄されます。
    pub title: Option<String>,
}

impl ColumnMapping {
    /// 縦方向マッピングを生成するヘルパー
    pub fn vertical(source_column: u32, target_row: u32, target_col: u16) -> Self {
        Self {
            source_column,
            source_file_slot: 1,
            target_row,
            target_col,
            direction: Direction::Vertical,
            row_selector: RowSelector::Generated {
                kind: RowPatternKind::All,
                start: 0,
            },
            title: None,
        }
    }

    /// 横方向マッピングを生成するヘルパー
    pub fn horizontal(source_column: u32, target_row: u32, target_col: u16) -> Self {
        Self {
            direction: Direction::Horizontal,
            ..Self::vertical(source_column, target_row, target_col)
        }
    }

    /// タイトルを設定
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// 行セレクタを設定
    pub fn with_row_selector(mut self, selector: RowSelector) -> Self {
        self.row_selector = selector;
        self
    }

    /// ファイルスロットを設定
    pub fn with_slot(mut self, slot: u8) -> Self {
        self.source_file_slot = slot;
        self
    }
}

/// マッピング適用の結果
///
/// データ書き込みとタイトル書き込みは分離されます。追記時、データは
/// オフセットへ再アンカーされる一方、タイトルは固定位置に留まり
/// 重複書き込みの判定を受けるためです。
#[derive(Debug, Clone, Default)]
pub struct MappingOutcome {
    /// データセルの書き込み（順序付き）
    pub data: Vec<CellWrite>,

    /// タイトルセルの書き込み
    pub titles: Vec<CellWrite>,

    /// 処理中に蓄積された警告
    pub warnings: Vec<String>,
}

/// マッピングエンジン
///
/// 解析済みテーブルにマッピングリストを適用し、(行, 列, 値)の
/// 書き込みシーケンスを算出します。
#[derive(Debug, Clone)]
pub struct MappingEngine {
    policy: MissingColumnPolicy,
}

impl MappingEngine {
    /// 指定ポリシーのエンジンを生成
    ///
    /// 単一ファイル追記パスは`Skip`、マージパスは`FillEmpty`を使用
    /// します。
    pub fn new(policy: MissingColumnPolicy) -> Self {
        Self { policy }
    }

    /// 適用するポリシーを取得
    pub fn policy(&self) -> MissingColumnPolicy {
        self.policy
    }

    /// マッピングリストをテーブルへ適用
    ///
    /// # 引数
    ///
    /// * `table` - 解析済みテーブル
    /// * `mappings` - 適用するマッピングの順序付きリスト
    /// * `row_base` - `None`なら新規シート（アンカー行をそのまま使用）、
    ///   `Some(offset)`なら追記（各ブロックの縦データを`offset`に
    ///   再アンカーする）
    pub fn plan(
        &self,
        table: &ParsedTable,
        mappings: &[ColumnMapping],
        row_base: Option<u32>,
    ) -> MappingOutcome {
        let mut outcome = MappingOutcome::default();
        for mapping in mappings {
            self.plan_one(table, mapping, row_base, &mut outcome);
        }
        outcome
    }

    /// 1本のマッピングを適用
    fn plan_one(
        &self,
        table: &ParsedTable,
        mapping: &ColumnMapping,
        row_base: Option<u32>,
        outcome: &mut MappingOutcome,
    ) {
        let indexes = mapping.row_selector.resolve(table.row_count());
        let col = mapping.source_column as usize;

        for (k, &source_row) in indexes.iter().enumerate() {
            // テーブル範囲外の行はスキップ（ゼロ埋めしない）
            if source_row >= table.row_count() {
                continue;
            }

            let value = match self.policy {
                MissingColumnPolicy::Skip => match table.cell(source_row, col) {
                    Some(v) => v.to_string(),
                    None => continue,
                },
                MissingColumnPolicy::FillEmpty => match table.cell_padded(source_row, col) {
                    Some(v) => v.to_string(),
                    None => continue,
                },
            };

            let Some((row, col)) = target_for(mapping, row_base, k as u32) else {
                outcome.warnings.push(format!(
                    "Cell coordinate overflow for source row {source_row}, write skipped"
                ));
                continue;
            };
            outcome.data.push(CellWrite::new(row, col, value));
        }

        self.plan_title(mapping, row_base, outcome);
    }

    /// タイトルの配置を算出
    ///
    /// 縦方向はアンカーの1行上、横方向は1列左。計算位置が負になる
    /// 場合は破棄します（負の座標に折り返さない）。追記時の横方向
    /// タイトルはブロック行（オフセット行）に配置されます。
    fn plan_title(
        &self,
        mapping: &ColumnMapping,
        row_base: Option<u32>,
        outcome: &mut MappingOutcome,
    ) {
        let Some(title) = &mapping.title else {
            return;
        };

        match mapping.direction {
            Direction::Vertical => {
                if mapping.target_row > 0 {
                    outcome.titles.push(CellWrite::new(
                        mapping.target_row - 1,
                        mapping.target_col,
                        title.clone(),
                    ));
                } else {
                    warn!(title = %title, "Title dropped: vertical anchor is at row 0");
                    outcome
                        .warnings
                        .push(format!("Title '{title}' dropped: anchor row is 0"));
                }
            }
            Direction::Horizontal => {
                if mapping.target_col > 0 {
                    let row = row_base.unwrap_or(mapping.target_row);
                    outcome
                        .titles
                        .push(CellWrite::new(row, mapping.target_col - 1, title.clone()));
                } else {
                    warn!(title = %title, "Title dropped: horizontal anchor is at column 0");
                    outcome
                        .warnings
                        .push(format!("Title '{title}' dropped: anchor column is 0"));
                }
            }
        }
    }
}

/// k番目の選択行のターゲット座標を算出
///
/// 新規シート（`row_base == None`）ではアンカー行を起点に、追記では
/// オフセット行を起点にします。アンカー行が1（タイトル行付き）でも
/// 追記ブロックのデータは`offset`から始まり、隙間行を作りません。
fn target_for(mapping: &ColumnMapping, row_base: Option<u32>, k: u32) -> Option<(u32, u16)> {
    match mapping.direction {
        Direction::Vertical => {
            let base = row_base.unwrap_or(mapping.target_row);
            Some((base.checked_add(k)?, mapping.target_col))
        }
        Direction::Horizontal => {
            let row = row_base.unwrap_or(mapping.target_row);
            let col = u32::from(mapping.target_col).checked_add(k)?;
            Some((row, u16::try_from(col).ok()?))
        }
    }
}
