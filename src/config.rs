//! Configuration Module
//!
//! ユーザーが編集するマッピングファイル（JSON）の読み込みと検証を
//! 実装するモジュール。レガシーのフラット配列形式と、スキーマ
//! バージョン2.0のオブジェクト形式の両方を受け付け、レガシー形式は
//! メモリ上で2.0形式へアップグレードされます。

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::api::{ArchiveMode, Direction, MatchKeyStrategy, RowPatternKind, TimestampFormat};
use crate::error::SheetFeedError;
use crate::mapping::{ColumnMapping, RowSelector};
use crate::types::{column_index_from_id, parse_cell_ref};

/// ファイルスロットの許容範囲
pub const SLOT_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// 現在のスキーマバージョン
pub const SCHEMA_VERSION: &str = "2.0";

/// 行パターンのJSON表現
#[derive(Debug, Clone, Deserialize)]
struct RawRowPattern {
    #[serde(rename = "type")]
    kind: RowPatternKind,
    #[serde(default)]
    start: usize,
}

/// 列識別子のJSON表現（整数または文字）
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawColumnId {
    Index(u32),
    Name(String),
}

impl RawColumnId {
    fn resolve(&self) -> Result<u32, SheetFeedError> {
        match self {
            RawColumnId::Index(i) => Ok(*i),
            RawColumnId::Name(name) => column_index_from_id(name).ok_or_else(|| {
                SheetFeedError::Config(format!("Invalid source column identifier: '{name}'"))
            }),
        }
    }
}

/// レガシー形式のマッピングエントリ
///
/// `{"sourceColumn": 1, "startCell": "A1", "direction": "vertical", ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMappingEntry {
    source_column: u32,
    start_cell: String,
    direction: Direction,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    row_pattern: Option<RawRowPattern>,
    #[serde(default)]
    row_indexes: Option<Vec<usize>>,
}

/// バージョン2.0形式のマッピングエントリ
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionedMappingEntry {
    #[serde(default = "default_slot")]
    source_file_slot: u8,
    source_column: RawColumnId,
    target_cell: String,
    direction: Direction,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    row_pattern: Option<RawRowPattern>,
    #[serde(default)]
    row_indexes: Option<Vec<usize>>,
}

fn default_slot() -> u8 {
    1
}

/// ファイルスロットの定義
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSlotDef {
    /// スロット番号（1..=10）
    pub slot: u8,

    /// スロットの説明（例: "CMM export"）
    #[serde(default)]
    pub description: String,
}

/// 監視フォルダの定義
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchFolderDef {
    /// 紐付くスロット番号
    pub slot: u8,

    /// 監視対象フォルダのパス
    pub path: PathBuf,
}

/// 監視動作の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// 対象とするファイル拡張子
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// 単一ソースモードのスキャン間隔（秒）
    #[serde(default = "default_scan_interval")]
    pub scan_interval_seconds: u64,

    /// 安定性チェックの観測ウィンドウ（秒）
    #[serde(default = "default_stability_window")]
    pub stability_window_seconds: u64,

    /// 安定性チェックの最大リトライ回数
    #[serde(default = "default_stability_retries")]
    pub stability_retries: u32,

    /// 照合キーの抽出戦略
    #[serde(default = "default_match_strategy")]
    pub match_key_strategy: MatchKeyStrategy,

    /// 監視フォルダのリスト（マルチソースモード）
    #[serde(default)]
    pub folders: Vec<WatchFolderDef>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            scan_interval_seconds: default_scan_interval(),
            stability_window_seconds: default_stability_window(),
            stability_retries: default_stability_retries(),
            match_key_strategy: default_match_strategy(),
            folders: Vec::new(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["txt".to_string()]
}

fn default_scan_interval() -> u64 {
    5
}

fn default_stability_window() -> u64 {
    2
}

fn default_stability_retries() -> u32 {
    5
}

fn default_match_strategy() -> MatchKeyStrategy {
    MatchKeyStrategy::Prefix
}

/// アーカイブ動作の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveConfig {
    /// アーカイブの出力ルート
    pub output_root: PathBuf,

    /// アーカイブフォルダ名（省略時はマッピング名または "Merged Data"）
    #[serde(default)]
    pub name: Option<String>,

    /// タイムスタンプ形式
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: TimestampFormat,

    /// 入力ファイルのアーカイブ方法
    #[serde(default = "default_archive_mode")]
    pub mode: ArchiveMode,
}

fn default_timestamp_format() -> TimestampFormat {
    TimestampFormat::DateOnly
}

fn default_archive_mode() -> ArchiveMode {
    ArchiveMode::Move
}

/// バージョン2.0形式のドキュメント
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVersionedDocument {
    schema_version: String,
    #[serde(default)]
    file_slots: Vec<FileSlotDef>,
    mappings: Vec<VersionedMappingEntry>,
    #[serde(default)]
    watch_config: Option<WatchConfig>,
    #[serde(default)]
    archive_config: Option<ArchiveConfig>,
}

/// マッピングファイル全体のJSON表現
///
/// バージョン付きオブジェクトか、レガシーのフラット配列のどちらか。
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawMappingFile {
    Versioned(RawVersionedDocument),
    Legacy(Vec<LegacyMappingEntry>),
}

/// 読み込み・検証済みのマッピングドキュメント
///
/// レガシー形式はデフォルトスロット1つを持つ2.0形式へアップグレード
/// された状態で保持されます。
#[derive(Debug, Clone)]
pub struct MappingDocument {
    /// スキーマバージョン（常に "2.0"）
    pub schema_version: String,

    /// ファイルスロットの定義
    pub file_slots: Vec<FileSlotDef>,

    /// マッピングのリスト
    pub mappings: Vec<ColumnMapping>,

    /// 監視設定（省略可）
    pub watch_config: Option<WatchConfig>,

    /// アーカイブ設定（省略可）
    pub archive_config: Option<ArchiveConfig>,
}

impl MappingDocument {
    /// JSON文字列からドキュメントを読み込む
    pub fn from_json_str(content: &str) -> Result<Self, SheetFeedError> {
        let raw: RawMappingFile = serde_json::from_str(content)?;
        let document = match raw {
            RawMappingFile::Versioned(doc) => Self::from_versioned(doc)?,
            RawMappingFile::Legacy(entries) => Self::from_legacy(entries)?,
        };
        document.validate()?;
        Ok(document)
    }

    /// ファイルからドキュメントを読み込む
    pub fn load(path: &Path) -> Result<Self, SheetFeedError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    fn from_versioned(doc: RawVersionedDocument) -> Result<Self, SheetFeedError> {
        if doc.schema_version != SCHEMA_VERSION {
            return Err(SheetFeedError::Config(format!(
                "Unsupported schema version: '{}' (expected '{SCHEMA_VERSION}')",
                doc.schema_version
            )));
        }

        let file_slots = if doc.file_slots.is_empty() {
            vec![FileSlotDef {
                slot: 1,
                description: String::new(),
            }]
        } else {
            doc.file_slots
        };

        let mut mappings = Vec::with_capacity(doc.mappings.len());
        for entry in doc.mappings {
            let (target_row, target_col) =
                parse_cell_ref(&entry.target_cell).ok_or_else(|| {
                    SheetFeedError::Config(format!(
                        "Invalid target cell reference: '{}'",
                        entry.target_cell
                    ))
                })?;
            mappings.push(ColumnMapping {
                source_column: entry.source_column.resolve()?,
                source_file_slot: entry.source_file_slot,
                target_row,
                target_col: narrow_column(target_col)?,
                direction: entry.direction,
                row_selector: row_selector_from(entry.row_indexes, entry.row_pattern),
                title: entry.title,
            });
        }

        Ok(Self {
            schema_version: SCHEMA_VERSION.to_string(),
            file_slots,
            mappings,
            watch_config: doc.watch_config,
            archive_config: doc.archive_config,
        })
    }

    /// レガシー形式をメモリ上で2.0形式へアップグレード
    fn from_legacy(entries: Vec<LegacyMappingEntry>) -> Result<Self, SheetFeedError> {
        let mut mappings = Vec::with_capacity(entries.len());
        for entry in entries {
            let (target_row, target_col) = parse_cell_ref(&entry.start_cell).ok_or_else(|| {
                SheetFeedError::Config(format!(
                    "Invalid start cell reference: '{}'",
                    entry.start_cell
                ))
            })?;
            mappings.push(ColumnMapping {
                source_column: entry.source_column,
                source_file_slot: 1,
                target_row,
                target_col: narrow_column(target_col)?,
                direction: entry.direction,
                row_selector: row_selector_from(entry.row_indexes, entry.row_pattern),
                title: entry.title,
            });
        }

        Ok(Self {
            schema_version: SCHEMA_VERSION.to_string(),
            file_slots: vec![FileSlotDef {
                slot: 1,
                description: String::new(),
            }],
            mappings,
            watch_config: None,
            archive_config: None,
        })
    }

    /// スロット契約の検証
    ///
    /// スロット番号が1..=10の範囲内であること、およびマッピングの
    /// 参照するスロットが定義済みであることを検証します。違反は
    /// 設定時点で同期的にエラーになります。
    fn validate(&self) -> Result<(), SheetFeedError> {
        for slot_def in &self.file_slots {
            if !SLOT_RANGE.contains(&slot_def.slot) {
                return Err(SheetFeedError::SlotValidation(format!(
                    "Slot {} is out of range (1..=10)",
                    slot_def.slot
                )));
            }
        }

        for mapping in &self.mappings {
            if !SLOT_RANGE.contains(&mapping.source_file_slot) {
                return Err(SheetFeedError::SlotValidation(format!(
                    "Mapping references slot {} which is out of range (1..=10)",
                    mapping.source_file_slot
                )));
            }
            if !self
                .file_slots
                .iter()
                .any(|def| def.slot == mapping.source_file_slot)
            {
                return Err(SheetFeedError::SlotValidation(format!(
                    "Mapping references undefined slot {}",
                    mapping.source_file_slot
                )));
            }
        }

        if let Some(watch) = &self.watch_config {
            for folder in &watch.folders {
                if !SLOT_RANGE.contains(&folder.slot) {
                    return Err(SheetFeedError::SlotValidation(format!(
                        "Watch folder slot {} is out of range (1..=10)",
                        folder.slot
                    )));
                }
            }
        }

        Ok(())
    }
}

/// 行セレクタをJSON表現から構築
///
/// 明示的なインデックスリストが優先され、どちらも省略された場合は
/// 先頭からの全行選択になります。
fn row_selector_from(
    row_indexes: Option<Vec<usize>>,
    row_pattern: Option<RawRowPattern>,
) -> RowSelector {
    if let Some(indexes) = row_indexes {
        return RowSelector::Explicit(indexes);
    }
    if let Some(pattern) = row_pattern {
        return RowSelector::Generated {
            kind: pattern.kind,
            start: pattern.start,
        };
    }
    RowSelector::Generated {
        kind: RowPatternKind::All,
        start: 0,
    }
}

fn narrow_column(col: u32) -> Result<u16, SheetFeedError> {
    u16::try_from(col)
        .map_err(|_| SheetFeedError::Config(format!("Column index {col} exceeds sheet limits")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_JSON: &str = r#"[
        {"sourceColumn": 2, "startCell": "B2", "direction": "vertical",
         "title": "Measured", "rowPattern": {"type": "odd", "start": 0}},
        {"sourceColumn": 0, "startCell": "A1", "direction": "horizontal",
         "rowIndexes": [0, 2, 4]}
    ]"#;

    const VERSIONED_JSON: &str = r#"{
        "schemaVersion": "2.0",
        "fileSlots": [
            {"slot": 1, "description": "CMM export"},
            {"slot": 2, "description": "Roughness tester"}
        ],
        "mappings": [
            {"sourceFileSlot": 1, "sourceColumn": "C", "targetCell": "A2",
             "direction": "vertical", "title": "Diameter"},
            {"sourceFileSlot": 2, "sourceColumn": 1, "targetCell": "D2",
             "direction": "vertical"}
        ],
        "watchConfig": {
            "extensions": ["txt", "dat"],
            "stabilityWindowSeconds": 3,
            "folders": [
                {"slot": 1, "path": "/data/cmm"},
                {"slot": 2, "path": "/data/roughness"}
            ]
        },
        "archiveConfig": {
            "outputRoot": "/data/out",
            "timestampFormat": "date_time",
            "mode": "copy"
        }
    }"#;

    #[test]
    fn test_legacy_file_upgraded_to_versioned_shape() {
        let doc = MappingDocument::from_json_str(LEGACY_JSON).unwrap();

        assert_eq!(doc.schema_version, "2.0");
        assert_eq!(doc.file_slots.len(), 1);
        assert_eq!(doc.file_slots[0].slot, 1);
        assert_eq!(doc.mappings.len(), 2);

        let first = &doc.mappings[0];
        assert_eq!(first.source_column, 2);
        assert_eq!(first.source_file_slot, 1);
        assert_eq!((first.target_row, first.target_col), (1, 1));
        assert_eq!(first.direction, Direction::Vertical);
        assert_eq!(first.title.as_deref(), Some("Measured"));
        assert_eq!(
            first.row_selector,
            RowSelector::Generated {
                kind: RowPatternKind::Odd,
                start: 0
            }
        );

        let second = &doc.mappings[1];
        assert_eq!(second.row_selector, RowSelector::Explicit(vec![0, 2, 4]));
    }

    #[test]
    fn test_versioned_file_parsed() {
        let doc = MappingDocument::from_json_str(VERSIONED_JSON).unwrap();

        assert_eq!(doc.file_slots.len(), 2);
        assert_eq!(doc.file_slots[1].description, "Roughness tester");

        // 文字列の列識別子は基数26で解決される
        assert_eq!(doc.mappings[0].source_column, 2);
        assert_eq!(doc.mappings[1].source_column, 1);
        assert_eq!(doc.mappings[1].source_file_slot, 2);

        let watch = doc.watch_config.unwrap();
        assert_eq!(watch.extensions, vec!["txt", "dat"]);
        assert_eq!(watch.stability_window_seconds, 3);
        assert_eq!(watch.scan_interval_seconds, 5);
        assert_eq!(watch.folders.len(), 2);

        let archive = doc.archive_config.unwrap();
        assert_eq!(archive.timestamp_format, TimestampFormat::DateTime);
        assert_eq!(archive.mode, ArchiveMode::Copy);
    }

    #[test]
    fn test_unsupported_schema_version_rejected() {
        let json = r#"{"schemaVersion": "3.0", "mappings": []}"#;
        let result = MappingDocument::from_json_str(json);

        match result {
            Err(SheetFeedError::Config(msg)) => assert!(msg.contains("schema version")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_slot_out_of_range_rejected_synchronously() {
        let json = r#"{
            "schemaVersion": "2.0",
            "fileSlots": [{"slot": 11}],
            "mappings": []
        }"#;
        let result = MappingDocument::from_json_str(json);

        match result {
            Err(SheetFeedError::SlotValidation(msg)) => assert!(msg.contains("11")),
            other => panic!("Expected SlotValidation error, got {other:?}"),
        }
    }

    #[test]
    fn test_slot_zero_rejected() {
        let json = r#"{
            "schemaVersion": "2.0",
            "fileSlots": [{"slot": 0}],
            "mappings": []
        }"#;
        assert!(matches!(
            MappingDocument::from_json_str(json),
            Err(SheetFeedError::SlotValidation(_))
        ));
    }

    #[test]
    fn test_mapping_referencing_undefined_slot_rejected() {
        let json = r#"{
            "schemaVersion": "2.0",
            "fileSlots": [{"slot": 1}],
            "mappings": [
                {"sourceFileSlot": 2, "sourceColumn": 0, "targetCell": "A1",
                 "direction": "vertical"}
            ]
        }"#;
        assert!(matches!(
            MappingDocument::from_json_str(json),
            Err(SheetFeedError::SlotValidation(_))
        ));
    }

    #[test]
    fn test_invalid_target_cell_rejected() {
        let json = r#"{
            "schemaVersion": "2.0",
            "mappings": [
                {"sourceColumn": 0, "targetCell": "2B", "direction": "vertical"}
            ]
        }"#;
        assert!(matches!(
            MappingDocument::from_json_str(json),
            Err(SheetFeedError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_column_identifier_rejected() {
        let json = r#"{
            "schemaVersion": "2.0",
            "mappings": [
                {"sourceColumn": "A1", "targetCell": "A1", "direction": "vertical"}
            ]
        }"#;
        assert!(matches!(
            MappingDocument::from_json_str(json),
            Err(SheetFeedError::Config(_))
        ));
    }

    #[test]
    fn test_missing_selectors_default_to_all_rows() {
        let json = r#"[
            {"sourceColumn": 0, "startCell": "A1", "direction": "vertical"}
        ]"#;
        let doc = MappingDocument::from_json_str(json).unwrap();
        assert_eq!(
            doc.mappings[0].row_selector,
            RowSelector::Generated {
                kind: RowPatternKind::All,
                start: 0
            }
        );
    }

    #[test]
    fn test_explicit_indexes_take_precedence_over_pattern() {
        let json = r#"[
            {"sourceColumn": 0, "startCell": "A1", "direction": "vertical",
             "rowPattern": {"type": "odd", "start": 0}, "rowIndexes": [5]}
        ]"#;
        let doc = MappingDocument::from_json_str(json).unwrap();
        assert_eq!(doc.mappings[0].row_selector, RowSelector::Explicit(vec![5]));
    }

    #[test]
    fn test_malformed_json_yields_json_error() {
        assert!(matches!(
            MappingDocument::from_json_str("{oops"),
            Err(SheetFeedError::Json(_))
        ));
    }
}
