//! 固定幅列形式のパーサー
//!
//! 外部設定された列名→幅の順序付きマップに従い、各行を累積幅で
//! スライスします。設定ファイルが存在しないか読み取れない場合は
//! 組み込みの9列幅テーブルへフォールバックします。

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::SheetFeedError;

/// 組み込みの9列幅テーブル
///
/// 一般的な検査機エクスポートの列構成に合わせた既定値。
const DEFAULT_COLUMNS: [(&str, usize); 9] = [
    ("No", 5),
    ("Name", 10),
    ("Actual", 12),
    ("Nominal", 12),
    ("UpperTol", 10),
    ("LowerTol", 10),
    ("Deviation", 12),
    ("Histogram", 16),
    ("Check", 8),
];

/// 固定幅列レイアウト
///
/// 列名と幅の順序付きリスト。行のスライスは先頭からの累積幅で
/// 行われます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedColumnLayout {
    columns: Vec<(String, usize)>,
}

impl Default for FixedColumnLayout {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS
                .iter()
                .map(|(name, width)| (name.to_string(), *width))
                .collect(),
        }
    }
}

impl FixedColumnLayout {
    /// 列名と幅のリストからレイアウトを生成
    pub fn new(columns: Vec<(String, usize)>) -> Self {
        Self { columns }
    }

    /// JSON文字列からレイアウトを生成
    ///
    /// JSONはオブジェクト形式（`{"No": 5, "Name": 10, ...}`）で、
    /// キーの出現順が列の順序になります。
    pub fn from_json_str(content: &str) -> Result<Self, SheetFeedError> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)?;

        let mut columns = Vec::with_capacity(map.len());
        for (name, value) in map {
            let width = value.as_u64().ok_or_else(|| {
                SheetFeedError::Config(format!(
                    "Column width for '{name}' must be a non-negative integer"
                ))
            })?;
            columns.push((name, width as usize));
        }

        if columns.is_empty() {
            return Err(SheetFeedError::Config(
                "Column width config must define at least one column".to_string(),
            ));
        }

        Ok(Self { columns })
    }

    /// 設定ファイルからレイアウトを読み込む
    ///
    /// ファイルが存在しない・読み取れない・不正な場合は警告ログを
    /// 出力し、組み込みの既定レイアウトへフォールバックします。
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match Self::from_json_str(&content) {
                Ok(layout) => layout,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Invalid column width config, falling back to built-in layout"
                    );
                    Self::default()
                }
            },
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Column width config unreadable, falling back to built-in layout"
                );
                Self::default()
            }
        }
    }

    /// 列数を取得
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// 列名のリストを取得
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// 1行を累積幅でスライス
    ///
    /// 行の長さが累積幅に満たない場合、残りの列は空文字列になります。
    /// スライスは文字単位で行い、各スライスはトリムされます。
    pub(super) fn slice_line(&self, line: &str) -> Vec<String> {
        let chars: Vec<char> = line.chars().collect();
        let mut cells = Vec::with_capacity(self.columns.len());
        let mut position = 0usize;

        for (_, width) in &self.columns {
            if position >= chars.len() {
                cells.push(String::new());
                continue;
            }
            let end = (position + width).min(chars.len());
            let slice: String = chars[position..end].iter().collect();
            cells.push(slice.trim().to_string());
            position += width;
        }

        cells
    }
}

/// 固定幅列形式を解析
pub(super) fn parse(content: &str, layout: &FixedColumnLayout) -> Vec<Vec<String>> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| layout.slice_line(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_layout() -> FixedColumnLayout {
        FixedColumnLayout::new(vec![("A".to_string(), 4), ("B".to_string(), 6)])
    }

    #[test]
    fn test_default_layout_has_nine_columns() {
        let layout = FixedColumnLayout::default();
        assert_eq!(layout.column_count(), 9);
        assert_eq!(layout.column_names()[0], "No");
    }

    #[test]
    fn test_slice_line_by_cumulative_width() {
        let layout = two_column_layout();
        let cells = layout.slice_line("  1   N001");

        assert_eq!(cells, vec!["1".to_string(), "N001".to_string()]);
    }

    #[test]
    fn test_short_line_yields_empty_remainder() {
        let layout = two_column_layout();
        let cells = layout.slice_line(" 12");

        assert_eq!(cells, vec!["12".to_string(), String::new()]);
    }

    #[test]
    fn test_line_longer_than_layout_truncated() {
        let layout = two_column_layout();
        let cells = layout.slice_line("aaaabbbbbbcccc");

        assert_eq!(cells.len(), 2);
        assert_eq!(cells[1], "bbbbbb");
    }

    #[test]
    fn test_from_json_str_preserves_order() {
        let layout =
            FixedColumnLayout::from_json_str(r#"{"Zeta": 3, "Alpha": 5, "Mid": 2}"#).unwrap();
        assert_eq!(layout.column_names(), vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_from_json_str_rejects_non_integer_width() {
        let result = FixedColumnLayout::from_json_str(r#"{"A": "wide"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_str_rejects_empty_object() {
        let result = FixedColumnLayout::from_json_str("{}");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let layout = FixedColumnLayout::load(Path::new("/nonexistent/widths.json"));
        assert_eq!(layout, FixedColumnLayout::default());
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let layout = two_column_layout();
        let rows = parse("abc\n\n  \ndef\n", &layout);
        assert_eq!(rows.len(), 2);
    }
}
