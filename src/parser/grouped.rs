//! グループ化ブロック形式のパーサー
//!
//! 測定要素のヘッダー行（例: `Circle_1 (ID: C001)`）の配下に
//! `label = value1 value2 ...` 行が続く形式を解析します。各行は
//! `[ヘッダー, ラベル, 値...]` の形に展開され、固定幅7列まで
//! 空文字列で右パディングされます。

use super::grouped_header_re;

/// グループ化ブロック形式の行幅
const ROW_WIDTH: usize = 7;

/// グループ化ブロック形式を解析
///
/// 空行、およびヘッダー配下にない行・`=`を含まない行は無視されます。
pub(super) fn parse(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut current_header: Option<String> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if grouped_header_re().is_match(line) {
            current_header = Some(trimmed.to_string());
            continue;
        }

        let Some(header) = &current_header else {
            // 最初のヘッダーより前の行は無視
            continue;
        };

        let Some(eq_pos) = line.find('=') else {
            continue;
        };

        let label = line[..eq_pos].trim();
        let mut row = Vec::with_capacity(ROW_WIDTH);
        row.push(header.clone());
        row.push(label.to_string());
        row.extend(line[eq_pos + 1..].split_whitespace().map(str::to_string));

        while row.len() < ROW_WIDTH {
            row.push(String::new());
        }
        rows.push(row);
    }

    rows
}
