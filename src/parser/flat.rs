//! フラットテーブル形式のパーサー（フォールバック）
//!
//! 空行以外の各行を2文字以上の空白の連続で分割し、8列まで空文字列で
//! 右パディングします。セル内の単一スペース（例: `Part Name`）は
//! 保持されます。

use std::sync::OnceLock;

use regex::Regex;

/// フラットテーブル形式の行幅
const ROW_WIDTH: usize = 8;

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("flat-table separator pattern is valid"))
}

/// フラットテーブル形式を解析
pub(super) fn parse(content: &str) -> Vec<Vec<String>> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut row: Vec<String> = separator_re()
                .split(line.trim())
                .map(|cell| cell.trim().to_string())
                .collect();
            while row.len() < ROW_WIDTH {
                row.push(String::new());
            }
            row
        })
        .collect()
}
