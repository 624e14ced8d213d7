//! ファイル照合キーの抽出
//!
//! 異なる監視フォルダに到着したファイルを1つの論理バッチとして
//! 対応付けるための照合キーを、ファイル名から導出するモジュール。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::api::MatchKeyStrategy;

/// 照合キー抽出器
#[derive(Debug, Clone, Copy)]
pub struct MatchKeyExtractor {
    strategy: MatchKeyStrategy,
}

impl MatchKeyExtractor {
    /// 指定戦略の抽出器を生成
    pub fn new(strategy: MatchKeyStrategy) -> Self {
        Self { strategy }
    }

    /// 使用中の戦略を取得
    pub fn strategy(&self) -> MatchKeyStrategy {
        self.strategy
    }

    /// ファイル名から照合キーを導出
    ///
    /// まず拡張子を取り除き、`Prefix`戦略では最初のアンダースコア
    /// より前の部分（なければステム全体）、`ExactBasename`戦略では
    /// ステム全体を返します。
    pub fn key(&self, filename: &str) -> String {
        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        match self.strategy {
            MatchKeyStrategy::Prefix => stem
                .split('_')
                .next()
                .unwrap_or(&stem)
                .to_string(),
            MatchKeyStrategy::ExactBasename => stem,
        }
    }

    /// パスのファイル名部分から照合キーを導出
    pub fn key_for_path(&self, path: &Path) -> String {
        path.file_name()
            .map(|name| self.key(&name.to_string_lossy()))
            .unwrap_or_default()
    }

    /// 全スロットが共有する単一の照合キーを求める
    ///
    /// すべてのスロットのキーが互いに等しい場合のみそのキーを返し、
    /// 1つでも異なる（または空の）場合は`None`（共通キーなし）です。
    pub fn find_common_match_key(&self, slots: &BTreeMap<u8, PathBuf>) -> Option<String> {
        let mut iter = slots.values();
        let first = self.key_for_path(iter.next()?);

        for path in iter {
            if self.key_for_path(path) != first {
                return None;
            }
        }
        Some(first)
    }
}
