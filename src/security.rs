//! Security Module
//!
//! 入力の肥大化対策を実装するモジュール。
//! 無人運転中に巨大な、あるいは壊れたレポートファイルがメモリを
//! 使い尽くさないよう、解析前後に上限を適用します。

/// セキュリティ設定
///
/// テキストレポート処理時のサイズ制限を定義します。
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// 入力ファイルの最大サイズ（バイト）
    /// デフォルト: 64MB (67_108_864 bytes)
    pub max_input_file_size: u64,
    /// 入力ファイルの最大行数
    /// デフォルト: 1_000_000
    pub max_line_count: usize,
    /// 解析済みテーブルの最大セル数（行数 × 最大列数）
    /// デフォルト: 8_000_000
    pub max_cell_count: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_input_file_size: 67_108_864, // 64MB
            max_line_count: 1_000_000,
            max_cell_count: 8_000_000,
        }
    }
}

impl SecurityConfig {
    /// デフォルトのセキュリティ設定を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 入力サイズが上限内かを検証
    pub(crate) fn check_input_size(&self, size: u64) -> Result<(), String> {
        if size > self.max_input_file_size {
            return Err(format!(
                "Input file size exceeds maximum: {} bytes (max: {} bytes)",
                size, self.max_input_file_size
            ));
        }
        Ok(())
    }

    /// 行数が上限内かを検証
    pub(crate) fn check_line_count(&self, lines: usize) -> Result<(), String> {
        if lines > self.max_line_count {
            return Err(format!(
                "Input line count exceeds maximum: {} lines (max: {})",
                lines, self.max_line_count
            ));
        }
        Ok(())
    }

    /// セル数が上限内かを検証
    pub(crate) fn check_cell_count(&self, cells: usize) -> Result<(), String> {
        if cells > self.max_cell_count {
            return Err(format!(
                "Parsed cell count exceeds maximum: {} cells (max: {})",
                cells, self.max_cell_count
            ));
        }
        Ok(())
    }
}
