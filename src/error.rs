//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use thiserror::Error;

/// sheetfeedクレート全体で使用するエラー型
///
/// テキストレポートの解析、マッピング設定の読み込み、スプレッドシートの
/// 生成処理中に発生するエラーを統一的に扱うために使用されます。
///
/// # 注意
///
/// 追記操作の失敗（対象ファイル不在、ロック、破損）はエラーではなく
/// [`AppendResult`](crate::AppendResult)の値として呼び出し側に返されます。
/// 長時間稼働するウォッチャーが1件の失敗で停止しないための設計です。
#[derive(Error, Debug)]
pub enum SheetFeedError {
    /// I/O操作中に発生したエラー
    ///
    /// ファイルの読み込み失敗、書き込み失敗など、標準ライブラリの
    /// `std::io::Error`が発生した場合に使用されます。
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 既存スプレッドシートの読み込み中に発生したエラー
    ///
    /// calamineクレートがワークブックを解析する際に発生したエラーです。
    #[error("Failed to read workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),

    /// スプレッドシートの書き出し中に発生したエラー
    ///
    /// rust_xlsxwriterクレートがワークブックを生成・保存する際に
    /// 発生したエラーです。
    #[error("Failed to write workbook: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    /// JSON設定ファイルの解析エラー
    ///
    /// マッピングファイルや列幅設定ファイルの読み込み時に発生します。
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ファイル監視の登録・解除エラー
    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    /// 設定の検証に失敗したエラー
    ///
    /// `IngestorBuilder::build()`時に設定を検証し、無効な設定が検出された
    /// 場合に発生します。例えば、監視間隔が0の場合や、マッピングファイルの
    /// スキーマが不正な場合などです。
    #[error("Configuration error: {0}")]
    Config(String),

    /// ファイルスロットの契約違反
    ///
    /// スロット番号が1..=10の範囲外、または監視対象フォルダが存在しない
    /// 場合に、監視開始前の設定時点で同期的に発生します（監視中には
    /// 発生しません）。
    #[error("Slot validation error: {0}")]
    SlotValidation(String),

    /// アーカイブ操作（移動・コピー）のエラー
    #[error("Archive error: {0}")]
    Archive(String),
}

impl From<fs_extra::error::Error> for SheetFeedError {
    fn from(err: fs_extra::error::Error) -> Self {
        SheetFeedError::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error: SheetFeedError = io_err.into();

        match error {
            SheetFeedError::Io(e) => {
                assert_eq!(e.kind(), io::ErrorKind::NotFound);
                assert_eq!(e.to_string(), "File not found");
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied");
        let error: SheetFeedError = io_err.into();

        let error_msg = error.to_string();
        assert!(error_msg.contains("IO error"));
        assert!(error_msg.contains("Permission denied"));
    }

    #[test]
    fn test_config_error() {
        let error = SheetFeedError::Config("Scan interval must be at least 1 second".to_string());

        match error {
            SheetFeedError::Config(msg) => {
                assert_eq!(msg, "Scan interval must be at least 1 second");
            }
            _ => panic!("Expected Config error"),
        }
    }

    #[test]
    fn test_config_error_display() {
        let error = SheetFeedError::Config("Invalid cell reference: '1A'".to_string());
        let error_msg = error.to_string();

        assert!(error_msg.contains("Configuration error"));
        assert!(error_msg.contains("Invalid cell reference: '1A'"));
    }

    #[test]
    fn test_slot_validation_error_display() {
        let error = SheetFeedError::SlotValidation("Slot 11 is out of range (1..=10)".to_string());
        let error_msg = error.to_string();

        assert!(error_msg.contains("Slot validation error"));
        assert!(error_msg.contains("Slot 11"));
    }

    #[test]
    fn test_error_conversion_with_question_mark() {
        fn io_operation() -> Result<(), SheetFeedError> {
            let _file = std::fs::File::open("nonexistent_report.txt")?;
            Ok(())
        }

        let result = io_operation();
        assert!(result.is_err());

        match result {
            Err(SheetFeedError::Io(_)) => {}
            _ => panic!("Expected Io error from ? operator"),
        }
    }

    #[test]
    fn test_json_error_conversion() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let error: SheetFeedError = result.unwrap_err().into();

        match error {
            SheetFeedError::Json(_) => {}
            _ => panic!("Expected Json error"),
        }
    }

    #[test]
    fn test_all_error_formats() {
        // Io
        let io_err: SheetFeedError = io::Error::other("test io").into();
        assert!(io_err.to_string().starts_with("IO error"));

        // Config
        let config_err = SheetFeedError::Config("test config".to_string());
        assert!(config_err.to_string().starts_with("Configuration error"));

        // SlotValidation
        let slot_err = SheetFeedError::SlotValidation("test slot".to_string());
        assert!(slot_err.to_string().starts_with("Slot validation error"));

        // Archive
        let archive_err = SheetFeedError::Archive("test archive".to_string());
        assert!(archive_err.to_string().starts_with("Archive error"));
    }
}
