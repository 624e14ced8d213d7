//! Merge Module
//!
//! マルチスロットコーディネータが発行したバッチを1つの新規
//! スプレッドシートへマージするモジュール。バッチごとに新しい
//! ドキュメントを生成するため、追記やオフセットのロジックは
//! 使用しません。コミット後、入力群と出力はアーカイブへ退避
//! されます。

use std::collections::BTreeMap;
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::api::MissingColumnPolicy;
use crate::archive::ArchiveManager;
use crate::mapping::{ColumnMapping, MappingEngine, MappingOutcome};
use crate::parser::TextRecordParser;
use crate::types::{ParsedTable, ProcessingJob};
use crate::watch::SlotBatch;
use crate::writer::SpreadsheetWriter;

/// マージプロセッサ
///
/// `{スロット → ParsedTable}` とマッピングリストから1つの出力
/// ドキュメントを生成します。マッピングはそれぞれ自分の
/// `source_file_slot`のテーブルに対して適用されます。
pub struct MergeProcessor {
    mappings: Vec<ColumnMapping>,
    parser: TextRecordParser,
    writer: SpreadsheetWriter,
    archiver: ArchiveManager,

    /// アーカイブ前に出力を生成する作業フォルダ
    staging_dir: PathBuf,
}

impl MergeProcessor {
    /// マージプロセッサを生成
    pub fn new(
        mappings: Vec<ColumnMapping>,
        parser: TextRecordParser,
        writer: SpreadsheetWriter,
        archiver: ArchiveManager,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mappings,
            parser,
            writer,
            archiver,
            staging_dir: staging_dir.into(),
        }
    }

    /// 1バッチを処理
    ///
    /// 解析→マージ→コミット→アーカイブのライフサイクルを
    /// [`ProcessingJob`]として記録し、終端状態のジョブを返します。
    /// 失敗してもパニックやエラー伝播はせず、ジョブの`Failed`状態と
    /// エラーメッセージで表現されます。
    pub fn process_batch(&self, batch: &SlotBatch) -> ProcessingJob {
        let mut job = ProcessingJob::new(batch.correlation_key.clone(), batch.files.clone());
        job.start();

        // スロットごとの解析は互いに独立なので並列に行う
        let entries: Vec<(u8, PathBuf)> = batch
            .files
            .iter()
            .map(|(slot, path)| (*slot, path.clone()))
            .collect();
        let tables: BTreeMap<u8, ParsedTable> = entries
            .par_iter()
            .map(|(slot, path)| (*slot, self.parser.parse_file(path)))
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        let outcome = self.plan_merge(&tables);
        if outcome.data.is_empty() && outcome.titles.is_empty() {
            job.fail("No mappable data in any slot");
            return job;
        }

        if let Err(err) = std::fs::create_dir_all(&self.staging_dir) {
            job.fail(format!("Cannot create staging folder: {err}"));
            return job;
        }

        let output = self
            .staging_dir
            .join(format!("{}.xlsx", batch.correlation_key));
        if let Err(err) = self.writer.create_from_outcome(&outcome, &output) {
            job.fail(format!("Merge commit failed: {err}"));
            return job;
        }

        let inputs: Vec<PathBuf> = batch.files.values().cloned().collect();
        match self.archiver.archive_batch(&inputs, &output) {
            Ok(folder) => {
                let archived_output = folder.join(format!("{}.xlsx", batch.correlation_key));
                info!(
                    key = %batch.correlation_key,
                    archive = %folder.display(),
                    "Batch merged and archived"
                );
                job.complete(archived_output, folder);
            }
            Err(err) => {
                job.fail(format!("Archive failed: {err}"));
            }
        }
        job
    }

    /// 全マッピングをスロットごとのテーブルへ適用して結合
    ///
    /// スロットにデータがないマッピングは警告の上スキップされます。
    fn plan_merge(&self, tables: &BTreeMap<u8, ParsedTable>) -> MappingOutcome {
        let engine = MappingEngine::new(MissingColumnPolicy::FillEmpty);
        let mut combined = MappingOutcome::default();

        for mapping in &self.mappings {
            match tables.get(&mapping.source_file_slot) {
                Some(table) if !table.is_empty() => {
                    let outcome = engine.plan(table, std::slice::from_ref(mapping), None);
                    combined.data.extend(outcome.data);
                    combined.titles.extend(outcome.titles);
                    combined.warnings.extend(outcome.warnings);
                }
                _ => {
                    warn!(
                        slot = mapping.source_file_slot,
                        "No data for slot, mapping skipped"
                    );
                    combined.warnings.push(format!(
                        "Mapping for slot {} skipped: no data",
                        mapping.source_file_slot
                    ));
                }
            }
        }

        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ArchiveMode, TimestampFormat};
    use crate::types::JobState;
    use calamine::{open_workbook, Data, Reader, Xlsx};
    use std::fs;
    use tempfile::TempDir;

    fn make_processor(dir: &TempDir, mappings: Vec<ColumnMapping>) -> MergeProcessor {
        let archiver = ArchiveManager::new(
            dir.path().join("out"),
            "Merged Data",
            TimestampFormat::DateTime,
            ArchiveMode::Move,
        );
        MergeProcessor::new(
            mappings,
            TextRecordParser::new(),
            SpreadsheetWriter::new(),
            archiver,
            dir.path().join("staging"),
        )
    }

    fn write_batch_files(dir: &TempDir) -> SlotBatch {
        let slot1 = dir.path().join("PART001_001.txt");
        let slot2 = dir.path().join("PART001_002.txt");
        fs::write(&slot1, "10.001  10.000\n5.502  5.500\n").unwrap();
        fs::write(&slot2, "0.8  1.6\n").unwrap();

        let mut files = BTreeMap::new();
        files.insert(1u8, slot1);
        files.insert(2u8, slot2);
        SlotBatch {
            correlation_key: "PART001".to_string(),
            files,
        }
    }

    #[test]
    fn test_merge_batch_end_to_end() {
        let dir = TempDir::new().unwrap();
        let mappings = vec![
            ColumnMapping::vertical(0, 0, 0).with_slot(1),
            ColumnMapping::vertical(0, 0, 1).with_slot(2),
        ];
        let processor = make_processor(&dir, mappings);
        let batch = write_batch_files(&dir);

        let job = processor.process_batch(&batch);
        assert_eq!(job.state(), JobState::Completed);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_some());

        let archive = job.archive_path.clone().unwrap();
        let output = job.output_path.clone().unwrap();
        assert!(output.exists());
        assert!(archive.join("inputs").join("PART001_001.txt").exists());
        assert!(archive.join("inputs").join("PART001_002.txt").exists());

        // 入力はアーカイブへ移動済み
        assert!(!dir.path().join("PART001_001.txt").exists());

        let mut workbook: Xlsx<_> = open_workbook(&output).unwrap();
        let range = workbook.worksheet_range("Sheet1").unwrap();
        assert_eq!(range.get_value((0, 0)), Some(&Data::Float(10.001)));
        assert_eq!(range.get_value((1, 0)), Some(&Data::Float(5.502)));
        assert_eq!(range.get_value((0, 1)), Some(&Data::Float(0.8)));
    }

    #[test]
    fn test_mapping_for_missing_slot_skipped() {
        let dir = TempDir::new().unwrap();
        let mappings = vec![
            ColumnMapping::vertical(0, 0, 0).with_slot(1),
            // スロット3のファイルはバッチに存在しない
            ColumnMapping::vertical(0, 0, 5).with_slot(3),
        ];
        let processor = make_processor(&dir, mappings);
        let batch = write_batch_files(&dir);

        let job = processor.process_batch(&batch);
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn test_batch_with_no_mappable_data_fails() {
        let dir = TempDir::new().unwrap();
        let mappings = vec![ColumnMapping::vertical(0, 0, 0).with_slot(5)];
        let processor = make_processor(&dir, mappings);
        let batch = write_batch_files(&dir);

        let job = processor.process_batch(&batch);
        assert_eq!(job.state(), JobState::Failed);
        assert!(job.error_message.unwrap().contains("No mappable data"));
    }

    #[test]
    fn test_each_batch_creates_fresh_document() {
        let dir = TempDir::new().unwrap();
        let mappings = vec![ColumnMapping::vertical(0, 0, 0).with_slot(1)];
        let processor = make_processor(&dir, mappings);

        let batch1 = write_batch_files(&dir);
        let job1 = processor.process_batch(&batch1);

        let batch2 = write_batch_files(&dir);
        let job2 = processor.process_batch(&batch2);

        assert_eq!(job1.state(), JobState::Completed);
        assert_eq!(job2.state(), JobState::Completed);
        // 同じキーのバッチでもアーカイブフォルダは衝突しない
        assert_ne!(job1.archive_path, job2.archive_path);
    }
}
