//! Archive Module
//!
//! 処理済みの入力ファイルと出力スプレッドシートを、タイムスタンプ
//! 付きフォルダへ退避するモジュール。移動はfs_extraを使用し、
//! 異なるファイルシステム間でも動作します。

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use fs_extra::file::CopyOptions;
use tracing::{debug, info};

use crate::api::{ArchiveMode, TimestampFormat};
use crate::config::ArchiveConfig;
use crate::error::SheetFeedError;

/// マルチソースモードの既定アーカイブ名
pub const DEFAULT_MERGE_NAME: &str = "Merged Data";

/// 入力ファイルを格納するサブフォルダ名
const INPUTS_SUBFOLDER: &str = "inputs";

/// アーカイブマネージャ
///
/// `<outputRoot>/<name>/<timestamp>/` のフォルダを作成し、処理済みの
/// 入出力ファイルをそこへ再配置します。
#[derive(Debug, Clone)]
pub struct ArchiveManager {
    output_root: PathBuf,
    name: String,
    timestamp_format: TimestampFormat,
    mode: ArchiveMode,
}

impl ArchiveManager {
    /// アーカイブマネージャを生成
    pub fn new(
        output_root: impl Into<PathBuf>,
        name: impl Into<String>,
        timestamp_format: TimestampFormat,
        mode: ArchiveMode,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            name: name.into(),
            timestamp_format,
            mode,
        }
    }

    /// アーカイブ設定から生成
    ///
    /// 設定に名前がない場合は`fallback_name`（マッピング名または
    /// "Merged Data"）を使用します。
    pub fn from_config(config: &ArchiveConfig, fallback_name: &str) -> Self {
        Self::new(
            config.output_root.clone(),
            config.name.clone().unwrap_or_else(|| fallback_name.to_string()),
            config.timestamp_format,
            config.mode,
        )
    }

    /// アーカイブモードを取得
    pub fn mode(&self) -> ArchiveMode {
        self.mode
    }

    /// タイムスタンプ付きアーカイブフォルダを作成
    ///
    /// 同じタイムスタンプのフォルダが既に存在する場合は `-N` の
    /// 連番を付けて衝突を回避します。
    pub fn create_archive_folder(&self) -> Result<PathBuf, SheetFeedError> {
        let stamp = Local::now()
            .format(self.timestamp_format.pattern())
            .to_string();
        let base = self.output_root.join(&self.name);

        let mut candidate = base.join(&stamp);
        let mut suffix = 1u32;
        while candidate.exists() {
            candidate = base.join(format!("{stamp}-{suffix}"));
            suffix += 1;
        }

        fs::create_dir_all(&candidate)?;
        debug!(path = %candidate.display(), "Created archive folder");
        Ok(candidate)
    }

    /// 単一ソースモード: 処理済み入力を退避
    ///
    /// タイムスタンプ付きフォルダを作成し、入力ファイルをそこへ
    /// 移動（またはコピー）して移動先のパスを返します。
    pub fn archive_single(&self, input: &Path) -> Result<PathBuf, SheetFeedError> {
        let folder = self.create_archive_folder()?;
        let destination = self.relocate(input, &folder)?;
        info!(
            from = %input.display(),
            to = %destination.display(),
            "Archived processed input"
        );
        Ok(destination)
    }

    /// マルチソースモード: バッチ全体を退避
    ///
    /// 出力スプレッドシートをアーカイブフォルダ直下へ、入力ファイル
    /// 群を`inputs/`サブフォルダへ再配置します。出力は常に移動、
    /// 入力はアーカイブモードに従って移動またはコピーされます。
    pub fn archive_batch(
        &self,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<PathBuf, SheetFeedError> {
        let folder = self.create_archive_folder()?;

        let output_dest = folder.join(file_name_of(output));
        fs_extra::file::move_file(output, &output_dest, &CopyOptions::new())?;

        let inputs_dir = folder.join(INPUTS_SUBFOLDER);
        fs::create_dir_all(&inputs_dir)?;
        for input in inputs {
            self.relocate(input, &inputs_dir)?;
        }

        info!(
            path = %folder.display(),
            inputs = inputs.len(),
            "Archived merge batch"
        );
        Ok(folder)
    }

    /// 1つのファイルをモードに従って再配置
    fn relocate(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf, SheetFeedError> {
        let destination = dest_dir.join(file_name_of(source));
        let options = CopyOptions::new();
        match self.mode {
            ArchiveMode::Move => {
                fs_extra::file::move_file(source, &destination, &options)?;
            }
            ArchiveMode::Copy => {
                fs_extra::file::copy(source, &destination, &options)?;
            }
        }
        Ok(destination)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(root: &Path, mode: ArchiveMode) -> ArchiveManager {
        ArchiveManager::new(root, "TestMapping", TimestampFormat::DateTime, mode)
    }

    #[test]
    fn test_create_archive_folder_layout() {
        let dir = TempDir::new().unwrap();
        let manager = manager(dir.path(), ArchiveMode::Move);

        let folder = manager.create_archive_folder().unwrap();
        assert!(folder.exists());
        assert!(folder.starts_with(dir.path().join("TestMapping")));
    }

    #[test]
    fn test_archive_folder_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let manager = manager(dir.path(), ArchiveMode::Move);

        let first = manager.create_archive_folder().unwrap();
        let second = manager.create_archive_folder().unwrap();

        assert_ne!(first, second);
        assert!(second
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("-1"));
    }

    #[test]
    fn test_archive_single_moves_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("report.txt");
        fs::write(&input, "data").unwrap();

        let manager = manager(&dir.path().join("archive"), ArchiveMode::Move);
        let destination = manager.archive_single(&input).unwrap();

        assert!(!input.exists());
        assert!(destination.exists());
        assert_eq!(fs::read_to_string(destination).unwrap(), "data");
    }

    #[test]
    fn test_archive_single_copy_keeps_original() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("report.txt");
        fs::write(&input, "data").unwrap();

        let manager = manager(&dir.path().join("archive"), ArchiveMode::Copy);
        let destination = manager.archive_single(&input).unwrap();

        assert!(input.exists());
        assert!(destination.exists());
    }

    #[test]
    fn test_archive_batch_layout() {
        let dir = TempDir::new().unwrap();
        let input1 = dir.path().join("a_001.txt");
        let input2 = dir.path().join("a_002.txt");
        let output = dir.path().join("merged.xlsx");
        fs::write(&input1, "1").unwrap();
        fs::write(&input2, "2").unwrap();
        fs::write(&output, "xlsx bytes").unwrap();

        let manager = manager(&dir.path().join("archive"), ArchiveMode::Move);
        let folder = manager
            .archive_batch(&[input1.clone(), input2.clone()], &output)
            .unwrap();

        assert!(folder.join("merged.xlsx").exists());
        assert!(folder.join("inputs").join("a_001.txt").exists());
        assert!(folder.join("inputs").join("a_002.txt").exists());
        assert!(!input1.exists());
        assert!(!output.exists());
    }

    #[test]
    fn test_from_config_uses_fallback_name() {
        let config = ArchiveConfig {
            output_root: PathBuf::from("/tmp/out"),
            name: None,
            timestamp_format: TimestampFormat::DateOnly,
            mode: ArchiveMode::Move,
        };
        let manager = ArchiveManager::from_config(&config, DEFAULT_MERGE_NAME);
        assert_eq!(manager.name, "Merged Data");
    }
}
