//! sheetfeed - Pure-Rust text report to Excel converter with unattended folder watching
//!
//! This crate ingests semi-structured, fixed-format text exports (tabular,
//! fixed-width, or multi-line labeled-block reports such as metrology and
//! inspection output) and renders them into spreadsheet documents according
//! to a user-authored column-to-cell mapping.
//!
//! Beyond one-shot conversion, it supports unattended run mode: one or more
//! folders are watched continuously; as matching files appear they are
//! parsed, mapped, and either appended to a single growing output document
//! (single-source mode) or merged across multiple synchronized source
//! folders into one document per matched batch (multi-source mode), with
//! originals archived afterward.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use sheetfeed::{ColumnMapping, IngestorBuilder};
//!
//! fn main() -> Result<(), sheetfeed::SheetFeedError> {
//!     // Create an ingestor with default settings
//!     let ingestor = IngestorBuilder::new().build()?;
//!
//!     // Map source column 0 vertically, starting at cell A2, titled at A1
//!     let mappings = vec![ColumnMapping::vertical(0, 1, 0).with_title("Measured")];
//!
//!     // Convert a report into a new spreadsheet
//!     let result = ingestor.convert_file(
//!         Path::new("inspection.txt"),
//!         &mappings,
//!         Path::new("results.xlsx"),
//!     )?;
//!     println!("{} rows written at offset {}", result.rows_added, result.row_offset);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Appending to a growing document
//!
//! ```rust,no_run
//! use std::path::Path;
//! use sheetfeed::{ColumnMapping, IngestorBuilder};
//!
//! # fn main() -> Result<(), sheetfeed::SheetFeedError> {
//! let ingestor = IngestorBuilder::new().build()?;
//! let mappings = vec![ColumnMapping::vertical(0, 0, 0)];
//!
//! // Appends after the last occupied row; failures are returned as a
//! // classified result, never thrown
//! let result = ingestor.append_file(
//!     Path::new("next_report.txt"),
//!     &mappings,
//!     Path::new("results.xlsx"),
//! );
//! if !result.success {
//!     eprintln!("append failed: {:?}", result.error_message);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Watching a folder (single-source run mode)
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::time::Duration;
//! use sheetfeed::{
//!     ArchiveManager, ArchiveMode, ColumnMapping, SingleFolderWatcher,
//!     SingleWatchOptions, SpreadsheetWriter, TextRecordParser, TimestampFormat,
//! };
//!
//! # fn main() -> Result<(), sheetfeed::SheetFeedError> {
//! let options = SingleWatchOptions {
//!     folder: PathBuf::from("/data/incoming"),
//!     extensions: vec!["txt".to_string()],
//!     scan_interval: Duration::from_secs(5),
//!     target: PathBuf::from("/data/session.xlsx"),
//! };
//! let archiver = ArchiveManager::new(
//!     "/data/processed",
//!     "Session",
//!     TimestampFormat::DateTime,
//!     ArchiveMode::Move,
//! );
//! let (mut watcher, events) = SingleFolderWatcher::new(
//!     options,
//!     vec![ColumnMapping::vertical(0, 0, 0)],
//!     TextRecordParser::new(),
//!     SpreadsheetWriter::new(),
//!     archiver,
//! )?;
//! watcher.start()?;
//! for event in events {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod api;
mod archive;
mod builder;
mod config;
mod error;
mod mapping;
mod merge;
mod parser;
mod security;
mod types;
mod watch;
mod writer;

// 公開API
pub use api::{
    ArchiveMode, Direction, GateDecision, LicenseGate, MatchKeyStrategy, MissingColumnPolicy,
    RowPatternKind, TimestampFormat, UnrestrictedGate,
};
pub use archive::{ArchiveManager, DEFAULT_MERGE_NAME};
pub use builder::{Ingestor, IngestorBuilder};
pub use config::{
    ArchiveConfig, FileSlotDef, MappingDocument, WatchConfig, WatchFolderDef, SCHEMA_VERSION,
    SLOT_RANGE,
};
pub use error::SheetFeedError;
pub use mapping::{generate_indexes, ColumnMapping, MappingEngine, MappingOutcome, RowSelector};
pub use merge::MergeProcessor;
pub use parser::{FixedColumnLayout, ReportFormat, TextRecordParser};
pub use security::SecurityConfig;
pub use types::{
    column_index_from_id, column_letter, parse_cell_ref, AppendFailureKind, AppendResult,
    CellWrite, JobState, ParsedTable, ProcessingJob,
};
pub use watch::{
    CoordinatorEvent, MatchKeyExtractor, MultiSlotWatchCoordinator, SingleFolderWatcher,
    SingleWatchOptions, SlotBatch, StabilityGate, WatchEvent,
};
pub use writer::SpreadsheetWriter;
