//! Watch Module
//!
//! フォルダ監視の実装。単一フォルダのタイマー駆動ウォッチャーと、
//! 複数フォルダを照合キーで同期するマルチスロットコーディネータを
//! 提供します。どちらも安定性ゲートを通過したファイルだけを処理
//! します。

mod matchkey;
mod multi;
mod single;
mod stability;

pub use matchkey::MatchKeyExtractor;
pub use multi::{CoordinatorEvent, MultiSlotWatchCoordinator, SlotBatch};
pub use single::{SingleFolderWatcher, SingleWatchOptions, WatchEvent};
pub use stability::StabilityGate;
