//! Public API Types
//!
//! 公開APIで使用する列挙型を定義するモジュール。

use serde::{Deserialize, Serialize};

/// マッピングの書き込み方向
///
/// ソース列から抽出した値を、ターゲットセルを起点にどの方向へ
/// 並べるかを指定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 縦方向（アンカーセルから下へ1行ずつ）
    ///
    /// k番目の選択行は `(anchor.row + k, anchor.col)` に書き込まれます。
    /// タイトルはアンカーの1行上（`anchor.row - 1`）に配置されます。
    Vertical,

    /// 横方向（アンカーセルから右へ1列ずつ）
    ///
    /// k番目の選択行は `(anchor.row, anchor.col + k)` に書き込まれます。
    /// タイトルはアンカーの1列左（`anchor.col - 1`）に配置されます。
    Horizontal,
}

/// 生成行パターンの種類
///
/// 明示的な行インデックスリストの代わりに、パターンから選択行を
/// 生成する場合の種類を指定します。行の奇偶判定は1始まりの行番号で
/// 行います（0始まりインデックス`i`は、`i + 1`が奇数なら`Odd`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowPatternKind {
    /// 1始まりの行番号が奇数の行のみ
    Odd,

    /// 1始まりの行番号が偶数の行のみ
    Even,

    /// 開始インデックス以降のすべての行
    All,
}

/// ファイル照合キーの抽出戦略
///
/// 複数フォルダに到着したファイルを1つの論理バッチとして対応付ける
/// ための照合キーを、ファイル名からどのように導出するかを指定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKeyStrategy {
    /// 拡張子を除いた後、最初のアンダースコアより前の部分をキーとする
    ///
    /// アンダースコアがない場合はステム全体がキーになります。
    ///
    /// # 例
    ///
    /// `PART001_001.txt` と `PART001_002.txt` は同じキー `PART001` に
    /// 対応付けられます。
    Prefix,

    /// 拡張子を除いたステム全体をキーとする
    ///
    /// # 例
    ///
    /// `PART001_001.txt` と `PART001_002.txt` は異なるキー
    /// `PART001_001` / `PART001_002` になります。
    ExactBasename,
}

/// アーカイブフォルダ名のタイムスタンプ形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// 日付のみ（`YYYY-MM-DD`）
    DateOnly,

    /// 日付と時刻（`YYYY-MM-DD_HHMMSS`）
    DateTime,
}

impl TimestampFormat {
    /// chrono互換のフォーマット文字列を返す
    pub(crate) fn pattern(&self) -> &'static str {
        match self {
            TimestampFormat::DateOnly => "%Y-%m-%d",
            TimestampFormat::DateTime => "%Y-%m-%d_%H%M%S",
        }
    }
}

/// 入力ファイルのアーカイブ方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMode {
    /// 元ファイルをアーカイブフォルダへ移動する
    Move,

    /// 元ファイルをコピーし、元の場所に残す
    Copy,
}

/// ソース行の幅を超えた列インデックスの扱い
///
/// マッピングのソース列が行の実際のセル数を超えている場合の動作を
/// 指定します。単一ファイル追記パスとマルチファイルマージパスで
/// 歴史的に動作が異なるため、明示的なポリシーとして保持します。
/// 無断で統一してはいけません。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingColumnPolicy {
    /// 書き込み自体をスキップする（単一ファイル追記パス）
    Skip,

    /// 空文字列を書き込む（マージパス、縦方向の整列を保つため）
    FillEmpty,
}

/// ライセンスゲートの判定結果
///
/// 許可/拒否のフラグと、拒否時にユーザーへ提示するメッセージを
/// 保持します。
#[derive(Debug, Clone)]
pub struct GateDecision {
    /// 処理の実行を許可するか
    pub allowed: bool,

    /// ユーザー向けメッセージ（拒否理由など）
    pub message: Option<String>,
}

impl GateDecision {
    /// 許可の判定を生成
    pub fn allow() -> Self {
        Self {
            allowed: true,
            message: None,
        }
    }

    /// 拒否の判定を生成
    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            message: Some(message.into()),
        }
    }
}

/// ライセンスゲート
///
/// ハードウェア結合のライセンス検証サブシステムは本クレートの外部
/// コラボレータです。本クレートは処理開始前に一度だけこのゲートを
/// 評価し、拒否された場合はウォッチャーを起動せずに中断します。
pub trait LicenseGate: Send + Sync {
    /// ゲートを評価する
    fn check(&self) -> GateDecision;
}

/// 常に許可するゲート
///
/// ライセンス検証を持たない構成（テスト、社内ツール）で使用します。
#[derive(Debug, Default)]
pub struct UnrestrictedGate;

impl LicenseGate for UnrestrictedGate {
    fn check(&self) -> GateDecision {
        GateDecision::allow()
    }
}
