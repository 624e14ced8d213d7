//! 安定性ゲート
//!
//! ファイルの書き込み完了を「サイズが観測ウィンドウをまたいで
//! 変化しないこと」で近似判定するモジュール。書き込み途中の
//! ファイルを処理してしまうことを防ぎます。

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::debug;

/// 安定性ゲート
///
/// ブロッキングのチェックであり、ウォッチャーのメインループ外
/// （ワーカースレッド）で実行されることを想定しています。
#[derive(Debug, Clone)]
pub struct StabilityGate {
    window: Duration,
}

impl StabilityGate {
    /// 観測ウィンドウを指定してゲートを生成
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// 観測ウィンドウを取得
    pub fn window(&self) -> Duration {
        self.window
    }

    /// ファイルが安定しているかを1回チェック
    ///
    /// サイズを記録し、ウィンドウ分スリープした後に再読み取りします。
    /// ファイルが両時点で存在し、サイズが変化していない場合のみ安定と
    /// 判定します。待機中に削除されたファイルは不安定として報告され
    /// ます。
    pub fn is_stable(&self, path: &Path) -> bool {
        let Ok(before) = fs::metadata(path) else {
            return false;
        };
        let size_before = before.len();

        if !self.window.is_zero() {
            thread::sleep(self.window);
        }

        match fs::metadata(path) {
            Ok(after) => {
                let stable = after.len() == size_before;
                if !stable {
                    debug!(
                        path = %path.display(),
                        before = size_before,
                        after = after.len(),
                        "File still growing"
                    );
                }
                stable
            }
            Err(_) => false,
        }
    }

    /// 安定するまでチェックを繰り返す
    ///
    /// 最初に安定が観測された時点で`true`を返します。`max_retries`回
    /// 試行しても安定しない場合は`false`です。
    pub fn wait_for_stability(&self, path: &Path, max_retries: u32) -> bool {
        for attempt in 0..max_retries {
            if self.is_stable(path) {
                return true;
            }
            debug!(
                path = %path.display(),
                attempt = attempt + 1,
                max_retries,
                "Stability check failed, retrying"
            );
        }
        false
    }
}
