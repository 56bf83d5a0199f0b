//! # 外部呼び出しガード
//!
//! カストディプロバイダ・チェーンRPCへの呼び出しに上限時間とキャンセルを適用する。
//! 1ページ分の全ステージ（セッション、署名、ブロードキャスト）で同じ
//! `CancelSignal` を共有する。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::BridgeError;

/// 共有キャンセルシグナル。クローンは全て同じシグナルを参照する。
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// キャンセルを通知する。以降の呼び出しは全て `Cancelled` になる。
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// キャンセルされるまで待機する。
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // 送信側は self が保持しているため、待機中に閉じられることはない
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// 外部呼び出し1回ごとにタイムアウトとキャンセルを適用するガード。
#[derive(Debug, Clone)]
pub struct CallGuard {
    timeout: Duration,
    cancel: CancelSignal,
}

impl CallGuard {
    pub fn new(timeout: Duration, cancel: CancelSignal) -> Self {
        Self { timeout, cancel }
    }

    /// `future` を実行する。
    ///
    /// 内側の結果はそのまま返し、エラーの変換は呼び出し側で行う。
    /// 上限時間を超えた場合は `Timeout`、キャンセル時は `Cancelled` を返す。
    pub async fn run<F>(&self, label: &'static str, future: F) -> Result<F::Output, BridgeError>
    where
        F: Future,
    {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::Cancelled(label));
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::warn!(call = label, "外部呼び出しがキャンセルされました");
                Err(BridgeError::Cancelled(label))
            }
            result = tokio::time::timeout(self.timeout, future) => {
                result.map_err(|_| {
                    tracing::warn!(
                        call = label,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "外部呼び出しがタイムアウトしました"
                    );
                    BridgeError::Timeout(label)
                })
            }
        }
    }
}
