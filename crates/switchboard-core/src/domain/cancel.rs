//! CancellationToken - 協調的キャンセルのシグナル
//!
//! # 学習ポイント
//! - `tokio::sync::watch` を 1 bit のブロードキャストとして使う
//! - clone した全員が同じ状態を観測する（Arc で Sender を共有）
//!
//! 1 つの token が behavior → handler の連鎖全体、stream の列挙、
//! notification の各 handler に渡されます。観測して中断するかどうかは各リンク次第です。

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// CancellationToken はキャンセル要求を共有するハンドル
///
/// # 使用例
/// ```ignore
/// let token = CancellationToken::new();
/// let child = token.clone();
///
/// tokio::spawn(async move {
///     child.cancelled().await;
///     println!("stopped");
/// });
///
/// token.cancel();
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    /// キャンセルを要求する（冪等）
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// キャンセルされるまで待つ
    ///
    /// すでにキャンセル済みなら即座に完了します。
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // self が Sender を保持しているので wait_for が Err になることはない
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// キャンセル済みなら `MediatorError::Cancelled` を返す
    ///
    /// handler の中で `token.check()?;` と書くためのヘルパー。
    pub fn check(&self) -> Result<(), crate::domain::MediatorError> {
        if self.is_cancelled() {
            Err(crate::domain::MediatorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(
            clone.check(),
            Err(crate::domain::MediatorError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let join = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .expect("waiter should wake up")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }
}
