//! Handler traits - メッセージを処理する 3 種類の handler
//!
//! # 学習ポイント
//! - ジェネリック trait（`RequestHandler<R>`）で Request と handler の対応をコンパイル時に保証
//! - `#[async_trait]` で dyn 化できる async メソッド
//! - Stream は async メソッドではなく `BoxStream` を返す（pull 駆動・遅延評価）

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::message::{Notification, Request, StreamRequest};
use crate::domain::{CancellationToken, MediatorError};

/// stream handler が返す要素列
pub type ResponseStream<T> = BoxStream<'static, Result<T, MediatorError>>;

/// RequestHandler は Request を処理して応答を返す
///
/// # 使用例
/// ```ignore
/// struct CreateAccountHandler;
///
/// #[async_trait]
/// impl RequestHandler<CreateAccount> for CreateAccountHandler {
///     async fn handle(
///         &self,
///         request: CreateAccount,
///         _cancel: &CancellationToken,
///     ) -> Result<AccountId, MediatorError> {
///         Ok(AccountId::new(request.owner))
///     }
/// }
/// ```
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    async fn handle(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, MediatorError>;
}

/// NotificationHandler は Notification を受け取って副作用を起こす
///
/// 他の handler の成否には影響されません。
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync {
    async fn handle(&self, notification: &N, cancel: &CancellationToken)
    -> Result<(), MediatorError>;
}

/// StreamHandler は StreamRequest から要素列を作る
///
/// 返した stream は呼び出し側が poll したときだけ進みます。
/// `cancel` は stream の中で保持して、要素の間で観測してください。
pub trait StreamHandler<S: StreamRequest>: Send + Sync {
    fn handle(&self, request: S, cancel: CancellationToken) -> ResponseStream<S::Item>;
}
