//! Sender / Publisher - 呼び出し側が依存する狭い抽象
//!
//! 呼び出し側は具体的な handler 型を知らず、これらの trait だけに依存します。
//! `Mediator` が両方を実装します。

use async_trait::async_trait;

use super::contracts::AnyMessage;
use super::mediator::Mediator;
use crate::domain::{CancellationToken, MediatorError};
use crate::typed::{Notification, Request, ResponseStream, StreamRequest};

/// Request と StreamRequest を送る側
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send_with<R: Request>(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, MediatorError>;

    async fn send_any(
        &self,
        request: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<AnyMessage, MediatorError>;

    fn create_stream_with<S: StreamRequest>(
        &self,
        request: S,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream<S::Item>, MediatorError>;

    fn create_stream_any(
        &self,
        request: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream<AnyMessage>, MediatorError>;
}

/// Notification を配る側
///
/// `publish_with` は設定された戦略に従います。
/// 並行（全員待ってから集約）と逐次（最初の失敗で停止）は名前で選べます。
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_with<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError>;

    async fn publish_concurrent<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError>;

    async fn publish_sequential<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError>;

    async fn publish_any(
        &self,
        notification: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError>;

    /// 順に publish し、最初に失敗した publish で止まる
    async fn publish_all<N, I>(
        &self,
        notifications: I,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError>
    where
        N: Notification,
        I: IntoIterator<Item = N> + Send,
        I::IntoIter: Send;
}

#[async_trait]
impl Sender for Mediator {
    async fn send_with<R: Request>(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, MediatorError> {
        Mediator::send_with(self, request, cancel).await
    }

    async fn send_any(
        &self,
        request: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<AnyMessage, MediatorError> {
        Mediator::send_any(self, request, cancel).await
    }

    fn create_stream_with<S: StreamRequest>(
        &self,
        request: S,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream<S::Item>, MediatorError> {
        Mediator::create_stream_with(self, request, cancel)
    }

    fn create_stream_any(
        &self,
        request: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream<AnyMessage>, MediatorError> {
        Mediator::create_stream_any(self, request, cancel)
    }
}

#[async_trait]
impl Publisher for Mediator {
    async fn publish_with<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        Mediator::publish_with(self, notification, cancel).await
    }

    async fn publish_concurrent<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        Mediator::publish_concurrent(self, notification, cancel).await
    }

    async fn publish_sequential<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        Mediator::publish_sequential(self, notification, cancel).await
    }

    async fn publish_any(
        &self,
        notification: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        Mediator::publish_any(self, notification, cancel).await
    }

    async fn publish_all<N, I>(
        &self,
        notifications: I,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError>
    where
        N: Notification,
        I: IntoIterator<Item = N> + Send,
        I::IntoIter: Send,
    {
        Mediator::publish_all(self, notifications, cancel).await
    }
}
