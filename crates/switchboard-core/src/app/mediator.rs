//! Mediator - send / publish / create_stream の入口
//!
//! # 3 つのメッセージパターン
//! - **Request**: handler ちょうど 1 つ + behavior チェーン。チェーンは Request 型ごとにキャッシュ
//! - **Notification**: handler 0 個以上。0 個は正常（何もしない）
//! - **Stream**: handler ちょうど 1 つ。behavior は適用しない。遅延・pull 駆動
//!
//! エンジン自身は呼び出しごとの可変状態を持ちません。共有される可変構造は
//! パイプラインキャッシュだけです。`Mediator` は `Arc` の薄いラッパなので clone は安価で、
//! clone 同士はキャッシュを共有します。

use std::any::type_name;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::Instrument;

use super::builder::MediatorBuilder;
use super::contracts::{AnyMessage, ContractTable, RequestContract};
use super::options::{MediatorOptions, PublishStrategy};
use super::pipeline::{PipelineCache, resolve_single};
use crate::domain::{
    CancellationToken, Capability, DispatchId, MediatorError, NotificationFailure, PublishId,
    StreamId,
};
use crate::ports::HandlerLocator;
use crate::ports::locator::downcast_instance;
use crate::typed::{
    Notification, NotificationHandler, Request, ResponseStream, StreamHandler, StreamRequest,
};

/// 型消去経路から publish するときの配り方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublishMode {
    Configured,
    Concurrent,
    Sequential,
}

struct MediatorInner {
    locator: Arc<dyn HandlerLocator>,
    contracts: ContractTable,
    pipelines: PipelineCache,
    options: MediatorOptions,
}

/// Mediator はディスパッチエンジン本体
///
/// # 使用例
/// ```ignore
/// let mut registry = ServiceRegistry::new();
/// registry
///     .register_request_handler::<CreateAccount, _>(CreateAccountHandler)
///     .register_open_behavior(LoggingBehavior::new());
///
/// let mediator = Mediator::builder().registry(registry).build()?;
/// let id = mediator.send(CreateAccount { owner: "alice".into() }).await?;
/// ```
#[derive(Clone)]
pub struct Mediator {
    inner: Arc<MediatorInner>,
}

impl Mediator {
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    pub(crate) fn new(
        locator: Arc<dyn HandlerLocator>,
        contracts: ContractTable,
        options: MediatorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(MediatorInner {
                locator,
                pipelines: PipelineCache::new(options.pipeline_caching),
                contracts,
                options,
            }),
        }
    }

    pub fn options(&self) -> &MediatorOptions {
        &self.inner.options
    }

    /// キャッシュ済みパイプラインの数
    pub fn cached_pipelines(&self) -> usize {
        self.inner.pipelines.len()
    }

    /// 型消去された Request の型から、宣言された応答型を引く
    pub fn request_contract(&self, type_id: std::any::TypeId) -> Option<&RequestContract> {
        self.inner.contracts.request(type_id)
    }

    fn locator(&self) -> &dyn HandlerLocator {
        self.inner.locator.as_ref()
    }

    // ------------------------------------------------------------------
    // Request
    // ------------------------------------------------------------------

    /// Request を送って応答を待つ（キャンセルなし）
    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response, MediatorError> {
        self.send_with(request, &CancellationToken::new()).await
    }

    /// Request を送って応答を待つ
    ///
    /// handler / behavior のエラーは変換せずにそのまま返します。
    pub async fn send_with<R: Request>(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, MediatorError> {
        let id = DispatchId::generate();
        let span = tracing::debug_span!("send", dispatch_id = %id, request = type_name::<R>());
        async move {
            let chain = self.inner.pipelines.chain_for::<R>(self.locator())?;
            chain.invoke(request, cancel).await
        }
        .instrument(span)
        .await
    }

    /// 型が実行時にしか分からない Request を送る
    ///
    /// 応答は `Box<dyn Any + Send>` で返るので、呼び出し側で downcast します。
    /// 宣言されていない型は `ContractViolation`。
    pub async fn send_any(
        &self,
        request: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<AnyMessage, MediatorError> {
        self.inner.contracts.send_any(self, request, cancel).await
    }

    /// `NamedRequest::NAME` と JSON ペイロードで送る
    pub async fn send_json(
        &self,
        name: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, MediatorError> {
        self.inner
            .contracts
            .send_json(self, name, payload, cancel)
            .await
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    /// 設定された戦略（既定は並行）で publish する（キャンセルなし）
    pub async fn publish<N: Notification>(&self, notification: N) -> Result<(), MediatorError> {
        self.publish_with(notification, &CancellationToken::new())
            .await
    }

    /// 設定された戦略で publish する
    pub async fn publish_with<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        self.publish_in_mode(notification, cancel, PublishMode::Configured)
            .await
    }

    /// 全 handler を並行に実行し、全員が終わってから失敗を集約する
    ///
    /// 1 つでも失敗すれば `NotificationFailed` に失敗した handler だけが入ります。
    /// panic した handler も他の handler を止めず、`HandlerPanicked` として集約されます。
    pub async fn publish_concurrent<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        self.publish_in_mode(notification, cancel, PublishMode::Concurrent)
            .await
    }

    /// 登録順に 1 つずつ実行し、最初の失敗をそのまま返す（以降の handler は実行しない）
    pub async fn publish_sequential<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        self.publish_in_mode(notification, cancel, PublishMode::Sequential)
            .await
    }

    /// 型が実行時にしか分からない Notification を publish する（設定された戦略）
    pub async fn publish_any(
        &self,
        notification: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        self.inner
            .contracts
            .publish_any(self, notification, cancel, PublishMode::Configured)
            .await
    }

    /// 複数の Notification を順に publish する。最初に失敗した publish で止まる
    pub async fn publish_all<N, I>(
        &self,
        notifications: I,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError>
    where
        N: Notification,
        I: IntoIterator<Item = N>,
    {
        for notification in notifications {
            self.publish_with(notification, cancel).await?;
        }
        Ok(())
    }

    /// 型の異なる Notification の列を順に publish する
    pub async fn publish_all_any(
        &self,
        notifications: Vec<AnyMessage>,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        for notification in notifications {
            self.publish_any(notification, cancel).await?;
        }
        Ok(())
    }

    pub(crate) async fn publish_in_mode<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
        mode: PublishMode,
    ) -> Result<(), MediatorError> {
        let id = PublishId::generate();
        let span = tracing::debug_span!("publish", publish_id = %id, notification = type_name::<N>());
        async move {
            let handlers = self.notification_handlers::<N>()?;
            if handlers.is_empty() {
                tracing::debug!("no notification handlers registered");
                return Ok(());
            }

            let sequential = match mode {
                PublishMode::Sequential => true,
                PublishMode::Concurrent => false,
                PublishMode::Configured => {
                    self.inner.options.publish_strategy == PublishStrategy::Sequential
                }
            };

            if sequential {
                for handler in &handlers {
                    handler.handle(&notification, cancel).await?;
                }
                Ok(())
            } else {
                fan_out(&handlers, &notification, cancel).await
            }
        }
        .instrument(span)
        .await
    }

    fn notification_handlers<N: Notification>(
        &self,
    ) -> Result<Vec<Arc<dyn NotificationHandler<N>>>, MediatorError> {
        let capability = Capability::notification_handler::<N>();
        self.locator()
            .resolve_all(&capability)
            .into_iter()
            .map(|instance| downcast_instance(instance, &capability))
            .collect()
    }

    // ------------------------------------------------------------------
    // Stream
    // ------------------------------------------------------------------

    /// StreamRequest から要素列を作る
    ///
    /// handler の解決はこの呼び出しの時点で行い、未登録なら即座に失敗します。
    /// 返る stream は `cancel` がキャンセルされた時点で終わり、handler の stream を drop します。
    /// 再列挙はできません（もう一度 create_stream を呼ぶと handler が新しく呼ばれる）。
    pub fn create_stream_with<S: StreamRequest>(
        &self,
        request: S,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream<S::Item>, MediatorError> {
        let id = StreamId::generate();
        let span = tracing::debug_span!("create_stream", stream_id = %id, request = type_name::<S>());
        let _entered = span.enter();

        let capability = Capability::stream_handler::<S>();
        let handler = resolve_single::<Arc<dyn StreamHandler<S>>>(self.locator(), &capability)?;
        let produced = handler.handle(request, cancel.clone());
        tracing::debug!("stream opened");
        Ok(until_cancelled(produced, cancel.clone()))
    }

    /// キャンセルなしで stream を作る
    pub fn create_stream<S: StreamRequest>(
        &self,
        request: S,
    ) -> Result<ResponseStream<S::Item>, MediatorError> {
        self.create_stream_with(request, &CancellationToken::new())
    }

    /// 型が実行時にしか分からない StreamRequest から要素列を作る
    pub fn create_stream_any(
        &self,
        request: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream<AnyMessage>, MediatorError> {
        self.inner.contracts.create_stream_any(self, request, cancel)
    }
}

/// 並行 fan-out。全 handler の完了を待ってから失敗を集める
async fn fan_out<N: Notification>(
    handlers: &[Arc<dyn NotificationHandler<N>>],
    notification: &N,
    cancel: &CancellationToken,
) -> Result<(), MediatorError> {
    let runs = handlers.iter().enumerate().map(|(index, handler)| async move {
        let outcome = match AssertUnwindSafe(handler.handle(notification, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(MediatorError::HandlerPanicked {
                message: panic_message(panic.as_ref()),
            }),
        };
        (index, outcome)
    });

    let failures: Vec<NotificationFailure> = join_all(runs)
        .await
        .into_iter()
        .filter_map(|(handler_index, outcome)| {
            outcome.err().map(|error| NotificationFailure {
                handler_index,
                error,
            })
        })
        .collect();

    if failures.is_empty() {
        return Ok(());
    }

    tracing::warn!(
        failed = failures.len(),
        handlers = handlers.len(),
        "notification handlers failed"
    );
    Err(MediatorError::NotificationFailed {
        notification: type_name::<N>(),
        handlers: handlers.len(),
        failures,
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// キャンセルされたら次の要素を待たずに終了し、内側の stream を drop する
fn until_cancelled<T: Send + 'static>(
    inner: ResponseStream<T>,
    cancel: CancellationToken,
) -> ResponseStream<T> {
    stream::unfold(Some((inner, cancel)), |state| async move {
        let (mut inner, cancel) = state?;
        if cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = inner.next() => item.map(|item| (item, Some((inner, cancel)))),
        }
    })
    .fuse()
    .boxed()
}
