//! ServiceRegistry - handler / behavior の登録と解決
//!
//! `HandlerLocator` のインメモリ実装です。外部の DI コンテナを使わないアプリは
//! これをそのまま `MediatorBuilder::registry()` に渡します。
//!
//! # 学習ポイント
//! - HashMap での型消去された factory の管理
//! - Generic methods での登録と型安全性（登録時に `Arc<dyn Trait>` へ変換）
//! - 登録と同時に contract table を埋める（型消去経路が fail closed になるように）
//!
//! # 寿命
//! - **Singleton**: 1 つの `Arc` を全解決で共有
//! - **Transient**: 解決のたびに factory を呼んで新しいインスタンスを作る

use std::collections::HashMap;
use std::sync::Arc;

use crate::app::contracts::{ContractTable, RegistryError};
use crate::domain::{Capability, CapabilityKind};
use crate::ports::{HandlerLocator, Instance, LocatorError, instance};
use crate::typed::{
    NamedRequest, Notification, NotificationHandler, OpenBehavior, PipelineBehavior, Request,
    RequestHandler, StreamHandler, StreamRequest,
};

type Factory = Arc<dyn Fn() -> Instance + Send + Sync>;

/// 登録の寿命
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Singleton,
    Transient,
}

/// 登録 1 件の説明（診断用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub capability: Capability,
    pub lifetime: Lifetime,
}

struct Registration {
    /// 全 Capability を通した登録順
    order: u64,
    lifetime: Lifetime,
    factory: Factory,
}

/// HandlerModule はまとめて登録する単位
///
/// # 使用例
/// ```ignore
/// struct LedgerModule;
///
/// impl HandlerModule for LedgerModule {
///     fn register(&self, registry: &mut ServiceRegistry) {
///         registry
///             .register_request_handler::<CreateTransaction, _>(CreateTransactionHandler)
///             .register_notification_handler::<TransactionCreated, _>(SendReceipt);
///     }
/// }
/// ```
pub trait HandlerModule {
    fn register(&self, registry: &mut ServiceRegistry);
}

impl<F: Fn(&mut ServiceRegistry)> HandlerModule for F {
    fn register(&self, registry: &mut ServiceRegistry) {
        self(registry)
    }
}

/// ServiceRegistry は Capability ごとに factory を登録順で保持
///
/// 構築時（可変）と実行時（不変）を分けることで、実行時にロックを持ちません。
#[derive(Default)]
pub struct ServiceRegistry {
    entries: HashMap<Capability, Vec<Registration>>,
    next_order: u64,
    contracts: ContractTable,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, capability: Capability, lifetime: Lifetime, factory: Factory) -> &mut Self {
        let order = self.next_order;
        self.next_order += 1;
        tracing::trace!(%capability, ?lifetime, order, "registered");
        self.entries.entry(capability).or_default().push(Registration {
            order,
            lifetime,
            factory,
        });
        self
    }

    fn singleton<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        capability: Capability,
        shared: Arc<T>,
    ) -> &mut Self {
        self.add(
            capability,
            Lifetime::Singleton,
            Arc::new(move || instance(Arc::clone(&shared))),
        )
    }

    // ------------------------------------------------------------------
    // Request
    // ------------------------------------------------------------------

    pub fn register_request_handler<R: Request, H: RequestHandler<R> + 'static>(
        &mut self,
        handler: H,
    ) -> &mut Self {
        self.contracts.declare_request::<R>();
        let shared: Arc<dyn RequestHandler<R>> = Arc::new(handler);
        self.singleton(Capability::request_handler::<R>(), shared)
    }

    pub fn register_request_handler_factory<R, H, F>(&mut self, factory: F) -> &mut Self
    where
        R: Request,
        H: RequestHandler<R> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.contracts.declare_request::<R>();
        self.add(
            Capability::request_handler::<R>(),
            Lifetime::Transient,
            Arc::new(move || {
                let handler: Arc<dyn RequestHandler<R>> = Arc::new(factory());
                instance(handler)
            }),
        )
    }

    /// R 専用の behavior を登録（登録順に外側から入れ子になる）
    pub fn register_behavior<R: Request, B: PipelineBehavior<R> + 'static>(
        &mut self,
        behavior: B,
    ) -> &mut Self {
        let shared: Arc<dyn PipelineBehavior<R>> = Arc::new(behavior);
        self.singleton(Capability::pipeline_behavior::<R>(), shared)
    }

    pub fn register_behavior_factory<R, B, F>(&mut self, factory: F) -> &mut Self
    where
        R: Request,
        B: PipelineBehavior<R> + 'static,
        F: Fn() -> B + Send + Sync + 'static,
    {
        self.add(
            Capability::pipeline_behavior::<R>(),
            Lifetime::Transient,
            Arc::new(move || {
                let behavior: Arc<dyn PipelineBehavior<R>> = Arc::new(factory());
                instance(behavior)
            }),
        )
    }

    /// すべての Request に適用される behavior を登録
    pub fn register_open_behavior<B: OpenBehavior + 'static>(&mut self, behavior: B) -> &mut Self {
        let shared: Arc<dyn OpenBehavior> = Arc::new(behavior);
        self.singleton(Capability::open_behavior(), shared)
    }

    /// `R::NAME` で JSON から送れるようにする
    pub fn expose_json<R: NamedRequest>(&mut self) -> Result<&mut Self, RegistryError> {
        self.contracts.expose_json::<R>()?;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    pub fn register_notification_handler<N: Notification, H: NotificationHandler<N> + 'static>(
        &mut self,
        handler: H,
    ) -> &mut Self {
        self.contracts.declare_notification::<N>();
        let shared: Arc<dyn NotificationHandler<N>> = Arc::new(handler);
        self.singleton(Capability::notification_handler::<N>(), shared)
    }

    pub fn register_notification_handler_factory<N, H, F>(&mut self, factory: F) -> &mut Self
    where
        N: Notification,
        H: NotificationHandler<N> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.contracts.declare_notification::<N>();
        self.add(
            Capability::notification_handler::<N>(),
            Lifetime::Transient,
            Arc::new(move || {
                let handler: Arc<dyn NotificationHandler<N>> = Arc::new(factory());
                instance(handler)
            }),
        )
    }

    /// handler がまだない Notification 型を宣言する（publish_any で no-op にするため）
    pub fn declare_notification<N: Notification>(&mut self) -> &mut Self {
        self.contracts.declare_notification::<N>();
        self
    }

    // ------------------------------------------------------------------
    // Stream
    // ------------------------------------------------------------------

    pub fn register_stream_handler<S: StreamRequest, H: StreamHandler<S> + 'static>(
        &mut self,
        handler: H,
    ) -> &mut Self {
        self.contracts.declare_stream::<S>();
        let shared: Arc<dyn StreamHandler<S>> = Arc::new(handler);
        self.singleton(Capability::stream_handler::<S>(), shared)
    }

    // ------------------------------------------------------------------
    // Bulk / diagnostics
    // ------------------------------------------------------------------

    pub fn register_module(&mut self, module: impl HandlerModule) -> &mut Self {
        module.register(self);
        self
    }

    /// 登録済みの Capability と寿命（登録順）
    pub fn descriptors(&self) -> Vec<ServiceDescriptor> {
        let mut all: Vec<(u64, ServiceDescriptor)> = self
            .entries
            .iter()
            .flat_map(|(capability, registrations)| {
                registrations.iter().map(|r| {
                    (
                        r.order,
                        ServiceDescriptor {
                            capability: *capability,
                            lifetime: r.lifetime,
                        },
                    )
                })
            })
            .collect();
        all.sort_by_key(|(order, _)| *order);
        all.into_iter().map(|(_, descriptor)| descriptor).collect()
    }

    pub fn contracts(&self) -> &ContractTable {
        &self.contracts
    }

    pub(crate) fn into_parts(mut self) -> (Self, ContractTable) {
        let contracts = std::mem::take(&mut self.contracts);
        (self, contracts)
    }

    fn registrations(&self, capability: &Capability) -> &[Registration] {
        self.entries
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl HandlerLocator for ServiceRegistry {
    fn resolve_one(&self, capability: &Capability) -> Result<Option<Instance>, LocatorError> {
        match self.registrations(capability) {
            [] => Ok(None),
            [only] => Ok(Some((only.factory)())),
            many => Err(LocatorError::Ambiguous { count: many.len() }),
        }
    }

    fn resolve_all(&self, capability: &Capability) -> Vec<Instance> {
        let mut matched: Vec<&Registration> = self.registrations(capability).iter().collect();

        // closed behavior と open behavior を登録順でマージする
        if capability.kind() == CapabilityKind::PipelineBehavior {
            matched.extend(self.registrations(&Capability::open_behavior()));
            matched.sort_by_key(|r| r.order);
        }

        matched.into_iter().map(|r| (r.factory)()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CancellationToken, MediatorError};
    use crate::testing::{Ping, PingHandler, Pong, Recorder, Ticks};
    use crate::typed::{Next, OpenNext, RequestInfo, ResponseStream};
    use async_trait::async_trait;
    use futures::StreamExt;

    struct Closed;

    #[async_trait]
    impl PipelineBehavior<Ping> for Closed {
        async fn handle(
            &self,
            request: Ping,
            next: Next<'_, Ping>,
            _cancel: &CancellationToken,
        ) -> Result<String, MediatorError> {
            next.run(request).await
        }
    }

    struct Open;

    #[async_trait]
    impl OpenBehavior for Open {
        async fn handle(
            &self,
            _request: &RequestInfo,
            next: OpenNext<'_>,
            _cancel: &CancellationToken,
        ) -> Result<(), MediatorError> {
            next.run().await
        }
    }

    struct Quiet;

    #[async_trait]
    impl NotificationHandler<Pong> for Quiet {
        async fn handle(&self, _: &Pong, _: &CancellationToken) -> Result<(), MediatorError> {
            Ok(())
        }
    }

    struct Empty;

    impl StreamHandler<Ticks> for Empty {
        fn handle(&self, _request: Ticks, _cancel: CancellationToken) -> ResponseStream<u32> {
            futures::stream::empty().boxed()
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ServiceRegistry::new();
        registry.register_request_handler::<Ping, _>(PingHandler::new(Recorder::default()));

        let found = registry
            .resolve_one(&Capability::request_handler::<Ping>())
            .unwrap()
            .unwrap();
        assert!(found.downcast::<Arc<dyn RequestHandler<Ping>>>().is_ok());
        assert!(registry.contracts().request(std::any::TypeId::of::<Ping>()).is_some());
    }

    #[test]
    fn test_unregistered_resolves_to_none() {
        let registry = ServiceRegistry::new();
        assert!(
            registry
                .resolve_one(&Capability::request_handler::<Ping>())
                .unwrap()
                .is_none()
        );
        assert!(
            registry
                .resolve_all(&Capability::notification_handler::<Pong>())
                .is_empty()
        );
    }

    #[test]
    fn test_double_registration_is_ambiguous() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_stream_handler::<Ticks, _>(Empty)
            .register_stream_handler::<Ticks, _>(Empty);

        let result = registry.resolve_one(&Capability::stream_handler::<Ticks>());
        assert_eq!(result.err(), Some(LocatorError::Ambiguous { count: 2 }));
    }

    #[test]
    fn test_singleton_shares_one_instance() {
        let mut registry = ServiceRegistry::new();
        registry.register_notification_handler::<Pong, _>(Quiet);
        let cap = Capability::notification_handler::<Pong>();

        let a = registry.resolve_all(&cap).pop().unwrap();
        let b = registry.resolve_all(&cap).pop().unwrap();
        let a = a.downcast::<Arc<dyn NotificationHandler<Pong>>>().unwrap();
        let b = b.downcast::<Arc<dyn NotificationHandler<Pong>>>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_transient_builds_a_new_instance_per_resolution() {
        let mut registry = ServiceRegistry::new();
        registry.register_notification_handler_factory::<Pong, _, _>(|| Quiet);
        let cap = Capability::notification_handler::<Pong>();

        let a = registry.resolve_all(&cap).pop().unwrap();
        let b = registry.resolve_all(&cap).pop().unwrap();
        let a = a.downcast::<Arc<dyn NotificationHandler<Pong>>>().unwrap();
        let b = b.downcast::<Arc<dyn NotificationHandler<Pong>>>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(
            registry.descriptors()[0].lifetime,
            Lifetime::Transient
        );
    }

    #[test]
    fn test_open_behaviors_merge_in_registration_order() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_behavior::<Ping, _>(Closed)
            .register_open_behavior(Open)
            .register_behavior::<Ping, _>(Closed);

        let resolved = registry.resolve_all(&Capability::pipeline_behavior::<Ping>());
        let shapes: Vec<&str> = resolved
            .iter()
            .map(|instance| {
                if instance.is::<Arc<dyn PipelineBehavior<Ping>>>() {
                    "closed"
                } else if instance.is::<Arc<dyn OpenBehavior>>() {
                    "open"
                } else {
                    "unknown"
                }
            })
            .collect();
        assert_eq!(shapes, vec!["closed", "open", "closed"]);
    }

    #[test]
    fn test_register_module() {
        let mut registry = ServiceRegistry::new();
        registry.register_module(|r: &mut ServiceRegistry| {
            r.register_notification_handler::<Pong, _>(Quiet)
                .register_stream_handler::<Ticks, _>(Empty);
        });

        let kinds: Vec<CapabilityKind> = registry
            .descriptors()
            .iter()
            .map(|d| d.capability.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![CapabilityKind::NotificationHandler, CapabilityKind::StreamHandler]
        );
    }
}
