//! Pipeline - Request 型ごとの呼び出しチェーンの構築とキャッシュ
//!
//! # 構築手順
//! 1. `RequestHandler<R>` をちょうど 1 つ解決する（0 件 / 複数件は構成エラー）
//! 2. `PipelineBehavior<R>` を登録順にすべて解決する（open behavior はアダプタで包む）
//! 3. `Next` で入れ子にして呼び出す
//!
//! handler の解決に失敗した場合、behavior は 1 つも実行されません。
//!
//! # キャッシュ
//! キーは具体的な Request 型の `TypeId`。`DashMap::entry().or_insert_with()` で
//! get-or-insert を原子的に行うので、初回構築が競合しても残るのは 1 つだけです
//! （構築自体は競合したスレッドの数だけ走り得る）。
//!
//! Plan モードでも behavior の並び（closed / open の種類と数）は初回に凍結されます。
//! 以降の解決で並びが変わっていれば `ContractViolation` です。

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

use super::options::PipelineCaching;
use crate::domain::{CancellationToken, Capability, MediatorError};
use crate::ports::locator::downcast_instance;
use crate::ports::{HandlerLocator, Instance, LocatorError};
use crate::typed::behavior::OpenBehaviorAdapter;
use crate::typed::{Next, OpenBehavior, PipelineBehavior, Request, RequestHandler};

/// 解決済みのチェーン（1 回のディスパッチ、または Instances モードでは永続）
pub(crate) struct Chain<R: Request> {
    handler: Arc<dyn RequestHandler<R>>,
    behaviors: Vec<Arc<dyn PipelineBehavior<R>>>,
    shape: Vec<BehaviorSlot>,
}

/// behavior 1 枠の種類（Plan モードで凍結される形）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BehaviorSlot {
    Closed,
    Open,
}

impl<R: Request> Chain<R> {
    pub(crate) async fn invoke(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, MediatorError> {
        Next::new(&self.behaviors, self.handler.as_ref(), cancel)
            .run(request)
            .await
    }

    #[cfg(test)]
    pub(crate) fn same_instances(&self, other: &Chain<R>) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
            && self.behaviors.len() == other.behaviors.len()
            && self
                .behaviors
                .iter()
                .zip(&other.behaviors)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

/// locator から R のチェーンを組み立てる
pub(crate) fn resolve_chain<R: Request>(
    locator: &dyn HandlerLocator,
) -> Result<Chain<R>, MediatorError> {
    let handler_cap = Capability::request_handler::<R>();
    let handler = resolve_single::<Arc<dyn RequestHandler<R>>>(locator, &handler_cap)?;

    let behavior_cap = Capability::pipeline_behavior::<R>();
    let (behaviors, shape) = locator
        .resolve_all(&behavior_cap)
        .into_iter()
        .map(|instance| behavior_from_instance::<R>(instance, &behavior_cap))
        .collect::<Result<(Vec<_>, Vec<_>), _>>()?;

    Ok(Chain {
        handler,
        behaviors,
        shape,
    })
}

/// exactly-one の解決（request handler / stream handler 共通）
pub(crate) fn resolve_single<T: 'static>(
    locator: &dyn HandlerLocator,
    capability: &Capability,
) -> Result<T, MediatorError> {
    match locator.resolve_one(capability) {
        Ok(Some(instance)) => downcast_instance::<T>(instance, capability),
        Ok(None) => {
            tracing::warn!(%capability, "no handler registered");
            Err(MediatorError::HandlerNotRegistered {
                kind: capability.kind(),
                message: capability.message_name(),
            })
        }
        Err(LocatorError::Ambiguous { count }) => {
            tracing::warn!(%capability, count, "more than one handler registered");
            Err(MediatorError::AmbiguousHandler {
                kind: capability.kind(),
                message: capability.message_name(),
                count,
            })
        }
    }
}

fn behavior_from_instance<R: Request>(
    instance: Instance,
    capability: &Capability,
) -> Result<(Arc<dyn PipelineBehavior<R>>, BehaviorSlot), MediatorError> {
    match instance.downcast::<Arc<dyn PipelineBehavior<R>>>() {
        Ok(closed) => Ok((*closed, BehaviorSlot::Closed)),
        Err(other) => {
            let open = downcast_instance::<Arc<dyn OpenBehavior>>(other, capability)?;
            Ok((Arc::new(OpenBehaviorAdapter::new(open)), BehaviorSlot::Open))
        }
    }
}

/// キャッシュされる 1 Request 型分のパイプライン
pub(crate) enum CompiledPipeline<R: Request> {
    /// 初回に解決した behavior の並び（種類と数）を凍結し、インスタンスは毎回 locator から解決する
    Plan { shape: Vec<BehaviorSlot> },
    /// 初回に解決したインスタンスを固定
    Pinned(Arc<Chain<R>>),
}

impl<R: Request> CompiledPipeline<R> {
    fn compile(caching: PipelineCaching, chain: &Arc<Chain<R>>) -> Self {
        match caching {
            PipelineCaching::Plan => Self::Plan {
                shape: chain.shape.clone(),
            },
            PipelineCaching::Instances => Self::Pinned(Arc::clone(chain)),
        }
    }

    fn chain(&self, locator: &dyn HandlerLocator) -> Result<Arc<Chain<R>>, MediatorError> {
        match self {
            Self::Pinned(chain) => Ok(Arc::clone(chain)),
            Self::Plan { shape } => {
                let chain = resolve_chain::<R>(locator)?;
                if chain.shape != *shape {
                    tracing::warn!(
                        request = std::any::type_name::<R>(),
                        frozen = ?shape,
                        resolved = ?chain.shape,
                        "behavior set changed since the pipeline was first built"
                    );
                    return Err(MediatorError::contract(
                        std::any::type_name::<R>(),
                        "the behavior set frozen at first dispatch",
                    ));
                }
                Ok(Arc::new(chain))
            }
        }
    }
}

/// Request 型ごとの CompiledPipeline のキャッシュ
pub(crate) struct PipelineCache {
    caching: PipelineCaching,
    entries: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl PipelineCache {
    pub(crate) fn new(caching: PipelineCaching) -> Self {
        Self {
            caching,
            entries: DashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// R のチェーンを取得（なければ構築してキャッシュ）
    pub(crate) fn chain_for<R: Request>(
        &self,
        locator: &dyn HandlerLocator,
    ) -> Result<Arc<Chain<R>>, MediatorError> {
        let key = TypeId::of::<R>();

        // guard を保持したまま entry() を呼ぶと同じ shard でデッドロックするので、先に clone して手放す
        let cached = self.entries.get(&key).map(|entry| Arc::clone(entry.value()));
        if let Some(cached) = cached {
            return Self::typed::<R>(cached)?.chain(locator);
        }

        tracing::debug!(request = std::any::type_name::<R>(), caching = ?self.caching, "building pipeline");
        let built = Arc::new(resolve_chain::<R>(locator)?);
        let compiled = CompiledPipeline::compile(self.caching, &built);

        let stored = Arc::clone(
            self.entries
                .entry(key)
                .or_insert_with(|| Arc::new(compiled))
                .value(),
        );

        // 競合に負けた場合でも、Pinned なら勝者のインスタンスを使う
        match &*Self::typed::<R>(stored)? {
            CompiledPipeline::Pinned(winner) => Ok(Arc::clone(winner)),
            CompiledPipeline::Plan { .. } => Ok(built),
        }
    }

    fn typed<R: Request>(
        entry: Arc<dyn Any + Send + Sync>,
    ) -> Result<Arc<CompiledPipeline<R>>, MediatorError> {
        entry.downcast::<CompiledPipeline<R>>().map_err(|_| {
            MediatorError::contract(
                std::any::type_name::<R>(),
                "a pipeline cached under its own TypeId",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{LoggingBehavior, ServiceRegistry};
    use crate::ports::{FnLocator, instance};
    use crate::testing::{Ping, PingHandler, Recorder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        built: Arc<AtomicUsize>,
        recorder: Recorder,
    }

    impl Counting {
        fn handler(&self) -> PingHandler {
            self.built.fetch_add(1, Ordering::SeqCst);
            PingHandler::new(self.recorder.clone())
        }
    }

    struct Noop;

    #[async_trait]
    impl PipelineBehavior<Ping> for Noop {
        async fn handle(
            &self,
            request: Ping,
            next: Next<'_, Ping>,
            _cancel: &CancellationToken,
        ) -> Result<String, MediatorError> {
            next.run(request).await
        }
    }

    fn transient_registry(built: Arc<AtomicUsize>) -> ServiceRegistry {
        let counting = Counting {
            built,
            recorder: Recorder::default(),
        };
        let mut registry = ServiceRegistry::new();
        registry.register_request_handler_factory::<Ping, _, _>(move || counting.handler());
        registry.register_behavior::<Ping, _>(Noop);
        registry
    }

    #[test]
    fn missing_handler_is_not_cached() {
        let registry = ServiceRegistry::new();
        let cache = PipelineCache::new(PipelineCaching::Plan);

        let err = cache.chain_for::<Ping>(&registry).err().unwrap();
        assert!(matches!(err, MediatorError::HandlerNotRegistered { .. }));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn plan_mode_resolves_fresh_instances_each_time() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = transient_registry(Arc::clone(&built));
        let cache = PipelineCache::new(PipelineCaching::Plan);

        let first = cache.chain_for::<Ping>(&registry).unwrap();
        let second = cache.chain_for::<Ping>(&registry).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert!(!first.same_instances(&second));
    }

    #[test]
    fn plan_mode_rejects_a_changed_behavior_set() {
        let calls = Arc::new(AtomicUsize::new(0));
        let recorder = Recorder::default();
        let locator = {
            let calls = Arc::clone(&calls);
            let recorder = recorder.clone();
            FnLocator::new(
                move |cap: &Capability| {
                    (*cap == Capability::request_handler::<Ping>()).then(|| {
                        let handler: Arc<dyn RequestHandler<Ping>> =
                            Arc::new(PingHandler::new(recorder.clone()));
                        instance(handler)
                    })
                },
                move |_cap: &Capability| {
                    // 2 回目以降だけ behavior が増える
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Vec::new()
                    } else {
                        let late: Arc<dyn PipelineBehavior<Ping>> = Arc::new(Noop);
                        vec![instance(late)]
                    }
                },
            )
        };
        let cache = PipelineCache::new(PipelineCaching::Plan);

        let first = cache.chain_for::<Ping>(&locator).unwrap();
        assert_eq!(first.shape, Vec::<BehaviorSlot>::new());

        let err = cache.chain_for::<Ping>(&locator).err().unwrap();
        assert!(matches!(err, MediatorError::ContractViolation { .. }));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn plan_mode_records_closed_and_open_slots() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_request_handler::<Ping, _>(PingHandler::new(Recorder::default()))
            .register_behavior::<Ping, _>(Noop)
            .register_open_behavior(LoggingBehavior::new());
        let cache = PipelineCache::new(PipelineCaching::Plan);

        let chain = cache.chain_for::<Ping>(&registry).unwrap();
        assert_eq!(chain.shape, vec![BehaviorSlot::Closed, BehaviorSlot::Open]);
        assert!(cache.chain_for::<Ping>(&registry).is_ok());
    }

    #[test]
    fn instances_mode_pins_the_first_resolution() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = transient_registry(Arc::clone(&built));
        let cache = PipelineCache::new(PipelineCaching::Instances);

        let first = cache.chain_for::<Ping>(&registry).unwrap();
        let second = cache.chain_for::<Ping>(&registry).unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(first.same_instances(&second));
    }

    #[test]
    fn concurrent_first_builds_keep_a_single_entry() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(transient_registry(Arc::clone(&built)));
        let cache = Arc::new(PipelineCache::new(PipelineCaching::Instances));

        let chains: Vec<_> = std::thread::scope(|scope| {
            let joins: Vec<_> = (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let cache = Arc::clone(&cache);
                    scope.spawn(move || cache.chain_for::<Ping>(registry.as_ref()).unwrap())
                })
                .collect();
            joins.into_iter().map(|j| j.join().unwrap()).collect()
        });

        assert_eq!(cache.len(), 1);
        // 構築は複数回走り得るが、観測されるインスタンスは 1 組だけ
        assert!(built.load(Ordering::SeqCst) >= 1);
        assert!(chains.iter().all(|c| c.same_instances(&chains[0])));
    }
}
