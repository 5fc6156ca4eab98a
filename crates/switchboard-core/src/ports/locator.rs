//! HandlerLocator port - handler / behavior インスタンスの解決
//!
//! ディスパッチエンジンはインスタンスを自分で生成しません。
//! 生成と寿命はバックエンドのコンテナ（`ServiceRegistry` や外部の DI）が持ち、
//! エンジンはこの port を通して「1 つ」または「全部」を引くだけです。
//!
//! # インスタンスの形
//! `Instance` は `Box<dyn Any + Send>` で、中身は Capability の種類ごとに決まっています。
//!
//! | CapabilityKind | Box の中身 |
//! |---|---|
//! | RequestHandler | `Arc<dyn RequestHandler<R>>` |
//! | PipelineBehavior | `Arc<dyn PipelineBehavior<R>>` または `Arc<dyn OpenBehavior>` |
//! | NotificationHandler | `Arc<dyn NotificationHandler<N>>` |
//! | StreamHandler | `Arc<dyn StreamHandler<S>>` |
//!
//! 中身が合わない場合、エンジンは `MediatorError::ContractViolation` で失敗します。

use std::any::{Any, type_name};
use std::sync::Arc;

use thiserror::Error;

use crate::domain::{Capability, MediatorError};

/// 型消去されたインスタンス
pub type Instance = Box<dyn Any + Send>;

/// `Arc<dyn Trait>` を `Instance` に包む
pub fn instance<T: ?Sized + Send + Sync + 'static>(shared: Arc<T>) -> Instance {
    Box::new(shared)
}

/// LocatorError は resolve_one の失敗
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocatorError {
    #[error("{count} candidates registered where at most one is allowed")]
    Ambiguous { count: usize },
}

/// HandlerLocator は Capability からインスタンスを解決する
///
/// # 契約
/// - `resolve_one`: 0 件なら `Ok(None)`、2 件以上なら `Err(Ambiguous)`
/// - `resolve_all`: 登録順。0 件なら空の Vec
/// - どちらも呼び出し側から見て副作用なし（内部で遅延生成してもよい）
pub trait HandlerLocator: Send + Sync {
    fn resolve_one(&self, capability: &Capability) -> Result<Option<Instance>, LocatorError>;

    fn resolve_all(&self, capability: &Capability) -> Vec<Instance>;
}

impl<L: HandlerLocator + ?Sized> HandlerLocator for Arc<L> {
    fn resolve_one(&self, capability: &Capability) -> Result<Option<Instance>, LocatorError> {
        (**self).resolve_one(capability)
    }

    fn resolve_all(&self, capability: &Capability) -> Vec<Instance> {
        (**self).resolve_all(capability)
    }
}

/// FnLocator は 2 つの関数から HandlerLocator を作る
///
/// 既存の DI コンテナに橋渡しするときに使います。
///
/// # 使用例
/// ```ignore
/// let locator = FnLocator::new(
///     move |cap| container.get_one(cap),
///     move |cap| container.get_all(cap),
/// );
/// ```
pub struct FnLocator<One, All> {
    one: One,
    all: All,
}

impl<One, All> FnLocator<One, All>
where
    One: Fn(&Capability) -> Option<Instance> + Send + Sync,
    All: Fn(&Capability) -> Vec<Instance> + Send + Sync,
{
    pub fn new(one: One, all: All) -> Self {
        Self { one, all }
    }
}

impl<One, All> HandlerLocator for FnLocator<One, All>
where
    One: Fn(&Capability) -> Option<Instance> + Send + Sync,
    All: Fn(&Capability) -> Vec<Instance> + Send + Sync,
{
    fn resolve_one(&self, capability: &Capability) -> Result<Option<Instance>, LocatorError> {
        Ok((self.one)(capability))
    }

    fn resolve_all(&self, capability: &Capability) -> Vec<Instance> {
        (self.all)(capability)
    }
}

/// Instance を期待する型に戻す
///
/// 型が合わなければ locator の設定ミスなので ContractViolation。
pub(crate) fn downcast_instance<T: 'static>(
    instance: Instance,
    capability: &Capability,
) -> Result<T, MediatorError> {
    instance.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        tracing::warn!(%capability, expected = type_name::<T>(), "locator returned an instance of the wrong shape");
        MediatorError::contract(format!("instance resolved for {capability}"), type_name::<T>())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Ping, PingHandler, Recorder};
    use crate::typed::RequestHandler;

    #[test]
    fn fn_locator_delegates_to_closures() {
        let locator = FnLocator::new(
            |cap: &Capability| {
                (*cap == Capability::request_handler::<Ping>()).then(|| {
                    let handler: Arc<dyn RequestHandler<Ping>> =
                        Arc::new(PingHandler::new(Recorder::default()));
                    instance(handler)
                })
            },
            |_cap: &Capability| Vec::new(),
        );

        let found = locator
            .resolve_one(&Capability::request_handler::<Ping>())
            .unwrap();
        assert!(found.is_some());
        assert!(
            locator
                .resolve_all(&Capability::pipeline_behavior::<Ping>())
                .is_empty()
        );
    }

    #[test]
    fn downcast_rejects_wrong_shape() {
        let cap = Capability::request_handler::<Ping>();
        let wrong: Instance = Box::new(42_u8);
        let err = downcast_instance::<Arc<dyn RequestHandler<Ping>>>(wrong, &cap)
            .err()
            .unwrap();
        assert!(matches!(err, MediatorError::ContractViolation { .. }));
    }
}
