//! MediatorBuilder - Mediator の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 遅延検出が既定。起動時検証（Fail-fast）は `expect_*` でオプトイン

use std::sync::Arc;

use super::contracts::{ContractTable, RegistryError};
use super::mediator::Mediator;
use super::options::{MediatorOptions, PipelineCaching, PublishStrategy};
use crate::domain::Capability;
use crate::impls::ServiceRegistry;
use crate::ports::{HandlerLocator, LocatorError};
use crate::typed::{NamedRequest, Notification, Request, StreamRequest};

/// MediatorBuilder は Mediator を構築
///
/// # 使用例
/// ```ignore
/// let mediator = MediatorBuilder::new()
///     .registry(registry)
///     .pipeline_caching(PipelineCaching::Instances)
///     .expect_request::<CreateAccount>()
///     .build()?;
/// ```
///
/// # Fail-fast 設計（オプトイン）
/// - `expect_request::<R>()` / `expect_stream::<S>()` で handler が必須の型を宣言
/// - `build()` 時に locator で解決できるかをチェック
/// - 宣言しなければ、登録漏れは最初のディスパッチで初めて検出される
pub struct MediatorBuilder {
    locator: Option<Arc<dyn HandlerLocator>>,
    contracts: Vec<ContractTable>,
    pending: ContractTable,
    json_errors: Vec<RegistryError>,
    options: MediatorOptions,
    expected: Vec<Capability>,
}

/// BuildError は Mediator 構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("no handler locator was configured")]
    MissingLocator,

    #[error("Missing handlers: {0:?}. These were expected but not registered.")]
    MissingHandlers(Vec<String>),

    #[error("Ambiguous handlers: {0:?}. Exactly one registration is required.")]
    AmbiguousHandlers(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self {
            locator: None,
            contracts: Vec::new(),
            pending: ContractTable::new(),
            json_errors: Vec::new(),
            options: MediatorOptions::default(),
            expected: Vec::new(),
        }
    }

    /// ServiceRegistry を locator として使い、その contract table も取り込む
    pub fn registry(mut self, registry: ServiceRegistry) -> Self {
        let (registry, contracts) = registry.into_parts();
        self.contracts.push(contracts);
        self.locator = Some(Arc::new(registry));
        self
    }

    /// 任意の HandlerLocator を使う（contract は `declare_*` で別途宣言）
    pub fn locator(mut self, locator: impl HandlerLocator + 'static) -> Self {
        self.locator = Some(Arc::new(locator));
        self
    }

    pub fn declare_request<R: Request>(mut self) -> Self {
        self.pending.declare_request::<R>();
        self
    }

    pub fn declare_notification<N: Notification>(mut self) -> Self {
        self.pending.declare_notification::<N>();
        self
    }

    pub fn declare_stream<S: StreamRequest>(mut self) -> Self {
        self.pending.declare_stream::<S>();
        self
    }

    /// 名前の衝突は `build()` で `BuildError::Registry` になる
    pub fn expose_json<R: NamedRequest>(mut self) -> Self {
        if let Err(err) = self.pending.expose_json::<R>() {
            self.json_errors.push(err);
        }
        self
    }

    pub fn options(mut self, options: MediatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn pipeline_caching(mut self, caching: PipelineCaching) -> Self {
        self.options.pipeline_caching = caching;
        self
    }

    pub fn publish_strategy(mut self, strategy: PublishStrategy) -> Self {
        self.options.publish_strategy = strategy;
        self
    }

    pub fn expect_request<R: Request>(mut self) -> Self {
        self.expected.push(Capability::request_handler::<R>());
        self
    }

    pub fn expect_stream<S: StreamRequest>(mut self) -> Self {
        self.expected.push(Capability::stream_handler::<S>());
        self
    }

    /// Mediator を構築
    ///
    /// # 検証
    /// - locator が設定されているか
    /// - JSON ルート名が衝突していないか
    /// - `expect_*` した Capability がちょうど 1 つずつ解決できるか
    pub fn build(self) -> Result<Mediator, BuildError> {
        let locator = self.locator.ok_or(BuildError::MissingLocator)?;
        if let Some(err) = self.json_errors.into_iter().next() {
            return Err(err.into());
        }

        let mut contracts = ContractTable::new();
        for table in self.contracts {
            contracts.merge(table)?;
        }
        contracts.merge(self.pending)?;

        let mut missing = Vec::new();
        let mut ambiguous = Vec::new();
        for capability in &self.expected {
            match locator.resolve_one(capability) {
                Ok(Some(_)) => {}
                Ok(None) => missing.push(capability.to_string()),
                Err(LocatorError::Ambiguous { .. }) => ambiguous.push(capability.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(BuildError::MissingHandlers(missing));
        }
        if !ambiguous.is_empty() {
            return Err(BuildError::AmbiguousHandlers(ambiguous));
        }

        tracing::debug!(options = ?self.options, "mediator built");
        Ok(Mediator::new(locator, contracts, self.options))
    }
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FnLocator;
    use crate::testing::{Ping, PingHandler, Recorder, Ticks};

    #[test]
    fn build_without_locator_fails() {
        let err = MediatorBuilder::new().build().err().unwrap();
        assert_eq!(err, BuildError::MissingLocator);
    }

    #[test]
    fn build_success_with_expectations() {
        let mut registry = ServiceRegistry::new();
        registry.register_request_handler::<Ping, _>(PingHandler::new(Recorder::default()));

        let mediator = MediatorBuilder::new()
            .registry(registry)
            .expect_request::<Ping>()
            .build();
        assert!(mediator.is_ok());
    }

    #[test]
    fn build_missing_handlers() {
        let mut registry = ServiceRegistry::new();
        registry.register_request_handler::<Ping, _>(PingHandler::new(Recorder::default()));

        let err = MediatorBuilder::new()
            .registry(registry)
            .expect_request::<Ping>()
            .expect_stream::<Ticks>()
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BuildError::MissingHandlers(missing) if missing.len() == 1 && missing[0].contains("Ticks")
        ));
    }

    #[test]
    fn build_ambiguous_handlers() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_request_handler::<Ping, _>(PingHandler::new(Recorder::default()))
            .register_request_handler::<Ping, _>(PingHandler::new(Recorder::default()));

        let err = MediatorBuilder::new()
            .registry(registry)
            .expect_request::<Ping>()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::AmbiguousHandlers(_)));
    }

    #[test]
    fn build_no_expectations_defers_detection() {
        let locator = FnLocator::new(|_| None, |_| Vec::new());
        let mediator = MediatorBuilder::new()
            .locator(locator)
            .declare_request::<Ping>()
            .build()
            .unwrap();
        assert!(
            mediator
                .request_contract(std::any::TypeId::of::<Ping>())
                .is_some()
        );
    }
}
