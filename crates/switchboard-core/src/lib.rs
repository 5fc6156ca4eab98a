//! switchboard-core
//!
//! プロセス内メディエータ。呼び出し側は具体的な handler 型を知らずに
//! メッセージを送り、handler はメッセージ型ごとに DI コンテナ（`HandlerLocator`）から解決されます。
//!
//! # モジュール構成
//! - **domain**: エラー、Capability キー、キャンセル、ID
//! - **typed**: 型付きメッセージ API（Request, Notification, StreamRequest と各 handler / behavior trait）
//! - **ports**: 抽象化レイヤー（HandlerLocator）
//! - **impls**: 実装（ServiceRegistry, LoggingBehavior, ValidationBehavior）
//! - **app**: ディスパッチエンジン（Mediator, MediatorBuilder, パイプラインキャッシュ, contract table）
//!
//! # 3 つのメッセージパターン
//! - `send`: 1 Request → 1 handler（pipeline behaviors で包まれる）
//! - `publish`: 1 Notification → 0 個以上の handler
//! - `create_stream`: 1 StreamRequest → 1 handler → 遅延シーケンス

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

#[cfg(test)]
mod testing;

pub use crate::app::{
    BuildError, Mediator, MediatorBuilder, MediatorOptions, PipelineCaching, PublishStrategy,
    Publisher, RegistryError, Sender,
};
pub use crate::domain::{CancellationToken, MediatorError, ValidationFailure};
pub use crate::impls::{HandlerModule, LoggingBehavior, ServiceRegistry, ValidationBehavior};
pub use crate::typed::{
    NamedRequest, Next, Notification, NotificationHandler, OpenBehavior, OpenNext,
    PipelineBehavior, Request, RequestHandler, RequestInfo, ResponseStream, StreamHandler,
    StreamRequest,
};
