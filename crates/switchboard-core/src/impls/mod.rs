//! Impls - ports の実装と組み込み behavior
//!
//! # 含まれる実装
//! - **ServiceRegistry**: インメモリの HandlerLocator
//! - **LoggingBehavior**: 全 Request の tracing
//! - **ValidationBehavior**: handler 手前での検証

pub mod behaviors;
pub mod registry;

pub use self::behaviors::{LoggingBehavior, ValidationBehavior, Validator};
pub use self::registry::{HandlerModule, Lifetime, ServiceDescriptor, ServiceRegistry};
