//! Typed - 型付きメッセージ API
//!
//! このモジュールは Request と handler の対応を型で表現し、
//! 応答型の取り違えをコンパイル時に排除します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Request`, `RequestHandler<R>`, `PipelineBehavior<R>` - 型安全
//! - **内部（Erased）**: `Box<dyn Any + Send>` と `Capability` キー - locator と contract table が扱う

pub mod behavior;
pub mod handler;
pub mod message;

pub use self::behavior::{Next, OpenBehavior, OpenNext, PipelineBehavior, RequestInfo};
pub use self::handler::{NotificationHandler, RequestHandler, ResponseStream, StreamHandler};
pub use self::message::{NamedRequest, Notification, Request, StreamRequest};
