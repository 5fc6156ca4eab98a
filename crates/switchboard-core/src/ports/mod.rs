//! Ports - 抽象化レイヤー
//!
//! ディスパッチエンジンが外部（DI コンテナ）に求めるインターフェースを定義します。
//! エンジンは `HandlerLocator` 以外の方法で handler を知ることはありません。

pub mod locator;

pub use self::locator::{FnLocator, HandlerLocator, Instance, LocatorError, instance};
