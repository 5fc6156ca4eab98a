//! Dispatch identifiers (strongly-typed IDs).
//!
//! ログの相関用 ID です。send / publish / create_stream の呼び出しごとに 1 つ発行し、
//! tracing の span に載せます。behavior や handler が出したログも同じ span に入るので、
//! 1 回のディスパッチを横断して追えます。
//!
//! ## Phantom Type パターン
//! `Id<T>` で共通実装を持ちつつ、`T` をマーカーにして
//! DispatchId と PublishId を混同できないようにしています。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "dispatch-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// 新しい ID を発行
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// send のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dispatch {}

impl IdMarker for Dispatch {
    fn prefix() -> &'static str {
        "dispatch-"
    }
}

/// publish のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Publish {}

impl IdMarker for Publish {
    fn prefix() -> &'static str {
        "publish-"
    }
}

/// create_stream のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stream {}

impl IdMarker for Stream {
    fn prefix() -> &'static str {
        "stream-"
    }
}

/// Identifier of one `send` call.
pub type DispatchId = Id<Dispatch>;

/// Identifier of one `publish` call.
pub type PublishId = Id<Publish>;

/// Identifier of one `create_stream` call.
pub type StreamId = Id<Stream>;
