//! Capability - handler / behavior を引くための型キー
//!
//! # 学習ポイント
//! - `TypeId` による実行時の型識別
//! - `std::any::type_name` はエラーメッセージ用（識別には使わない）
//!
//! ジェネリックな trait（`RequestHandler<R>` など）は実行時に名前で引けないので、
//! 「どの能力を」「どのメッセージ型に対して」求めているかを値として表現します。

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::typed::{Notification, Request, StreamRequest};

/// 能力の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    RequestHandler,
    PipelineBehavior,
    NotificationHandler,
    StreamHandler,
    /// すべての Request に適用される behavior
    OpenBehavior,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestHandler => "request handler",
            Self::PipelineBehavior => "pipeline behavior",
            Self::NotificationHandler => "notification handler",
            Self::StreamHandler => "stream handler",
            Self::OpenBehavior => "open behavior",
        };
        f.write_str(name)
    }
}

/// Capability は (種類, メッセージ型, 応答型) の組
///
/// 等価性と hash は `TypeId` だけで決まります。型名は表示専用です。
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    kind: CapabilityKind,
    message: TypeId,
    response: TypeId,
    message_name: &'static str,
    response_name: &'static str,
}

impl Capability {
    fn of<M: 'static, Resp: 'static>(kind: CapabilityKind) -> Self {
        Self {
            kind,
            message: TypeId::of::<M>(),
            response: TypeId::of::<Resp>(),
            message_name: type_name::<M>(),
            response_name: type_name::<Resp>(),
        }
    }

    /// `RequestHandler<R>`
    pub fn request_handler<R: Request>() -> Self {
        Self::of::<R, R::Response>(CapabilityKind::RequestHandler)
    }

    /// `PipelineBehavior<R>`（R 専用の closed behavior）
    pub fn pipeline_behavior<R: Request>() -> Self {
        Self::of::<R, R::Response>(CapabilityKind::PipelineBehavior)
    }

    /// `NotificationHandler<N>`
    pub fn notification_handler<N: Notification>() -> Self {
        Self::of::<N, ()>(CapabilityKind::NotificationHandler)
    }

    /// `StreamHandler<S>`
    pub fn stream_handler<S: StreamRequest>() -> Self {
        Self::of::<S, S::Item>(CapabilityKind::StreamHandler)
    }

    /// 全 Request 共通の open behavior
    pub fn open_behavior() -> Self {
        Self::of::<(), ()>(CapabilityKind::OpenBehavior)
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    pub fn message_type(&self) -> TypeId {
        self.message
    }

    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    pub fn response_name(&self) -> &'static str {
        self.response_name
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message && self.response == other.response
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.message.hash(state);
        self.response.hash(state);
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}<{}, {}>",
            self.kind, self.message_name, self.response_name
        )
    }
}
