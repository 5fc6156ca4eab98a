//! ContractTable - 型消去されたメッセージから型付き経路への対応表
//!
//! # 学習ポイント
//! - ジェネリック関数を関数ポインタにして HashMap に入れる（単相化済みの入口）
//! - `Box<dyn Any>` の downcast で「宣言された型」かどうかを確認する（fail closed）
//!
//! 型が実行時にしか分からない呼び出し（`send_any` など）は、
//! 登録時に作ったこの表で TypeId を引き、型付きの `send` / `publish` / `create_stream` に委譲します。
//! 表にない型は `ContractViolation` です。推測で呼び出すことはしません。

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use futures::TryStreamExt;
use futures::future::BoxFuture;
use futures::stream::StreamExt;

use super::mediator::{Mediator, PublishMode};
use crate::domain::{CancellationToken, MediatorError};
use crate::typed::{NamedRequest, Notification, Request, ResponseStream, StreamRequest};

/// 型消去されたメッセージ / 応答
pub type AnyMessage = Box<dyn Any + Send>;

type SendFn = for<'a> fn(
    &'a Mediator,
    AnyMessage,
    &'a CancellationToken,
) -> BoxFuture<'a, Result<AnyMessage, MediatorError>>;

type PublishFn = for<'a> fn(
    &'a Mediator,
    AnyMessage,
    &'a CancellationToken,
    PublishMode,
) -> BoxFuture<'a, Result<(), MediatorError>>;

type StreamFn = fn(
    &Mediator,
    AnyMessage,
    &CancellationToken,
) -> Result<ResponseStream<AnyMessage>, MediatorError>;

type JsonFn = for<'a> fn(
    &'a Mediator,
    serde_json::Value,
    &'a CancellationToken,
) -> BoxFuture<'a, Result<serde_json::Value, MediatorError>>;

/// RegistryError は登録時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("request name '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Request 型に宣言された応答型
#[derive(Clone, Copy)]
pub struct RequestContract {
    pub request: &'static str,
    pub response: &'static str,
    send: SendFn,
}

#[derive(Clone, Copy)]
pub struct NotificationContract {
    pub notification: &'static str,
    publish: PublishFn,
}

#[derive(Clone, Copy)]
pub struct StreamContract {
    pub request: &'static str,
    pub item: &'static str,
    open: StreamFn,
}

#[derive(Clone, Copy)]
struct JsonRoute {
    request: TypeId,
    send: JsonFn,
}

/// ContractTable は登録時に一度だけ作られ、実行時は読み取り専用
#[derive(Clone, Default)]
pub struct ContractTable {
    requests: HashMap<TypeId, RequestContract>,
    notifications: HashMap<TypeId, NotificationContract>,
    streams: HashMap<TypeId, StreamContract>,
    json: HashMap<&'static str, JsonRoute>,
}

impl ContractTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_request<R: Request>(&mut self) {
        self.requests.insert(
            TypeId::of::<R>(),
            RequestContract {
                request: type_name::<R>(),
                response: type_name::<R::Response>(),
                send: send_erased::<R>,
            },
        );
    }

    pub fn declare_notification<N: Notification>(&mut self) {
        self.notifications.insert(
            TypeId::of::<N>(),
            NotificationContract {
                notification: type_name::<N>(),
                publish: publish_erased::<N>,
            },
        );
    }

    pub fn declare_stream<S: StreamRequest>(&mut self) {
        self.streams.insert(
            TypeId::of::<S>(),
            StreamContract {
                request: type_name::<S>(),
                item: type_name::<S::Item>(),
                open: stream_erased::<S>,
            },
        );
    }

    /// `R::NAME` で JSON から送れるようにする（Request としても宣言される）
    pub fn expose_json<R: NamedRequest>(&mut self) -> Result<(), RegistryError> {
        match self.json.entry(R::NAME) {
            Entry::Occupied(existing) if existing.get().request != TypeId::of::<R>() => {
                return Err(RegistryError::AlreadyRegistered(R::NAME.to_string()));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(JsonRoute {
                    request: TypeId::of::<R>(),
                    send: send_json_erased::<R>,
                });
            }
        }
        self.declare_request::<R>();
        Ok(())
    }

    /// 別の表を取り込む（JSON 名の衝突はエラー）
    pub fn merge(&mut self, other: ContractTable) -> Result<(), RegistryError> {
        for (name, route) in &other.json {
            if let Some(existing) = self.json.get(name)
                && existing.request != route.request
            {
                return Err(RegistryError::AlreadyRegistered(name.to_string()));
            }
        }
        self.requests.extend(other.requests);
        self.notifications.extend(other.notifications);
        self.streams.extend(other.streams);
        self.json.extend(other.json);
        Ok(())
    }

    pub fn request(&self, type_id: TypeId) -> Option<&RequestContract> {
        self.requests.get(&type_id)
    }

    pub fn notification(&self, type_id: TypeId) -> Option<&NotificationContract> {
        self.notifications.get(&type_id)
    }

    pub fn stream(&self, type_id: TypeId) -> Option<&StreamContract> {
        self.streams.get(&type_id)
    }

    pub fn json_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.json.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub(crate) async fn send_any(
        &self,
        mediator: &Mediator,
        message: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<AnyMessage, MediatorError> {
        let contract = self
            .request(message_type(&message))
            .ok_or_else(|| undeclared(&message, "Request"))?;
        (contract.send)(mediator, message, cancel).await
    }

    pub(crate) async fn publish_any(
        &self,
        mediator: &Mediator,
        message: AnyMessage,
        cancel: &CancellationToken,
        mode: PublishMode,
    ) -> Result<(), MediatorError> {
        let contract = self
            .notification(message_type(&message))
            .ok_or_else(|| undeclared(&message, "Notification"))?;
        (contract.publish)(mediator, message, cancel, mode).await
    }

    pub(crate) fn create_stream_any(
        &self,
        mediator: &Mediator,
        message: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream<AnyMessage>, MediatorError> {
        let contract = self
            .stream(message_type(&message))
            .ok_or_else(|| undeclared(&message, "StreamRequest"))?;
        (contract.open)(mediator, message, cancel)
    }

    pub(crate) async fn send_json(
        &self,
        mediator: &Mediator,
        name: &str,
        payload: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, MediatorError> {
        let route = self.json.get(name).ok_or_else(|| {
            tracing::warn!(name, "no request is exposed under this name");
            MediatorError::contract(name, "NamedRequest")
        })?;
        (route.send)(mediator, payload, cancel).await
    }
}

fn message_type(message: &AnyMessage) -> TypeId {
    // Box ではなく中身の TypeId
    let inner: &dyn Any = &**message;
    inner.type_id()
}

fn undeclared(message: &AnyMessage, expected: &'static str) -> MediatorError {
    let type_id = message_type(message);
    tracing::warn!(?type_id, expected, "untyped dispatch of an undeclared message type");
    MediatorError::contract("undeclared message type", expected)
}

fn send_erased<'a, R: Request>(
    mediator: &'a Mediator,
    message: AnyMessage,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<AnyMessage, MediatorError>> {
    Box::pin(async move {
        let request = message
            .downcast::<R>()
            .map_err(|_| MediatorError::contract(type_name::<R>(), "Request"))?;
        let response = mediator.send_with(*request, cancel).await?;
        Ok(Box::new(response) as AnyMessage)
    })
}

fn publish_erased<'a, N: Notification>(
    mediator: &'a Mediator,
    message: AnyMessage,
    cancel: &'a CancellationToken,
    mode: PublishMode,
) -> BoxFuture<'a, Result<(), MediatorError>> {
    Box::pin(async move {
        let notification = message
            .downcast::<N>()
            .map_err(|_| MediatorError::contract(type_name::<N>(), "Notification"))?;
        mediator.publish_in_mode(*notification, cancel, mode).await
    })
}

fn stream_erased<S: StreamRequest>(
    mediator: &Mediator,
    message: AnyMessage,
    cancel: &CancellationToken,
) -> Result<ResponseStream<AnyMessage>, MediatorError> {
    let request = message
        .downcast::<S>()
        .map_err(|_| MediatorError::contract(type_name::<S>(), "StreamRequest"))?;
    let stream = mediator.create_stream_with(*request, cancel)?;
    Ok(stream.map_ok(|item| Box::new(item) as AnyMessage).boxed())
}

fn send_json_erased<'a, R: NamedRequest>(
    mediator: &'a Mediator,
    payload: serde_json::Value,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<serde_json::Value, MediatorError>> {
    Box::pin(async move {
        let request: R =
            serde_json::from_value(payload).map_err(|e| MediatorError::InvalidPayload {
                request: R::NAME,
                reason: e.to_string(),
            })?;
        let response = mediator.send_with(request, cancel).await?;
        serde_json::to_value(&response).map_err(MediatorError::handler)
    })
}
