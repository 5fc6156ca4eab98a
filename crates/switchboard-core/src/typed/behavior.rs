//! Pipeline behaviors - handler 呼び出しを包む横断的処理
//!
//! # 学習ポイント
//! - continuation（`Next`）を値として渡す decorator チェーン
//! - スライスを先頭から 1 つずつ剥がしていく再帰（proxy 生成は使わない）
//! - Type erasure: 全 Request 共通の `OpenBehavior` を `PipelineBehavior<R>` に適合させる
//!
//! # 実行順序
//! 登録順に外側から入れ子になります。
//! `b1 → b2 → handler → b2 → b1` の順に呼び出しと結果を観測します。
//! behavior が `next` を呼ばなければ、それより内側は一切実行されません（short-circuit）。

use std::any::{TypeId, type_name};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::handler::RequestHandler;
use super::message::Request;
use crate::domain::{CancellationToken, MediatorError};

/// PipelineBehavior は特定の Request 型に対する decorator
///
/// # 使用例
/// ```ignore
/// struct Audit;
///
/// #[async_trait]
/// impl PipelineBehavior<CreateAccount> for Audit {
///     async fn handle(
///         &self,
///         request: CreateAccount,
///         next: Next<'_, CreateAccount>,
///         _cancel: &CancellationToken,
///     ) -> Result<AccountId, MediatorError> {
///         let owner = request.owner.clone();
///         let id = next.run(request).await?;
///         audit_log(owner, &id);
///         Ok(id)
///     }
/// }
/// ```
#[async_trait]
pub trait PipelineBehavior<R: Request>: Send + Sync {
    async fn handle(
        &self,
        request: R,
        next: Next<'_, R>,
        cancel: &CancellationToken,
    ) -> Result<R::Response, MediatorError>;
}

/// Next はチェーンの残り（後続の behavior と終端 handler）
///
/// 一度だけ `run` できます（所有権で保証）。
pub struct Next<'a, R: Request> {
    behaviors: &'a [Arc<dyn PipelineBehavior<R>>],
    handler: &'a dyn RequestHandler<R>,
    cancel: &'a CancellationToken,
}

impl<'a, R: Request> Next<'a, R> {
    pub(crate) fn new(
        behaviors: &'a [Arc<dyn PipelineBehavior<R>>],
        handler: &'a dyn RequestHandler<R>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            behaviors,
            handler,
            cancel,
        }
    }

    /// 後続のリンクを実行する
    pub async fn run(self, request: R) -> Result<R::Response, MediatorError> {
        match self.behaviors.split_first() {
            Some((first, rest)) => {
                let next = Next::new(rest, self.handler, self.cancel);
                first.handle(request, next, self.cancel).await
            }
            None => self.handler.handle(request, self.cancel).await,
        }
    }

    /// まだ実行されていないリンクの数（handler を含む）
    pub fn remaining(&self) -> usize {
        self.behaviors.len() + 1
    }
}

/// RequestInfo は open behavior から見える Request のメタデータ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestInfo {
    type_id: TypeId,
    name: &'static str,
    response_name: &'static str,
}

impl RequestInfo {
    pub fn of<R: Request>() -> Self {
        Self {
            type_id: TypeId::of::<R>(),
            name: type_name::<R>(),
            response_name: type_name::<R::Response>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 完全修飾の型名
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// モジュールパスを除いた型名（ログ用）
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }

    pub fn response_name(&self) -> &'static str {
        self.response_name
    }
}

pub(crate) fn short_type_name(name: &'static str) -> &'static str {
    // ジェネリック引数の中の `::` は無視する
    let head = name.split('<').next().unwrap_or(name);
    let start = head.rfind("::").map(|i| i + 2).unwrap_or(0);
    &name[start..]
}

/// OpenNext は open behavior に渡される continuation
///
/// 応答値は型消去されているので見えません。成功 / 失敗だけを観測できます。
pub struct OpenNext<'a> {
    inner: BoxFuture<'a, Result<(), MediatorError>>,
}

impl OpenNext<'_> {
    pub async fn run(self) -> Result<(), MediatorError> {
        self.inner.await
    }
}

/// OpenBehavior はすべての Request に適用される behavior
///
/// 一度登録すれば、具体的な Request 型ごとの登録なしに全パイプラインへ入ります。
/// 型付きの応答を作れないので、short-circuit はエラーを返すことでのみ行えます。
/// `next` を呼ばずに `Ok(())` を返すと `MediatorError::MissingResponse` になります。
#[async_trait]
pub trait OpenBehavior: Send + Sync {
    async fn handle(
        &self,
        request: &RequestInfo,
        next: OpenNext<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), MediatorError>;

    /// エラーメッセージ用の名前
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// OpenBehavior を `PipelineBehavior<R>` として扱うアダプタ
pub(crate) struct OpenBehaviorAdapter {
    inner: Arc<dyn OpenBehavior>,
}

impl OpenBehaviorAdapter {
    pub(crate) fn new(inner: Arc<dyn OpenBehavior>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: Request> PipelineBehavior<R> for OpenBehaviorAdapter {
    async fn handle(
        &self,
        request: R,
        next: Next<'_, R>,
        cancel: &CancellationToken,
    ) -> Result<R::Response, MediatorError> {
        let info = RequestInfo::of::<R>();
        let mut response: Option<R::Response> = None;
        {
            let slot = &mut response;
            let rest = OpenNext {
                inner: Box::pin(async move {
                    *slot = Some(next.run(request).await?);
                    Ok(())
                }),
            };
            self.inner.handle(&info, rest, cancel).await?;
        }
        response.ok_or(MediatorError::MissingResponse {
            behavior: self.inner.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Ping, PingHandler, Recorder};

    struct Tag {
        label: &'static str,
        recorder: Recorder,
    }

    #[async_trait]
    impl PipelineBehavior<Ping> for Tag {
        async fn handle(
            &self,
            request: Ping,
            next: Next<'_, Ping>,
            _cancel: &CancellationToken,
        ) -> Result<String, MediatorError> {
            self.recorder.push(format!("{}:before", self.label));
            let response = next.run(request).await;
            self.recorder.push(format!("{}:after", self.label));
            response.map(|r| format!("{}({r})", self.label))
        }
    }

    struct Refuse;

    #[async_trait]
    impl OpenBehavior for Refuse {
        async fn handle(
            &self,
            _request: &RequestInfo,
            _next: OpenNext<'_>,
            _cancel: &CancellationToken,
        ) -> Result<(), MediatorError> {
            Ok(())
        }
    }

    struct PassThrough {
        recorder: Recorder,
    }

    #[async_trait]
    impl OpenBehavior for PassThrough {
        async fn handle(
            &self,
            request: &RequestInfo,
            next: OpenNext<'_>,
            _cancel: &CancellationToken,
        ) -> Result<(), MediatorError> {
            self.recorder.push(format!("open:{}", request.short_name()));
            next.run().await
        }
    }

    #[tokio::test]
    async fn next_nests_in_slice_order() {
        let recorder = Recorder::default();
        let behaviors: Vec<Arc<dyn PipelineBehavior<Ping>>> = vec![
            Arc::new(Tag {
                label: "outer",
                recorder: recorder.clone(),
            }),
            Arc::new(Tag {
                label: "inner",
                recorder: recorder.clone(),
            }),
        ];
        let handler = PingHandler::new(recorder.clone());
        let cancel = CancellationToken::new();

        let next = Next::new(&behaviors, &handler, &cancel);
        assert_eq!(next.remaining(), 3);
        let response = next.run(Ping::new("hi")).await.unwrap();

        assert_eq!(response, "outer(inner(pong:hi))");
        assert_eq!(
            recorder.take(),
            vec![
                "outer:before",
                "inner:before",
                "handler:hi",
                "inner:after",
                "outer:after"
            ]
        );
    }

    #[tokio::test]
    async fn open_behavior_sees_request_metadata() {
        let recorder = Recorder::default();
        let behaviors: Vec<Arc<dyn PipelineBehavior<Ping>>> =
            vec![Arc::new(OpenBehaviorAdapter::new(Arc::new(PassThrough {
                recorder: recorder.clone(),
            })))];
        let handler = PingHandler::new(recorder.clone());
        let cancel = CancellationToken::new();

        let response = Next::new(&behaviors, &handler, &cancel)
            .run(Ping::new("x"))
            .await
            .unwrap();

        assert_eq!(response, "pong:x");
        assert_eq!(recorder.take(), vec!["open:Ping", "handler:x"]);
    }

    #[tokio::test]
    async fn open_behavior_without_next_reports_missing_response() {
        let recorder = Recorder::default();
        let behaviors: Vec<Arc<dyn PipelineBehavior<Ping>>> =
            vec![Arc::new(OpenBehaviorAdapter::new(Arc::new(Refuse)))];
        let handler = PingHandler::new(recorder.clone());
        let cancel = CancellationToken::new();

        let err = Next::new(&behaviors, &handler, &cancel)
            .run(Ping::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediatorError::MissingResponse { behavior } if behavior.ends_with("Refuse")));
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn short_name_strips_module_path() {
        assert_eq!(short_type_name("a::b::Ping"), "Ping");
        assert_eq!(short_type_name("Ping"), "Ping");
        assert_eq!(
            short_type_name("app::Wrapper<core::option::Option<u8>>"),
            "Wrapper<core::option::Option<u8>>"
        );
    }
}
