//! Errors - ディスパッチエラーの分類
//!
//! エンジン自身はエラーを変換・握りつぶし・リトライしません。
//! handler / behavior が返したエラーはそのまま呼び出し元まで伝播します。
//!
//! # 分類
//! - 構成エラー: `HandlerNotRegistered`, `AmbiguousHandler`, `ContractViolation`
//! - 実行エラー: `Handler`, `Behavior`, `Validation`, `InvalidPayload`, `Cancelled`
//! - 集約エラー: `NotificationFailed`（publish の部分失敗）

use std::fmt;

use thiserror::Error;

use super::capability::CapabilityKind;

/// handler / behavior が返すドメインエラーの箱
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// MediatorError はディスパッチ全体で共通のエラー型
#[derive(Debug, Error)]
pub enum MediatorError {
    #[error("no {kind} registered for {message}")]
    HandlerNotRegistered {
        kind: CapabilityKind,
        message: &'static str,
    },

    #[error("{count} candidates registered as {kind} for {message}; exactly one is required")]
    AmbiguousHandler {
        kind: CapabilityKind,
        message: &'static str,
        count: usize,
    },

    #[error("{type_name} does not declare {expected}")]
    ContractViolation {
        type_name: String,
        expected: &'static str,
    },

    #[error("payload for {request} could not be decoded: {reason}")]
    InvalidPayload {
        request: &'static str,
        reason: String,
    },

    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    #[error("behavior failed: {0}")]
    Behavior(#[source] BoxError),

    #[error("validation failed: {}", ValidationFailure::join(.0))]
    Validation(Vec<ValidationFailure>),

    #[error("{} of {handlers} handler(s) failed for {notification}", .failures.len())]
    NotificationFailed {
        notification: &'static str,
        handlers: usize,
        failures: Vec<NotificationFailure>,
    },

    #[error("handler panicked: {message}")]
    HandlerPanicked { message: String },

    #[error("behavior {behavior} completed without calling next and produced no response")]
    MissingResponse { behavior: &'static str },

    #[error("operation cancelled")]
    Cancelled,
}

impl MediatorError {
    /// handler 内のドメインエラーを包む
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// behavior 内のドメインエラーを包む
    pub fn behavior(err: impl Into<BoxError>) -> Self {
        Self::Behavior(err.into())
    }

    pub(crate) fn contract(type_name: impl Into<String>, expected: &'static str) -> Self {
        Self::ContractViolation {
            type_name: type_name.into(),
            expected,
        }
    }

    /// 構成ミス（登録漏れ・重複・契約違反）かどうか
    ///
    /// 構成エラーは何度呼び直しても結果が変わらないので、呼び出し側は
    /// リトライ対象から外すべきです。
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::HandlerNotRegistered { .. }
                | Self::AmbiguousHandler { .. }
                | Self::ContractViolation { .. }
        )
    }
}

/// 1 件の入力検証エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    fn join(failures: &[ValidationFailure]) -> String {
        failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// publish で失敗した handler 1 件分
///
/// `handler_index` は resolve_all が返した順（= 登録順）の位置です。
#[derive(Debug)]
pub struct NotificationFailure {
    pub handler_index: usize,
    pub error: MediatorError,
}

impl fmt::Display for NotificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler #{}: {}", self.handler_index, self.error)
    }
}
