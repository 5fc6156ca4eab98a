//! テスト用の共通フィクスチャ

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{CancellationToken, MediatorError};
use crate::typed::{Notification, Request, RequestHandler, StreamRequest};

/// 呼び出し順を記録する共有ログ
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Ping {
    pub text: String,
}

impl Ping {
    pub(crate) fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl Request for Ping {
    type Response = String;
}

pub(crate) struct PingHandler {
    recorder: Recorder,
}

impl PingHandler {
    pub(crate) fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl RequestHandler<Ping> for PingHandler {
    async fn handle(
        &self,
        request: Ping,
        _cancel: &CancellationToken,
    ) -> Result<String, MediatorError> {
        self.recorder.push(format!("handler:{}", request.text));
        Ok(format!("pong:{}", request.text))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Pong {
    pub text: String,
}

impl Notification for Pong {}

#[derive(Debug, Clone)]
pub(crate) struct Ticks {
    pub count: u32,
}

impl StreamRequest for Ticks {
    type Item = u32;
}
