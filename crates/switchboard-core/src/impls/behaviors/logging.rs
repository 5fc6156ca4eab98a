//! LoggingBehavior - すべての Request の開始・終了を tracing で記録する open behavior

use std::time::Instant;

use async_trait::async_trait;

use crate::domain::{CancellationToken, MediatorError};
use crate::typed::{OpenBehavior, OpenNext, RequestInfo};

/// LoggingBehavior は Request ごとに info / error を出す
///
/// 応答値そのものは記録しません（型消去されているため）。
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBehavior;

impl LoggingBehavior {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OpenBehavior for LoggingBehavior {
    async fn handle(
        &self,
        request: &RequestInfo,
        next: OpenNext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        let started = Instant::now();
        tracing::info!(request = request.short_name(), "handling");

        let result = next.run().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => tracing::info!(
                request = request.short_name(),
                response = request.response_name(),
                elapsed_ms,
                "handled"
            ),
            Err(err) => tracing::error!(
                request = request.short_name(),
                elapsed_ms,
                error = %err,
                "request failed"
            ),
        }
        result
    }

    fn name(&self) -> &'static str {
        "LoggingBehavior"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Mediator;
    use crate::impls::ServiceRegistry;
    use crate::testing::{Ping, PingHandler, Recorder};

    #[tokio::test]
    async fn logging_passes_the_response_through() {
        let recorder = Recorder::default();
        let mut registry = ServiceRegistry::new();
        registry
            .register_open_behavior(LoggingBehavior::new())
            .register_request_handler::<Ping, _>(PingHandler::new(recorder.clone()));
        let mediator = Mediator::builder().registry(registry).build().unwrap();

        assert_eq!(mediator.send(Ping::new("log")).await.unwrap(), "pong:log");
        assert_eq!(recorder.take(), vec!["handler:log"]);
    }

    #[tokio::test]
    async fn logging_passes_errors_through() {
        let mut registry = ServiceRegistry::new();
        registry.register_open_behavior(LoggingBehavior::new());
        let mediator = Mediator::builder()
            .registry(registry)
            .declare_request::<Ping>()
            .build()
            .unwrap();

        let err = mediator.send(Ping::new("nobody")).await.unwrap_err();
        assert!(matches!(err, MediatorError::HandlerNotRegistered { .. }));
    }
}
