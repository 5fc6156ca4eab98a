//! ValidationBehavior - handler の手前で Request を検証する
//!
//! # 学習ポイント
//! - クロージャへの blanket impl で、小さな検証は struct を書かずに済ませる
//! - 失敗は全 validator 分を集めてから一度に返す
//!
//! # 使用例
//! ```ignore
//! let validation = ValidationBehavior::<CreateAccount>::new()
//!     .with(|r: &CreateAccount| {
//!         if r.owner.is_empty() {
//!             vec![ValidationFailure::new("owner", "must not be empty")]
//!         } else {
//!             vec![]
//!         }
//!     });
//! registry.register_behavior::<CreateAccount, _>(validation);
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{CancellationToken, MediatorError, ValidationFailure};
use crate::typed::{Next, PipelineBehavior, Request};

/// Validator は Request を検証し、失敗を返す（空なら合格）
pub trait Validator<R>: Send + Sync {
    fn validate(&self, request: &R) -> Vec<ValidationFailure>;
}

impl<R, F> Validator<R> for F
where
    F: Fn(&R) -> Vec<ValidationFailure> + Send + Sync,
{
    fn validate(&self, request: &R) -> Vec<ValidationFailure> {
        self(request)
    }
}

/// ValidationBehavior は validator を順に適用し、1 つでも失敗すれば short-circuit する
pub struct ValidationBehavior<R> {
    validators: Vec<Arc<dyn Validator<R>>>,
}

impl<R: Request> ValidationBehavior<R> {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    pub fn with(mut self, validator: impl Validator<R> + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl<R: Request> Default for ValidationBehavior<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Request> PipelineBehavior<R> for ValidationBehavior<R> {
    async fn handle(
        &self,
        request: R,
        next: Next<'_, R>,
        _cancel: &CancellationToken,
    ) -> Result<R::Response, MediatorError> {
        let failures: Vec<ValidationFailure> = self
            .validators
            .iter()
            .flat_map(|v| v.validate(&request))
            .collect();

        if !failures.is_empty() {
            tracing::warn!(
                request = std::any::type_name::<R>(),
                failures = failures.len(),
                "validation rejected request"
            );
            return Err(MediatorError::Validation(failures));
        }
        next.run(request).await
    }
}
