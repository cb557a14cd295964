use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

use crate::domain::errors::CapabilityError;

/// Port for an externally supplied unit of executable work.
///
/// The core never inspects `parameters` or the returned value beyond
/// hashing the parameters for cache keys and logging.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Execute the capability with opaque parameters.
    async fn execute(&self, parameters: Value) -> Result<Value, CapabilityError>;
}

/// Adapts an async closure into a [`Capability`].
///
/// ```no_run
/// use conductor::domain::ports::FnCapability;
/// use serde_json::json;
///
/// let echo = FnCapability::new(|params| async move { Ok(json!({ "echo": params })) });
/// ```
pub struct FnCapability<F> {
    func: F,
}

impl<F, Fut> FnCapability<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CapabilityError>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Capability for FnCapability<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CapabilityError>> + Send,
{
    async fn execute(&self, parameters: Value) -> Result<Value, CapabilityError> {
        (self.func)(parameters).await
    }
}
