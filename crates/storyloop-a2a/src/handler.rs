//! Skill handlers: the opaque async capability behind every role.
//!
//! The same handler type is hosted by the agent server and invoked
//! in-process by local executors, so a role behaves identically either way.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;

use crate::envelope::Payload;

/// An async skill implementation.
#[async_trait]
pub trait SkillHandler: Send + Sync {
    async fn handle(&self, payload: Payload) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure into a [`SkillHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> SkillHandler for FnHandler<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn handle(&self, payload: Payload) -> anyhow::Result<Value> {
        (self.0)(payload).await
    }
}

/// Wrap an async closure `(Payload) -> anyhow::Result<Value>` as a shared handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn SkillHandler>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Invoke a handler, converting both `Err` and panics into an error message.
pub async fn invoke_guarded(handler: &dyn SkillHandler, payload: Payload) -> Result<Value, String> {
    match AssertUnwindSafe(handler.handle(payload)).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(panic) => Err(panic_message(panic)),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
