use crate::{Result, WorkerError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Result type for handlers
pub type HandlerResult = anyhow::Result<Value>;

/// User-supplied processing step.
///
/// In a simple runner the output is discarded; in a pipeline it becomes the
/// input of the next stage. Any error marks the item as failed.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, input: Value) -> HandlerResult;
}

/// Handler backed by a plain closure, see [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap a synchronous closure as a [`Handler`]
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(Value) -> HandlerResult + Send + Sync,
{
    FnHandler { f }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(Value) -> HandlerResult + Send + Sync,
{
    async fn call(&self, input: Value) -> HandlerResult {
        (self.f)(input)
    }
}

/// Named handlers, so runners can be assembled from configuration
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn Handler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry preloaded with `echo`, `sleep`, `json_summary` and `fail`
    pub fn with_builtins() -> Self {
        let registry = HandlerRegistry::new();
        registry.register("echo", EchoHandler);
        registry.register("sleep", SleepHandler::new(1000));
        registry.register("json_summary", JsonSummaryHandler);
        registry.register("fail", FailHandler);
        registry
    }

    pub fn register<H: Handler + 'static>(&self, name: impl Into<String>, handler: H) {
        let mut handlers = self.handlers.write();
        handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        let handlers = self.handlers.read();
        handlers.get(name).cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Handler>> {
        self.get(name)
            .ok_or_else(|| WorkerError::UnknownHandler(name.to_string()))
    }

    pub fn has_handler(&self, name: &str) -> bool {
        let handlers = self.handlers.read();
        handlers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let handlers = self.handlers.read();
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Passes its input through unchanged
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn call(&self, input: Value) -> HandlerResult {
        Ok(input)
    }
}

/// Simulates work by sleeping, then passes its input through
pub struct SleepHandler {
    duration_ms: u64,
}

impl SleepHandler {
    pub fn new(duration_ms: u64) -> Self {
        SleepHandler { duration_ms }
    }
}

#[async_trait]
impl Handler for SleepHandler {
    async fn call(&self, input: Value) -> HandlerResult {
        tokio::time::sleep(tokio::time::Duration::from_millis(self.duration_ms)).await;
        Ok(input)
    }
}

/// Summarises a JSON value: key count for objects, length for arrays
pub struct JsonSummaryHandler;

#[async_trait]
impl Handler for JsonSummaryHandler {
    async fn call(&self, input: Value) -> HandlerResult {
        let summary = match &input {
            Value::Object(obj) => json!({ "kind": "object", "key_count": obj.len() }),
            Value::Array(items) => json!({ "kind": "array", "len": items.len() }),
            Value::String(s) => json!({ "kind": "string", "len": s.chars().count() }),
            other => json!({ "kind": "scalar", "value": other }),
        };
        Ok(json!({ "summary": summary, "original": input }))
    }
}

/// Always fails; useful to exercise the error path of a deployment
pub struct FailHandler;

#[async_trait]
impl Handler for FailHandler {
    async fn call(&self, input: Value) -> HandlerResult {
        anyhow::bail!("refusing to process {input}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_handler() {
        let input = json!({"id": 3});
        let result = EchoHandler.call(input.clone()).await.unwrap();
        assert_eq!(result, input);
    }

    #[tokio::test]
    async fn test_registry() {
        let registry = HandlerRegistry::new();
        registry.register("double", handler_fn(|v| Ok(json!(v.as_i64().unwrap_or(0) * 2))));

        assert!(registry.has_handler("double"));
        assert!(!registry.has_handler("unknown"));
        assert!(matches!(
            registry.resolve("unknown"),
            Err(WorkerError::UnknownHandler(ref name)) if name == "unknown"
        ));

        let handler = registry.resolve("double").unwrap();
        assert_eq!(handler.call(json!(21)).await.unwrap(), json!(42));
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["echo", "fail", "json_summary", "sleep"]);
    }

    #[tokio::test]
    async fn test_json_summary_handler() {
        let result = JsonSummaryHandler
            .call(json!({"a": 1, "b": 2}))
            .await
            .unwrap();
        assert_eq!(result["summary"]["key_count"], 2);
        assert_eq!(result["original"]["b"], 2);
    }

    #[tokio::test]
    async fn test_fail_handler() {
        let err = FailHandler.call(json!("x")).await.unwrap_err();
        assert!(err.to_string().contains("refusing to process"));
    }
}
