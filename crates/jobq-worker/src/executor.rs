use crate::handler::{Handler, HandlerResult};
use anyhow::anyhow;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Runs a handler so that nothing it does can take the worker down.
///
/// The invocation runs on its own task: a panic surfaces as an ordinary
/// handler error, and with a timeout configured an overrunning invocation
/// is aborted and fails the item.
pub struct HandlerExecutor {
    handler: Arc<dyn Handler>,
    timeout: Option<Duration>,
}

impl HandlerExecutor {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        HandlerExecutor {
            handler,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn execute(&self, input: Value) -> HandlerResult {
        let handler = Arc::clone(&self.handler);
        let mut task = tokio::spawn(async move { handler.call(input).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    error!("Handler timed out after {:?}", limit);
                    return Err(anyhow!("handler timed out after {:?}", limit));
                }
            },
            None => task.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!("Handler panicked: {}", message);
                Err(anyhow!("handler panicked: {message}"))
            }
            Err(_) => Err(anyhow!("handler was cancelled")),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, EchoHandler, SleepHandler};
    use serde_json::json;

    #[tokio::test]
    async fn test_executor_success() {
        let executor = HandlerExecutor::new(Arc::new(EchoHandler));

        let result = executor.execute(json!("test data")).await.unwrap();
        assert_eq!(result, json!("test data"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_timeout() {
        let executor = HandlerExecutor::new(Arc::new(SleepHandler::new(2000)))
            .with_timeout(Some(Duration::from_secs(1)));

        let result = executor.execute(json!("test")).await;
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_executor_contains_panics() {
        let executor = HandlerExecutor::new(Arc::new(handler_fn(|v| {
            if v == json!("bad") {
                panic!("cannot handle bad input");
            }
            Ok(v)
        })));

        let err = executor.execute(json!("bad")).await.unwrap_err();
        assert!(err.to_string().contains("cannot handle bad input"));

        // The executor is still usable afterwards
        assert_eq!(executor.execute(json!("ok")).await.unwrap(), json!("ok"));
    }
}
