// Model channel: the opaque request/response boundary to the LLM backend

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::errors::RefineError;
use crate::protocol::Persona;

pub mod replay;

pub use replay::ReplayModel;

/// Anything that can turn a prompt into a response.
///
/// Output may be malformed; callers are expected to parse defensively.
#[async_trait]
pub trait ModelChannel: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<ModelResponse>;

    /// Model identifier, used to size the token budget
    fn model_id(&self) -> &str;
}

/// A structured (tool-style) call emitted alongside the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub text: String,
    #[serde(default)]
    pub structured_calls: Vec<StructuredCall>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured_calls: Vec::new(),
        }
    }

    pub fn with_call(mut self, name: impl Into<String>, arguments: Value) -> Self {
        self.structured_calls.push(StructuredCall {
            name: name.into(),
            arguments,
        });
        self
    }

    /// First structured call with the given name.
    pub fn call(&self, name: &str) -> Option<&StructuredCall> {
        self.structured_calls.iter().find(|c| c.name == name)
    }
}

/// Race one invocation against `limit`.
///
/// The losing future is dropped; nothing is propagated into the in-flight call.
pub async fn invoke_with_timeout(
    channel: &dyn ModelChannel,
    prompt: &str,
    stage: Persona,
    limit: Duration,
) -> std::result::Result<ModelResponse, RefineError> {
    match tokio::time::timeout(limit, channel.invoke(prompt)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(RefineError::Invocation {
            stage,
            message: format!("{e:#}"),
        }),
        Err(_) => Err(RefineError::InvocationTimeout {
            stage,
            elapsed_secs: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    #[async_trait]
    impl ModelChannel for Silent {
        async fn invoke(&self, _prompt: &str) -> Result<ModelResponse> {
            std::future::pending().await
        }

        fn model_id(&self) -> &str {
            "silent"
        }
    }

    struct Broken;

    #[async_trait]
    impl ModelChannel for Broken {
        async fn invoke(&self, _prompt: &str) -> Result<ModelResponse> {
            anyhow::bail!("connection reset")
        }

        fn model_id(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_stage_and_elapsed() {
        let err = invoke_with_timeout(&Silent, "hi", Persona::Analyst, Duration::from_secs(300))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "analyst request timed out after 300s");
    }

    #[tokio::test]
    async fn test_channel_failure_becomes_invocation_error() {
        let err = invoke_with_timeout(&Broken, "hi", Persona::Refiner, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RefineError::Invocation { stage: Persona::Refiner, .. }));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_call_lookup_by_name() {
        let response = ModelResponse::text("").with_call("ask_clarifying_questions", serde_json::json!({}));
        assert!(response.call("ask_clarifying_questions").is_some());
        assert!(response.call("other").is_none());
    }
}
