// Replay channel: plays back recorded model responses for offline runs

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use tokio::sync::Mutex;

use super::{ModelChannel, ModelResponse};

/// Recorded entries are either a bare string or a full response object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordedResponse {
    Text(String),
    Full(ModelResponse),
}

impl From<RecordedResponse> for ModelResponse {
    fn from(recorded: RecordedResponse) -> Self {
        match recorded {
            RecordedResponse::Text(text) => ModelResponse::text(text),
            RecordedResponse::Full(response) => response,
        }
    }
}

/// Returns queued responses in order and fails once the queue is empty.
pub struct ReplayModel {
    model_id: String,
    queue: Mutex<VecDeque<ModelResponse>>,
}

impl ReplayModel {
    pub fn new(model_id: impl Into<String>, responses: Vec<ModelResponse>) -> Self {
        Self {
            model_id: model_id.into(),
            queue: Mutex::new(responses.into()),
        }
    }

    /// Parse a JSON array of recorded responses.
    pub fn from_json(model_id: impl Into<String>, json: &str) -> Result<Self> {
        let recorded: Vec<RecordedResponse> =
            serde_json::from_str(json).context("Replay file must be a JSON array")?;
        Ok(Self::new(
            model_id,
            recorded.into_iter().map(ModelResponse::from).collect(),
        ))
    }

    pub async fn load(model_id: impl Into<String>, path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        Self::from_json(model_id, &json)
    }

    pub async fn remaining(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[async_trait]
impl ModelChannel for ReplayModel {
    async fn invoke(&self, prompt: &str) -> Result<ModelResponse> {
        let next = self.queue.lock().await.pop_front();
        match next {
            Some(response) => {
                tracing::debug!(
                    prompt_chars = prompt.len(),
                    response_chars = response.text.len(),
                    "Replaying recorded response"
                );
                Ok(response)
            }
            None => bail!("Replay exhausted: no recorded response left"),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_strings_and_objects_in_order() {
        let json = r#"[
            "first",
            {"text": "second", "structuredCalls": [{"name": "ask_clarifying_questions", "arguments": {"questions": []}}]}
        ]"#;
        let model = ReplayModel::from_json("gpt-4o", json).unwrap();
        assert_eq!(model.remaining().await, 2);

        let first = model.invoke("p").await.unwrap();
        assert_eq!(first.text, "first");
        let second = model.invoke("p").await.unwrap();
        assert_eq!(second.structured_calls.len(), 1);

        let err = model.invoke("p").await.unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }

    #[test]
    fn test_rejects_non_array() {
        assert!(ReplayModel::from_json("m", r#"{"text": "x"}"#).is_err());
    }
}
