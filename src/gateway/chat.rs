//! Forwarding of free-text questions to the conversational backend.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub const NO_ANSWER: &str = "No response received";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat backend timed out")]
    Timeout,
    #[error("chat backend answered with status {0}")]
    Status(u16),
    #[error("chat backend request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout
        } else if let Some(status) = err.status() {
            ChatError::Status(status.as_u16())
        } else {
            ChatError::Http(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatForward<'a> {
    question: &'a str,
    session_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    pub session_id: String,
    #[serde(default)]
    pub user_context: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub answer: String,
    pub session_id: String,
}

/// Single fire-and-wait call per question, with its own timeout.
#[derive(Debug, Clone)]
pub struct ChatForwarder {
    client: Client,
    webhook: Url,
}

impl ChatForwarder {
    pub fn new(webhook: Url, timeout: Duration) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, webhook })
    }

    pub async fn ask(&self, question: &str, session_id: &str) -> Result<String, ChatError> {
        let reply: Value = self
            .client
            .post(self.webhook.as_str())
            .json(&ChatForward {
                question,
                session_id,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(answer_from(&reply))
    }
}

fn answer_from(reply: &Value) -> String {
    ["answer", "output"]
        .iter()
        .filter_map(|key| reply.get(*key).and_then(Value::as_str))
        .find(|text| !text.is_empty())
        .unwrap_or(NO_ANSWER)
        .to_string()
}
