//! Model backends behind one capability: turn a prompt into raw text.
//!
//! The generator never sees transport details; swapping the hosted API for
//! a local checkpoint is a configuration change, not a code change.

use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::json;

use crate::error::GenerateError;

/// Environment variable holding the hosted-API key. Read once at backend
/// construction, never logged, never echoed into prompts.
pub const GEMINI_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Hosted model identifier.
pub const GEMINI_MODEL: &str = "gemini-1.5-flash-latest";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Where generated SQL comes from: the hosted Gemini API, or one of a
/// fixed set of local checkpoints served over the Ollama HTTP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    Gemini,
    Sqlcoder,
    Codellama,
    Mistral,
}

impl ModelChoice {
    pub fn is_remote(self) -> bool {
        self.local_tag().is_none()
    }

    /// Ollama model tag, `None` for the hosted backend.
    pub fn local_tag(self) -> Option<&'static str> {
        match self {
            ModelChoice::Gemini => None,
            ModelChoice::Sqlcoder => Some("sqlcoder"),
            ModelChoice::Codellama => Some("codellama"),
            ModelChoice::Mistral => Some("mistral"),
        }
    }
}

/// One capability: complete a prompt into raw model text.
///
/// Implementations apply their own transport timeout; the generator bounds
/// the whole call again on top.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Build the backend for a selector.
pub fn backend_for(
    choice: ModelChoice,
    ollama_url: &str,
    timeout: Duration,
) -> Result<Box<dyn ModelBackend>, GenerateError> {
    match choice.local_tag() {
        None => Ok(Box::new(GeminiBackend::from_env(timeout)?)),
        Some(tag) => Ok(Box::new(OllamaBackend::new(tag, ollama_url, timeout)?)),
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, GenerateError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GenerateError::Backend(e.to_string()))
}

fn transport(e: reqwest::Error, timeout: Duration) -> GenerateError {
    if e.is_timeout() {
        GenerateError::Timeout(timeout)
    } else {
        GenerateError::Backend(e.to_string())
    }
}

/// Keep HTTP error bodies readable without flooding the terminal.
fn truncate(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((i, _)) => &body[..i],
        None => body,
    }
}

/// Hosted Gemini backend, the same REST surface the `generativeai`
/// SDKs wrap.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiBackend {
    /// Build from the environment. Missing key is a backend failure the
    /// caller can render ("set GOOGLE_API_KEY"), not a panic.
    pub fn from_env(timeout: Duration) -> Result<Self, GenerateError> {
        let api_key = std::env::var(GEMINI_API_KEY_ENV).map_err(|_| {
            GenerateError::Backend(format!("{GEMINI_API_KEY_ENV} is not set"))
        })?;
        Self::new(api_key, GEMINI_MODEL, GEMINI_BASE_URL, timeout)
    }

    pub fn new(
        api_key: String,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, GenerateError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.0 }
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport(e, self.timeout))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerateError::Backend(format!(
                "HTTP {status}: {}",
                truncate(&body, 300)
            )));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GenerateError::Backend(format!("bad API response: {e}")))?;

        let text = data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        Ok(text.to_string())
    }
}

/// Local checkpoint inference over the Ollama HTTP endpoint. Greedy
/// decoding (temperature 0), so output is deterministic for fixed weights.
pub struct OllamaBackend {
    client: reqwest::Client,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(model: &str, base_url: &str, timeout: Duration) -> Result<Self, GenerateError> {
        Ok(Self {
            client: build_client(timeout)?,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        let url = format!("{}/api/generate", self.base_url);
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": 0.0 }
        });

        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport(e, self.timeout))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerateError::Backend(format!(
                "HTTP {status}: {}",
                truncate(&body, 300)
            )));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GenerateError::Backend(format!("bad Ollama response: {e}")))?;

        Ok(data["response"].as_str().unwrap_or_default().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_tags() {
        assert!(ModelChoice::Gemini.is_remote());
        assert_eq!(ModelChoice::Sqlcoder.local_tag(), Some("sqlcoder"));
        assert_eq!(ModelChoice::Codellama.local_tag(), Some("codellama"));
        assert_eq!(ModelChoice::Mistral.local_tag(), Some("mistral"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo");
        assert_eq!(truncate("short", 300), "short");
    }
}
