use anyhow::{Context, Result, anyhow};
use codetidy_llm::{ApiStatusError, ChatPrompt, LlmClient, SamplingParams};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Clone)]
pub struct GroqClient {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl GroqClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("GROQ_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key =
            std::env::var("GROQ_API_KEY").context("GROQ_API_KEY is required for the Groq API")?;
        Ok(Self::new(base_url, api_key))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    top_p: f32,
    max_completion_tokens: u32,
    stream: bool,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl LlmClient for GroqClient {
    fn complete(&self, prompt: &ChatPrompt, model: &str, params: &SamplingParams) -> Result<String> {
        let body = ChatRequest {
            model: model.to_string(),
            temperature: params.temperature,
            top_p: params.top_p,
            max_completion_tokens: params.max_tokens,
            stream: false,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
        };

        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("failed calling Groq endpoint")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(ApiStatusError { status, body }.into());
        }

        let parsed: ChatResponse = response
            .json()
            .context("failed to decode Groq response")?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("Groq response had no choices"))?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::GroqClient;
    use codetidy_llm::{ChatPrompt, LlmClient, SamplingParams};

    #[test]
    #[ignore]
    fn live_groq_completion_if_enabled() {
        if std::env::var("CODETIDY_RUN_LIVE_TESTS").ok().as_deref() != Some("1") {
            return;
        }

        let client = match GroqClient::from_env() {
            Ok(c) => c,
            Err(_) => return,
        };

        let model = std::env::var("CODETIDY_MODEL")
            .unwrap_or_else(|_| "meta-llama/llama-4-scout-17b-16e-instruct".to_string());
        let prompt = ChatPrompt {
            system: "Return only code.".to_string(),
            user: "Print the number one in Python.".to_string(),
        };

        let out = client
            .complete(&prompt, &model, &SamplingParams::default())
            .expect("groq live request should succeed");
        assert!(!out.trim().is_empty());
    }
}
