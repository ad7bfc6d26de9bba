//! Model-backed extractor
//!
//! Sends the post body to an OpenAI-compatible chat-completions endpoint
//! with a strict JSON schema prompt and parses the structured reply. Any
//! failure here (timeout, bad status, malformed JSON) sends the caller to
//! the heuristic fallback.

use super::{Extract, ExtractionResult};
use async_trait::async_trait;
use eva_common::config::LlmSettings;
use eva_common::db::models::{Intent, Sentiment};
use eva_common::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

const SYSTEM_PROMPT: &str = r#"You are a conversational data analyzer for consumer brand signals.

Extract structured information from ONE short post.

Return ONLY valid JSON with ALL keys present:

{
  "brand": [...],
  "sentiment": "strong_positive|positive|neutral|negative|strong_negative",
  "intent": "buy|own|recommendation|complaint|none",
  "tickers": [...],
  "tags": [...]
}

Rules:
- brand: include ALL brands explicitly mentioned (e.g. "Nike" and "Hoka" if both appear).
- sentiment: do NOT use "neutral" if the text clearly expresses preference, excitement, hate, or switching.
- intent: choose "own" if the user describes their own usage or switching; "recommendation" only if they advise others.
- tags: 2-5 behavior tags when there is signal; include "brand-switch" for switching text, "running" for running context, "comfort" when comfort is mentioned.
Output JSON only. No markdown. No extra fields."#;

#[derive(Debug, serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// The JSON shape the model is asked to return. Every field tolerates
/// absence; an unparseable enum value degrades to the neutral default.
#[derive(Debug, Default, Deserialize)]
struct LlmPayload {
    #[serde(default)]
    brand: Vec<String>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub struct LlmExtractor {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    version: String,
}

impl LlmExtractor {
    /// Returns `None` when no API key is configured; extraction is then
    /// heuristic-only.
    pub fn from_settings(settings: &LlmSettings) -> Result<Option<Self>> {
        let Some(api_key) = settings.api_key.clone() else {
            return Ok(None);
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Some(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            version: format!("llm:{}:v1", settings.model),
        }))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn parse_content(&self, content: &str) -> Result<ExtractionResult> {
        let trimmed = strip_code_fences(content.trim());
        if trimmed.is_empty() {
            return Err(Error::Provider {
                provider: "llm",
                status: 200,
                message: "empty completion".to_string(),
            });
        }

        let payload: LlmPayload = serde_json::from_str(trimmed).map_err(|e| Error::Provider {
            provider: "llm",
            status: 200,
            message: format!("unparseable completion: {e}"),
        })?;

        Ok(ExtractionResult {
            brands: payload.brand,
            tags: payload.tags,
            sentiment: payload
                .sentiment
                .as_deref()
                .and_then(Sentiment::parse)
                .unwrap_or(Sentiment::Neutral),
            intent: payload
                .intent
                .as_deref()
                .and_then(Intent::parse)
                .unwrap_or(Intent::None),
            tickers: payload.tickers,
            processor_version: self.version.clone(),
        })
    }
}

#[async_trait]
impl Extract for LlmExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractionResult> {
        let user_prompt = format!("Text:\n{text}\n\nReturn JSON only.");
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimited { provider: "llm" });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "llm",
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(Error::Provider {
                provider: "llm",
                status: 200,
                message: "no completion in response".to_string(),
            })?;

        self.parse_content(&content)
    }
}

/// Models sometimes wrap JSON in markdown fences despite instructions.
fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> LlmExtractor {
        LlmExtractor {
            http_client: reqwest::Client::new(),
            base_url: "http://localhost".to_string(),
            api_key: "test".to_string(),
            model: "test-model".to_string(),
            version: "llm:test-model:v1".to_string(),
        }
    }

    #[test]
    fn parses_plain_json_completion() {
        let r = extractor()
            .parse_content(
                r#"{"brand": ["Nike", "Hoka"], "sentiment": "positive", "intent": "own",
                    "tickers": [], "tags": ["brand-switch", "running"]}"#,
            )
            .unwrap();

        assert_eq!(r.brands, vec!["Nike", "Hoka"]);
        assert_eq!(r.sentiment, Sentiment::Positive);
        assert_eq!(r.intent, Intent::Own);
        assert_eq!(r.processor_version, "llm:test-model:v1");
    }

    #[test]
    fn parses_fenced_completion() {
        let r = extractor()
            .parse_content("```json\n{\"brand\": [\"Yeti\"], \"tags\": []}\n```")
            .unwrap();
        assert_eq!(r.brands, vec!["Yeti"]);
        assert_eq!(r.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn unknown_enum_values_degrade_to_defaults() {
        let r = extractor()
            .parse_content(r#"{"brand": [], "sentiment": "ecstatic", "intent": "lurking", "tags": []}"#)
            .unwrap();
        assert_eq!(r.sentiment, Sentiment::Neutral);
        assert_eq!(r.intent, Intent::None);
    }

    #[test]
    fn garbage_completions_are_errors() {
        assert!(extractor().parse_content("Sorry, I can't help.").is_err());
        assert!(extractor().parse_content("").is_err());
    }
}
