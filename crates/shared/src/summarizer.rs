use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::briefing::{clean_summary, truncate_on_word, BriefingFormatter, HASHTAGS};
use crate::config::Config;
use crate::errors::{ConfigError, ContentGenerationError};
use crate::pipeline::SummarySource;

const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.3;
/// How much of an error body ends up in diagnostics.
const ERROR_BODY_CHARS: usize = 300;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct PerplexitySummarizer {
    client: Client,
    api_key: String,
    model: String,
    endpoint: Url,
    char_budget: usize,
}

impl PerplexitySummarizer {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            api_key: config.perplexity_api_key.clone(),
            model: config.perplexity_model.clone(),
            endpoint: config.perplexity_api_url.clone(),
            char_budget: config.summary_char_budget,
        })
    }

    /// Tiny request used by `--preflight` to confirm the key works.
    pub async fn check_connection(&self) -> Result<(), ContentGenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: "Hi".to_string(),
            }],
            max_tokens: 10,
            temperature: None,
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ContentGenerationError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentGenerationError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        info!("✅ Perplexity API connection successful");
        Ok(())
    }
}

#[async_trait]
impl SummarySource for PerplexitySummarizer {
    /// Ask for the day's market summary. One attempt; any failure is final.
    async fn fetch_summary(&self, date: NaiveDate) -> Result<String, ContentGenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: build_prompt(date, self.char_budget),
            }],
            max_tokens: MAX_TOKENS,
            temperature: Some(TEMPERATURE),
            stream: false,
        };

        info!(model = %self.model, "📡 Requesting crypto news from Perplexity...");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(ContentGenerationError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(ContentGenerationError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(ContentGenerationError::Request)?;

        let summary = parse_summary(&body, self.char_budget)?;
        info!(chars = summary.chars().count(), "✅ Summary received");
        Ok(summary)
    }
}

fn build_prompt(date: NaiveDate, char_budget: usize) -> String {
    format!(
        "Write a crypto market summary for {}. Keep it under {} characters including spaces. \
        Focus on Bitcoin, Ethereum, major altcoins, and market trends. \
        Write short, complete sentences, one fact per sentence. End with: {}",
        BriefingFormatter::format_date(date),
        char_budget,
        HASHTAGS
    )
}

/// Pull the generated text out of a chat completion body, cleaned and held
/// to the character budget.
fn parse_summary(body: &str, char_budget: usize) -> Result<String, ContentGenerationError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ContentGenerationError::Malformed(e.to_string()))?;

    let raw = response
        .choices
        .into_iter()
        .filter_map(|c| c.message.and_then(|m| m.content))
        .find(|content| !content.trim().is_empty());

    let raw = match raw {
        Some(raw) => raw,
        None => {
            warn!("⚠️ No content in Perplexity response");
            return Err(ContentGenerationError::EmptyContent);
        }
    };

    let cleaned = clean_summary(&raw);
    if cleaned.is_empty() {
        return Err(ContentGenerationError::EmptyContent);
    }

    Ok(truncate_on_word(&cleaned, char_budget))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> String {
        serde_json::json!({
            "id": "abc",
            "model": "sonar-pro",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": content}}
            ]
        })
        .to_string()
    }

    #[test]
    fn test_prompt_includes_date_and_budget() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 8).unwrap();
        let prompt = build_prompt(date, 800);
        assert!(prompt.contains("November 08, 2025"));
        assert!(prompt.contains("under 800 characters"));
        assert!(prompt.ends_with("#CryptoNews #MarketOverview"));
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            model: "sonar-pro",
            messages: vec![Message {
                role: "user".to_string(),
                content: "prompt".to_string(),
            }],
            max_tokens: MAX_TOKENS,
            temperature: None,
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "sonar-pro");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 300);
        assert_eq!(value["stream"], false);
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_parse_summary_cleans_content() {
        let body = completion("Bitcoin holds $60K [1].  Ether steady[2]. #CryptoNews #MarketOverview");
        let summary = parse_summary(&body, 800).unwrap();
        assert_eq!(summary, "Bitcoin holds $60K. Ether steady.");
    }

    #[test]
    fn test_parse_summary_respects_budget() {
        let long = "Bitcoin rallies strongly again. ".repeat(60);
        let summary = parse_summary(&completion(&long), 800).unwrap();
        assert!(summary.chars().count() <= 800);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn test_parse_summary_skips_empty_choice() {
        let body = serde_json::json!({
            "choices": [
                {"message": {"content": "   "}},
                {"message": {"content": "Second choice wins."}}
            ]
        })
        .to_string();
        assert_eq!(parse_summary(&body, 800).unwrap(), "Second choice wins.");
    }

    #[test]
    fn test_parse_summary_empty_content_is_error() {
        let err = parse_summary(&completion(""), 800).unwrap_err();
        assert!(matches!(err, ContentGenerationError::EmptyContent));
    }

    #[test]
    fn test_parse_summary_only_hashtags_is_error() {
        let err = parse_summary(&completion("#CryptoNews #MarketOverview"), 800).unwrap_err();
        assert!(matches!(err, ContentGenerationError::EmptyContent));
    }

    #[test]
    fn test_parse_summary_no_choices_is_error() {
        let err = parse_summary(r#"{"choices": []}"#, 800).unwrap_err();
        assert!(matches!(err, ContentGenerationError::EmptyContent));
    }

    #[test]
    fn test_parse_summary_invalid_json() {
        let err = parse_summary("<html>502 Bad Gateway</html>", 800).unwrap_err();
        assert!(matches!(err, ContentGenerationError::Malformed(_)));
    }

    // ==================== HTTP Tests ====================

    fn summarizer(server: &MockServer) -> PerplexitySummarizer {
        let endpoint = format!("{}/chat/completions", server.uri());
        let config = Config::from_lookup(|key| match key {
            "PERPLEXITY_API_KEY" => Some("pplx-test".to_string()),
            "TELEGRAM_BOT_TOKEN" => Some("123456:ABC-def_ghi".to_string()),
            "TELEGRAM_CHAT_ID" => Some("@crypto_daily".to_string()),
            "PERPLEXITY_API_URL" => Some(endpoint.clone()),
            _ => None,
        })
        .unwrap();
        PerplexitySummarizer::new(&config).unwrap()
    }

    fn nov_8() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 8).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_summary_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("pplx-test"))
            .and(body_partial_json(serde_json::json!({ "model": "sonar-pro", "stream": false })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(completion("Bitcoin steady [1]. Ether up.")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let summary = summarizer(&server).fetch_summary(nov_8()).await.unwrap();
        assert_eq!(summary, "Bitcoin steady. Ether up.");
    }

    #[tokio::test]
    async fn test_rate_limited_is_upstream_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_string(r#"{"error":{"message":"rate limit exceeded"}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = summarizer(&server).fetch_summary(nov_8()).await.unwrap_err();
        match err {
            ContentGenerationError::Upstream { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("rate limit exceeded"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_body_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(1000)))
            .expect(1)
            .mount(&server)
            .await;

        let err = summarizer(&server).fetch_summary(nov_8()).await.unwrap_err();
        match err {
            ContentGenerationError::Upstream { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.chars().count(), ERROR_BODY_CHARS);
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_completion_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(completion("")))
            .mount(&server)
            .await;

        let err = summarizer(&server).fetch_summary(nov_8()).await.unwrap_err();
        assert!(matches!(err, ContentGenerationError::EmptyContent));
    }
}
