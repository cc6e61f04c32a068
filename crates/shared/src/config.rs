use std::env;
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::errors::ConfigError;

pub const DEFAULT_PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";
pub const DEFAULT_PERPLEXITY_MODEL: &str = "sonar-pro";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_IMAGE_FALLBACK_URL: &str =
    "https://images.unsplash.com/photo-1640340434855-6084b1f4901c?w=1200&h=800&fit=crop";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SUMMARY_CHAR_BUDGET: usize = 800;

/// Everything one run needs, built once and never mutated.
#[derive(Clone)]
pub struct Config {
    pub perplexity_api_key: String,
    pub perplexity_model: String,
    pub perplexity_api_url: Url,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub telegram_api_url: Url,
    pub unsplash_access_key: Option<String>,
    /// `None` means posts go out text-only when every provider fails.
    pub image_fallback_url: Option<String>,
    pub http_timeout: Duration,
    pub summary_char_budget: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("perplexity_api_key", &"<redacted>")
            .field("perplexity_model", &self.perplexity_model)
            .field("perplexity_api_url", &self.perplexity_api_url.as_str())
            .field("telegram_bot_token", &"<redacted>")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("telegram_api_url", &self.telegram_api_url.as_str())
            .field(
                "unsplash_access_key",
                &self.unsplash_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("image_fallback_url", &self.image_fallback_url)
            .field("http_timeout", &self.http_timeout)
            .field("summary_char_budget", &self.summary_char_budget)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from any variable source. Required keys are checked
    /// first, so a missing credential is reported before anything else.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string());

        let perplexity_api_key = required(&get, "PERPLEXITY_API_KEY")?;
        let telegram_bot_token = required(&get, "TELEGRAM_BOT_TOKEN")?;
        let telegram_chat_id = required(&get, "TELEGRAM_CHAT_ID")?;

        validate_bot_token(&telegram_bot_token)?;
        validate_chat_id(&telegram_chat_id)?;

        let perplexity_model = get("PERPLEXITY_MODEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_PERPLEXITY_MODEL.to_string());

        let perplexity_api_url = parse_url(
            "PERPLEXITY_API_URL",
            get("PERPLEXITY_API_URL").filter(|v| !v.is_empty()),
            DEFAULT_PERPLEXITY_API_URL,
        )?;
        let telegram_api_url = parse_url(
            "TELEGRAM_API_URL",
            get("TELEGRAM_API_URL").filter(|v| !v.is_empty()),
            DEFAULT_TELEGRAM_API_URL,
        )?;

        let unsplash_access_key = get("UNSPLASH_ACCESS_KEY").filter(|v| !v.is_empty());

        // Set but empty disables the fallback image.
        let image_fallback_url = match get("IMAGE_FALLBACK_URL") {
            None => Some(DEFAULT_IMAGE_FALLBACK_URL.to_string()),
            Some(v) if v.is_empty() => None,
            Some(v) => Some(parse_url("IMAGE_FALLBACK_URL", Some(v), "")?.to_string()),
        };

        let http_timeout = Duration::from_secs(parse_positive(
            "HTTP_TIMEOUT_SECS",
            get("HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);
        let summary_char_budget = parse_positive(
            "SUMMARY_CHAR_BUDGET",
            get("SUMMARY_CHAR_BUDGET"),
            DEFAULT_SUMMARY_CHAR_BUDGET as u64,
        )? as usize;

        Ok(Self {
            perplexity_api_key,
            perplexity_model,
            perplexity_api_url,
            telegram_bot_token,
            telegram_chat_id,
            telegram_api_url,
            unsplash_access_key,
            image_fallback_url,
            http_timeout,
            summary_char_budget,
        })
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/crypto-news-bot/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("crypto-news-bot").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }

        // CI sets everything in the environment directly
    }
}

fn required<G>(get: &G, name: &'static str) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn validate_bot_token(token: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        name: "TELEGRAM_BOT_TOKEN",
        reason: reason.to_string(),
    };

    let (id, secret) = token
        .split_once(':')
        .ok_or_else(|| invalid("expected <bot id>:<secret>"))?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("bot id must be numeric"));
    }
    if secret.is_empty() || secret.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(invalid("secret part is empty or contains invalid characters"));
    }
    Ok(())
}

fn validate_chat_id(chat_id: &str) -> Result<(), ConfigError> {
    if let Some(username) = chat_id.strip_prefix('@') {
        if username.len() >= 5 && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Ok(());
        }
    } else if chat_id.parse::<i64>().is_ok() {
        return Ok(());
    }

    Err(ConfigError::Invalid {
        name: "TELEGRAM_CHAT_ID",
        reason: format!("'{chat_id}' is neither a numeric chat id nor an @channel username"),
    })
}

fn parse_url(name: &'static str, value: Option<String>, default: &str) -> Result<Url, ConfigError> {
    let raw = value.unwrap_or_else(|| default.to_string());
    let url = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn parse_positive(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => match v.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::Invalid {
                name,
                reason: format!("expected a positive integer, got '{v}'"),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RunError;
    use std::collections::HashMap;
    use wiremock::matchers::any;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base() -> HashMap<String, String> {
        vars(&[
            ("PERPLEXITY_API_KEY", "pplx-test"),
            ("TELEGRAM_BOT_TOKEN", "123456:ABC-def_ghi"),
            ("TELEGRAM_CHAT_ID", "-1001234567890"),
        ])
    }

    fn load(map: &HashMap<String, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base()).unwrap();
        assert_eq!(config.perplexity_model, "sonar-pro");
        assert_eq!(config.perplexity_api_url.as_str(), DEFAULT_PERPLEXITY_API_URL);
        assert_eq!(config.telegram_api_url.as_str(), "https://api.telegram.org/");
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.summary_char_budget, 800);
        assert_eq!(
            config.image_fallback_url.as_deref(),
            Some(DEFAULT_IMAGE_FALLBACK_URL)
        );
        assert!(config.unsplash_access_key.is_none());
    }

    #[test]
    fn test_missing_perplexity_key_reported_first() {
        // Every required key is missing; the summarization key wins.
        let err = load(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PERPLEXITY_API_KEY")));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_contacting_any_api() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut map = base();
        map.remove("PERPLEXITY_API_KEY");
        map.insert("PERPLEXITY_API_URL".to_string(), server.uri());
        map.insert("TELEGRAM_API_URL".to_string(), server.uri());

        let err = load(&map).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PERPLEXITY_API_KEY")));
        assert_eq!(RunError::from(err).exit_code(), 2);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let mut map = base();
        map.insert("PERPLEXITY_API_KEY".to_string(), "   ".to_string());
        let err = load(&map).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PERPLEXITY_API_KEY")));
    }

    #[test]
    fn test_missing_chat_id() {
        let mut map = base();
        map.remove("TELEGRAM_CHAT_ID");
        let err = load(&map).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TELEGRAM_CHAT_ID")));
    }

    #[test]
    fn test_channel_username_accepted() {
        let mut map = base();
        map.insert("TELEGRAM_CHAT_ID".to_string(), "@crypto_daily".to_string());
        assert_eq!(load(&map).unwrap().telegram_chat_id, "@crypto_daily");
    }

    #[test]
    fn test_invalid_chat_id_rejected() {
        let mut map = base();
        map.insert("TELEGRAM_CHAT_ID".to_string(), "my channel".to_string());
        let err = load(&map).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "TELEGRAM_CHAT_ID",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_bot_token_rejected() {
        for token in ["no-colon", "abc:secret", "123:", "123:has space"] {
            let mut map = base();
            map.insert("TELEGRAM_BOT_TOKEN".to_string(), token.to_string());
            let err = load(&map).unwrap_err();
            assert!(
                matches!(
                    err,
                    ConfigError::Invalid {
                        name: "TELEGRAM_BOT_TOKEN",
                        ..
                    }
                ),
                "token {token:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_fallback_url_disables_image() {
        let mut map = base();
        map.insert("IMAGE_FALLBACK_URL".to_string(), String::new());
        assert!(load(&map).unwrap().image_fallback_url.is_none());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut map = base();
        map.insert("HTTP_TIMEOUT_SECS".to_string(), "0".to_string());
        let err = load(&map).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "HTTP_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let mut map = base();
        map.insert("TELEGRAM_API_URL".to_string(), "ftp://example.com".to_string());
        assert!(load(&map).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&base()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("pplx-test"));
        assert!(!debug.contains("ABC-def_ghi"));
        assert!(debug.contains("<redacted>"));
    }
}
