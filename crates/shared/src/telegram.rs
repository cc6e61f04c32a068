use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{ConfigError, DeliveryError};
use crate::models::PublishReceipt;
use crate::pipeline::Publisher;

const PARSE_MODE: &str = "HTML";

#[derive(Serialize)]
struct SendPhotoRequest<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'a str,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

pub struct TelegramPublisher {
    client: Client,
    /// `{api}/bot{token}`, never logged
    base_url: String,
    chat_id: String,
}

impl TelegramPublisher {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        let base_url = format!(
            "{}/bot{}",
            config.telegram_api_url.as_str().trim_end_matches('/'),
            config.telegram_bot_token
        );

        Ok(Self {
            client,
            base_url,
            chat_id: config.telegram_chat_id.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn send_photo(&self, caption: &str, photo: &str) -> Result<i64, DeliveryError> {
        let request = SendPhotoRequest {
            chat_id: &self.chat_id,
            photo,
            caption,
            parse_mode: PARSE_MODE,
        };

        info!("📤 Sending photo to Telegram...");
        self.call(&self.method_url("sendPhoto"), &request).await
    }

    async fn send_message(&self, text: &str) -> Result<i64, DeliveryError> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: PARSE_MODE,
            disable_web_page_preview: true,
        };

        info!("📤 Sending text message to Telegram...");
        self.call(&self.method_url("sendMessage"), &request).await
    }

    async fn call<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<i64, DeliveryError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            // reqwest errors carry the URL, which embeds the token
            .map_err(|e| DeliveryError::Request(e.without_url()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Request(e.without_url()))?;

        parse_send_response(status, &body)
    }

    /// Confirm the token works; used by `--preflight`.
    pub async fn get_me(&self) -> Result<BotUser, DeliveryError> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| DeliveryError::Request(e.without_url()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Request(e.without_url()))?;

        let user: BotUser = parse_envelope(status, &body)?;
        info!(
            "✅ Bot connected: {} (@{})",
            user.first_name,
            user.username.as_deref().unwrap_or("unknown")
        );
        Ok(user)
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    /// Photo with caption when there is an image, text otherwise. A photo
    /// Telegram refuses to fetch is dropped and the caption sent as text.
    async fn publish(
        &self,
        message: &str,
        image_url: Option<&str>,
    ) -> Result<PublishReceipt, DeliveryError> {
        let Some(photo) = image_url else {
            let message_id = self.send_message(message).await?;
            return Ok(PublishReceipt {
                message_id,
                with_image: false,
            });
        };

        match self.send_photo(message, photo).await {
            Ok(message_id) => Ok(PublishReceipt {
                message_id,
                with_image: true,
            }),
            Err(e) if e.is_photo_rejection() => {
                warn!(error = %e, "⚠️ Telegram refused the image, sending text only");
                let message_id = self.send_message(message).await?;
                Ok(PublishReceipt {
                    message_id,
                    with_image: false,
                })
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_send_response(status: u16, body: &str) -> Result<i64, DeliveryError> {
    let sent: SentMessage = parse_envelope(status, body)?;
    Ok(sent.message_id)
}

/// Interpret a Bot API reply. Anything but a 2xx `ok: true` with a result
/// is an error carrying Telegram's own description.
fn parse_envelope<T>(status: u16, body: &str) -> Result<T, DeliveryError>
where
    T: for<'de> Deserialize<'de>,
{
    let envelope = serde_json::from_str::<ApiResponse<T>>(body);

    match envelope {
        Ok(ApiResponse {
            ok: true,
            result: Some(result),
            ..
        }) if (200..300).contains(&status) => Ok(result),
        Ok(ApiResponse { description, .. }) if !(200..300).contains(&status) => {
            Err(DeliveryError::Rejected {
                status,
                description: description.unwrap_or_else(|| "no description".to_string()),
            })
        }
        Ok(ApiResponse { ok: false, description, .. }) => Err(DeliveryError::Rejected {
            status,
            description: description.unwrap_or_else(|| "no description".to_string()),
        }),
        Ok(_) => Err(DeliveryError::Malformed(
            "response has no result".to_string(),
        )),
        Err(_) if !(200..300).contains(&status) => Err(DeliveryError::Rejected {
            status,
            description: body.chars().take(200).collect(),
        }),
        Err(e) => Err(DeliveryError::Malformed(e.to_string())),
    }
}
