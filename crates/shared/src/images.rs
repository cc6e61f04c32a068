use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::errors::{ConfigError, ImageResolutionError};
use crate::pipeline::ImageSource;

const UNSPLASH_API_URL: &str = "https://api.unsplash.com";
const LOREMFLICKR_URL: &str = "https://loremflickr.com";
const IMAGE_WIDTH: u32 = 1200;
const IMAGE_HEIGHT: u32 = 800;

/// What the picture should be about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTheme {
    pub keywords: Vec<String>,
    /// Stable within a day, different across days.
    pub seed: u32,
}

impl ImageTheme {
    pub fn crypto(date: NaiveDate) -> Self {
        Self {
            keywords: ["bitcoin", "cryptocurrency", "blockchain"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            seed: date.num_days_from_ce().unsigned_abs(),
        }
    }
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, theme: &ImageTheme) -> Result<String, ImageResolutionError>;
}

#[derive(Deserialize)]
struct UnsplashPhoto {
    urls: UnsplashUrls,
}

#[derive(Deserialize)]
struct UnsplashUrls {
    regular: String,
}

/// Random themed photo from the Unsplash API. Needs an access key.
pub struct UnsplashProvider {
    client: Client,
    access_key: String,
    base_url: String,
}

impl UnsplashProvider {
    pub fn new(client: Client, access_key: String) -> Self {
        Self {
            client,
            access_key,
            base_url: UNSPLASH_API_URL.to_string(),
        }
    }

    /// Point at another API host, e.g. a local stand-in.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ImageProvider for UnsplashProvider {
    fn name(&self) -> &str {
        "unsplash"
    }

    async fn resolve(&self, theme: &ImageTheme) -> Result<String, ImageResolutionError> {
        let query = theme.keywords.join(" ");
        let url = Url::parse_with_params(
            &format!("{}/photos/random", self.base_url.trim_end_matches('/')),
            &[
                ("query", query.as_str()),
                ("orientation", "landscape"),
                ("content_filter", "high"),
            ],
        )
        .map_err(|e| ImageResolutionError::Malformed(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .header("Accept-Version", "v1")
            .send()
            .await
            .map_err(ImageResolutionError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageResolutionError::Status(status.as_u16()));
        }

        let photo = response
            .json::<UnsplashPhoto>()
            .await
            .map_err(|e| ImageResolutionError::Malformed(e.to_string()))?;

        if photo.urls.regular.trim().is_empty() {
            return Err(ImageResolutionError::Malformed(
                "empty image URL".to_string(),
            ));
        }

        Ok(photo.urls.regular)
    }
}

/// Keyword-matched photo from LoremFlickr, pinned to the day's seed so
/// every day gets a different picture.
pub struct LoremFlickrProvider {
    client: Client,
    base_url: String,
}

impl LoremFlickrProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: LOREMFLICKR_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_url(&self, theme: &ImageTheme) -> String {
        format!(
            "{}/{}/{}/{}?lock={}",
            self.base_url.trim_end_matches('/'),
            IMAGE_WIDTH,
            IMAGE_HEIGHT,
            theme.keywords.join(","),
            theme.seed
        )
    }
}

#[async_trait]
impl ImageProvider for LoremFlickrProvider {
    fn name(&self) -> &str {
        "loremflickr"
    }

    async fn resolve(&self, theme: &ImageTheme) -> Result<String, ImageResolutionError> {
        let response = self
            .client
            .get(self.request_url(theme))
            .send()
            .await
            .map_err(ImageResolutionError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageResolutionError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(ImageResolutionError::NotAnImage(content_type));
        }

        // Redirects are followed, so this is the stable image location.
        Ok(response.url().to_string())
    }
}

/// Tries each provider in order and falls back to a static image.
pub struct ImageSelector {
    providers: Vec<Box<dyn ImageProvider>>,
    fallback_url: Option<String>,
}

impl ImageSelector {
    pub fn new(providers: Vec<Box<dyn ImageProvider>>, fallback_url: Option<String>) -> Self {
        Self {
            providers,
            fallback_url,
        }
    }

    /// Unsplash first when a key is configured, then LoremFlickr.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("crypto-news-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ConfigError::HttpClient)?;

        let mut providers: Vec<Box<dyn ImageProvider>> = Vec::new();
        if let Some(key) = &config.unsplash_access_key {
            providers.push(Box::new(UnsplashProvider::new(client.clone(), key.clone())));
        }
        providers.push(Box::new(LoremFlickrProvider::new(client)));

        Ok(Self::new(providers, config.image_fallback_url.clone()))
    }

    pub async fn select(&self, theme: &ImageTheme) -> Option<String> {
        for provider in &self.providers {
            match provider.resolve(theme).await {
                Ok(url) => {
                    info!(provider = provider.name(), "🖼️ Image selected");
                    return Some(url);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "⚠️ Image provider failed, trying next");
                }
            }
        }

        match &self.fallback_url {
            Some(url) => {
                info!("🖼️ Using fallback image");
                Some(url.clone())
            }
            None => {
                warn!("⚠️ No image available, post will be text-only");
                None
            }
        }
    }
}

#[async_trait]
impl ImageSource for ImageSelector {
    async fn select_image(&self, date: NaiveDate) -> Option<String> {
        self.select(&ImageTheme::crypto(date)).await
    }
}
