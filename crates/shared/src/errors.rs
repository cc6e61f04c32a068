use thiserror::Error;

/// Missing or malformed settings. Raised before any client is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "{0} not found.\n\n\
        Set it in the environment or in ~/.config/crypto-news-bot/.env"
    )]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// The summarization API could not produce usable text.
#[derive(Debug, Error)]
pub enum ContentGenerationError {
    #[error("failed to send request to Perplexity API: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Perplexity API error: {status} - {body}")]
    Upstream { status: u16, body: String },

    #[error("failed to parse Perplexity API response: {0}")]
    Malformed(String),

    #[error("Perplexity API returned no usable content")]
    EmptyContent,
}

/// A single image provider failed. Never fatal for a run.
#[derive(Debug, Error)]
pub enum ImageResolutionError {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("unexpected content type: {0}")]
    NotAnImage(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// The channel API rejected or failed the publish call.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to send request to Telegram: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Telegram API rejected the message: {status} - {description}")]
    Rejected { status: u16, description: String },

    #[error("malformed Telegram API response: {0}")]
    Malformed(String),
}

impl DeliveryError {
    /// True when Telegram refused the photo itself (unreachable URL, not an
    /// image, too large), so the same caption can still go out as text.
    pub fn is_photo_rejection(&self) -> bool {
        match self {
            DeliveryError::Rejected {
                status: 400,
                description,
            } => {
                let d = description.to_ascii_lowercase();
                [
                    "wrong file identifier",
                    "failed to get http url content",
                    "wrong type of the web page content",
                    "image_process_failed",
                    "photo_invalid_dimensions",
                    "wrong remote file",
                ]
                .iter()
                .any(|needle| d.contains(needle))
            }
            _ => false,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Content(#[from] ContentGenerationError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl RunError {
    /// Process exit status reported to the scheduler.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Config(_) => 2,
            RunError::Content(_) => 3,
            RunError::Delivery(_) => 4,
        }
    }
}
