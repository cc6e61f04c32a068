// Public modules
pub mod briefing;
pub mod config;
pub mod errors;
pub mod images;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod summarizer;
pub mod telegram;

// Re-export commonly used types
pub use briefing::BriefingFormatter;
pub use config::Config;
pub use errors::{ConfigError, ContentGenerationError, DeliveryError, ImageResolutionError, RunError};
pub use images::{ImageProvider, ImageSelector, ImageTheme};
pub use models::{Post, PublishReceipt};
pub use pipeline::{ImageSource, Orchestrator, Publisher, RunOutcome, RunState, SummarySource};
pub use summarizer::PerplexitySummarizer;
pub use telegram::TelegramPublisher;
