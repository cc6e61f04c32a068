use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use shared::{
    Config, ImageSelector, Orchestrator, PerplexitySummarizer, RunError, TelegramPublisher,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "crypto-news-bot")]
#[command(about = "Post the daily crypto market summary to a Telegram channel")]
struct Args {
    /// Format the post and log it instead of publishing
    #[arg(long)]
    dry_run: bool,

    /// Check both API credentials before generating content
    #[arg(long)]
    preflight: bool,

    /// Publication date (YYYY-MM-DD), defaults to today in UTC
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = shared::logging::init() {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<RunError>()
                .map(RunError::exit_code)
                .unwrap_or(1);
            error!("💥 {:#}", e);
            ExitCode::from(code)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    info!("🚀 Starting Crypto News Bot");

    // Credentials are checked before any client exists: a missing or invalid
    // setting exits with code 2 and no request leaves the process.
    let config = Config::from_env().map_err(RunError::from)?;
    info!("✅ Environment variables validated");

    let date = args.date.unwrap_or_else(|| Utc::now().date_naive());
    info!("📅 Publication date: {}", date.format("%Y-%m-%d"));

    let summarizer = PerplexitySummarizer::new(&config).map_err(RunError::from)?;
    let images = ImageSelector::from_config(&config).map_err(RunError::from)?;
    let publisher = TelegramPublisher::new(&config).map_err(RunError::from)?;

    if args.preflight {
        info!("🔗 Testing API connections...");
        summarizer
            .check_connection()
            .await
            .context("Perplexity connection check failed")?;
        publisher
            .get_me()
            .await
            .context("Telegram connection check failed")?;
    }

    let mut orchestrator =
        Orchestrator::new(summarizer, images, publisher).dry_run(args.dry_run);
    let outcome = orchestrator.run(date).await?;

    info!("✅ Post ready:");
    info!("   📏 Characters: {}", outcome.post.formatted_message.chars().count());
    info!(
        "   🖼️  Has image: {}",
        if outcome.post.image_url.is_some() { "Yes" } else { "No" }
    );
    if let Some(receipt) = outcome.receipt {
        info!("   🆔 Message id: {}", receipt.message_id);
        if outcome.post.image_url.is_some() && !receipt.with_image {
            info!("   ⚠️  Image was dropped, sent as text");
        }
    }

    Ok(())
}
