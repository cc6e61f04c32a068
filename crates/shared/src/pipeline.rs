//! Run orchestration: fetch a summary, pick an image, publish the post.
//!
//! Each step sits behind a trait so the sequence can be driven by the real
//! HTTP clients or by in-memory doubles.

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{error, info};

use crate::briefing::BriefingFormatter;
use crate::errors::{ContentGenerationError, DeliveryError, RunError};
use crate::models::{Post, PublishReceipt};

#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn fetch_summary(&self, date: NaiveDate) -> Result<String, ContentGenerationError>;
}

/// Never fails: implementations degrade to a fallback or to no image.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn select_image(&self, date: NaiveDate) -> Option<String>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        message: &str,
        image_url: Option<&str>,
    ) -> Result<PublishReceipt, DeliveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fetching,
    Imaging,
    Publishing,
    Done,
    Failed,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub post: Post,
    /// `None` for dry runs.
    pub receipt: Option<PublishReceipt>,
}

pub struct Orchestrator<S, I, P> {
    summaries: S,
    images: I,
    publisher: P,
    dry_run: bool,
    history: Vec<RunState>,
}

impl<S, I, P> Orchestrator<S, I, P>
where
    S: SummarySource,
    I: ImageSource,
    P: Publisher,
{
    pub fn new(summaries: S, images: I, publisher: P) -> Self {
        Self {
            summaries,
            images,
            publisher,
            dry_run: false,
            history: Vec::new(),
        }
    }

    /// Format the post but skip the publish step.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Current state; `None` before `run` is called.
    pub fn state(&self) -> Option<RunState> {
        self.history.last().copied()
    }

    /// Every state the last run passed through, in order.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// One complete run. Steps execute strictly in order and the first
    /// fatal error ends the run.
    pub async fn run(&mut self, date: NaiveDate) -> Result<RunOutcome, RunError> {
        self.history.clear();

        self.enter(RunState::Fetching);
        info!("📰 Generating crypto content...");
        let raw_summary = match self.summaries.fetch_summary(date).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return Err(self.fail(ContentGenerationError::EmptyContent.into())),
            Err(e) => return Err(self.fail(e.into())),
        };
        info!(
            chars = raw_summary.chars().count(),
            "📝 Preview: {}...",
            raw_summary.chars().take(80).collect::<String>()
        );

        self.enter(RunState::Imaging);
        let image_url = self.images.select_image(date).await;

        let post = Post {
            date,
            formatted_message: BriefingFormatter::format(&raw_summary, date),
            raw_summary,
            image_url,
        };

        if self.dry_run {
            info!(
                image = post.image_url.as_deref().unwrap_or("none"),
                "🧪 Dry run, not publishing:\n{}",
                post.formatted_message
            );
            self.enter(RunState::Done);
            return Ok(RunOutcome {
                post,
                receipt: None,
            });
        }

        self.enter(RunState::Publishing);
        match self
            .publisher
            .publish(&post.formatted_message, post.image_url.as_deref())
            .await
        {
            Ok(receipt) => {
                info!(
                    message_id = receipt.message_id,
                    with_image = receipt.with_image,
                    "🎉 Crypto content sent successfully!"
                );
                self.enter(RunState::Done);
                Ok(RunOutcome {
                    post,
                    receipt: Some(receipt),
                })
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    fn enter(&mut self, state: RunState) {
        self.history.push(state);
    }

    fn fail(&mut self, err: RunError) -> RunError {
        let step = self.state();
        self.enter(RunState::Failed);
        error!(step = ?step, error = %err, "❌ Run failed");
        err
    }
}
