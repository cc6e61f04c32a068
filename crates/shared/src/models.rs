use chrono::NaiveDate;

/// The one thing a run produces. Lives in memory until the process exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub date: NaiveDate,
    pub raw_summary: String,
    pub image_url: Option<String>,
    pub formatted_message: String,
}

/// Telegram's acknowledgement of a published post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: i64,
    /// False when the post went out text-only.
    pub with_image: bool,
}
