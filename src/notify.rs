//! Discord webhook notifications for new applications

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::state::ApplicationSubmission;

/// Discord blurple
const EMBED_COLOR: u32 = 0x5865F2;
const EMBED_TITLE: &str = "📜 New Application Submitted";
/// Discord rejects embed field values longer than this
const FIELD_VALUE_LIMIT: usize = 1024;
/// Discord's cap on title, field names and values combined
const EMBED_TOTAL_LIMIT: usize = 6000;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_submission(&self, submission: &ApplicationSubmission) -> Result<()>;
}

/// Posts an embed to a Discord webhook. Without a URL every call is a no-op.
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: Option<String>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(http_client: reqwest::Client, url: Option<String>, timeout: Duration) -> Self {
        Self {
            http_client,
            url,
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_submission(&self, submission: &ApplicationSubmission) -> Result<()> {
        let Some(url) = self.url.as_deref() else {
            debug!("WEBHOOK_URL not set, skipping notification");
            return Ok(());
        };

        let response = self
            .http_client
            .post(url)
            .json(&submission_payload(submission))
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream {
                endpoint: "webhook".to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Webhook body summarizing a submission
pub fn submission_payload(submission: &ApplicationSubmission) -> Value {
    let mut fields = vec![
        ("Discord ID", field_value(&submission.discord_id), true),
        ("Name", field_value(&submission.discord_name), true),
        ("Age", field_value(&submission.age), true),
        ("Region", field_value(&submission.region), true),
        ("Experience", field_value(&submission.experience), false),
        ("Why Apply", field_value(&submission.why_apply), false),
        ("Stream", field_value(&submission.stream), false),
        ("Metagaming", field_value(&submission.metagaming), false),
        ("FailRP", field_value(&submission.failrp), false),
        ("Rules Location", field_value(&submission.rules_location), false),
    ];

    let fixed = EMBED_TITLE.chars().count()
        + fields.iter().map(|(name, _, _)| name.chars().count()).sum::<usize>();
    let lengths: Vec<usize> = fields.iter().map(|(_, value, _)| value.chars().count()).collect();
    if let Some(cap) = value_cap(&lengths, EMBED_TOTAL_LIMIT.saturating_sub(fixed)) {
        for (_, value, _) in fields.iter_mut() {
            *value = truncate(value, cap);
        }
    }

    let fields: Vec<Value> = fields
        .into_iter()
        .map(|(name, value, inline)| json!({ "name": name, "value": value, "inline": inline }))
        .collect();

    json!({
        "embeds": [{
            "title": EMBED_TITLE,
            "color": EMBED_COLOR,
            "fields": fields,
            "timestamp": submission.submitted_at.to_rfc3339(),
        }]
    })
}

/// Largest per-value length that keeps the sum of `lengths` within `budget`,
/// or `None` when everything already fits. Short values keep their length.
fn value_cap(lengths: &[usize], budget: usize) -> Option<usize> {
    if lengths.iter().sum::<usize>() <= budget {
        return None;
    }

    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();

    let mut remaining = budget;
    for (i, len) in sorted.iter().enumerate() {
        let left = sorted.len() - i;
        let share = remaining / left;
        if *len > share {
            return Some(share.max(1));
        }
        remaining -= len;
    }
    None
}

fn field_value(value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => truncate(v, FIELD_VALUE_LIMIT),
        _ => "N/A".to_string(),
    }
}

/// At most `limit` chars, ending in an ellipsis when cut
fn truncate(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(limit.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
