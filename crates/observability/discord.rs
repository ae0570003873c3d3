use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;

use super::alert_layer::AlertEvent;

const QUEUE_CAPACITY: usize = 256;
const DISCORD_CONTENT_LIMIT: usize = 2000;

/// Handle to a background task posting alerts to a Discord webhook.
#[derive(Clone)]
pub(crate) struct DiscordAlertSink {
    tx: mpsc::Sender<AlertEvent>,
}

impl DiscordAlertSink {
    pub(crate) fn spawn(webhook_url: Url) -> Self {
        let (tx, mut rx) = mpsc::channel::<AlertEvent>(QUEUE_CAPACITY);
        let client = Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_else(|_| Client::new());

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // Errors go to stderr: logging them through tracing could loop back here.
                if let Err(err) = post(&client, &webhook_url, &event).await {
                    eprintln!("observability: discord alert dropped: {err}");
                }
            }
        });

        Self { tx }
    }

    /// Drops the alert when the queue is full; callers are on the logging hot path.
    pub(crate) fn try_send(&self, event: AlertEvent) {
        if self.tx.try_send(event).is_err() {
            eprintln!("observability: discord alert queue unavailable, dropping event");
        }
    }
}

async fn post(client: &Client, webhook_url: &Url, event: &AlertEvent) -> Result<()> {
    let response = client
        .post(webhook_url.clone())
        .json(&json!({ "content": format_alert(event) }))
        .send()
        .await
        .map_err(|err| {
            if err.is_timeout() {
                anyhow!("discord webhook timed out")
            } else {
                anyhow!("discord webhook request failed")
            }
        })?;

    if !response.status().is_success() {
        return Err(anyhow!("discord webhook returned {}", response.status()));
    }

    Ok(())
}

pub(crate) fn format_alert(event: &AlertEvent) -> String {
    let mut lines = vec![format!(
        "**{}** `{}` `{}` `{}`",
        event.service.service_name,
        event.service.environment,
        event.service.component,
        event.level
    )];

    let location = event
        .location
        .as_ref()
        .map(|location| format!(" `{location}`"))
        .unwrap_or_default();
    lines.push(format!(
        "`{}` `{}`{location}",
        event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        event.target
    ));

    if let Some(message) = event.message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        lines.push(format!("> {message}"));
    }

    if !event.spans.is_empty() {
        lines.push(format!("spans: `{}`", event.spans.join(" > ")));
    }

    lines.extend(
        event
            .fields
            .iter()
            .map(|(key, value)| format!("- `{key}` = `{value}`")),
    );

    truncate(lines.join("\n"), DISCORD_CONTENT_LIMIT)
}

fn truncate(content: String, limit: usize) -> String {
    const SUFFIX: &str = "\n... (truncated)";

    if content.chars().count() <= limit {
        return content;
    }

    let keep = limit.saturating_sub(SUFFIX.len());
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str(SUFFIX);
    truncated
}
