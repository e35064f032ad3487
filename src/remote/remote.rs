use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

/// One completed session, shaped the way the logging endpoint expects it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub title: String,
    pub start: String,
    pub end: String,
    pub purpose: String,
    pub note: String,
}

impl SessionRecord {
    pub fn new(
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        purpose: &str,
        note: &str,
    ) -> Self {
        Self {
            // Title carries the local start time; the timestamps stay UTC.
            title: started_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            start: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            end: ended_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            purpose: purpose.to_string(),
            note: note.to_string(),
        }
    }
}

/// Fire-and-forget POST of a completed session. Never surfaces an error to
/// the timer; failures end up in the diagnostic log only.
pub fn log_session(endpoint: String, record: SessionRecord) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = post_session(&endpoint, &record).await {
            log::warn!("Session log to {endpoint} failed: {e}");
        }
    })
}

async fn post_session(
    endpoint: &str,
    record: &SessionRecord,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client = reqwest::Client::new();
    let resp = client.post(endpoint).json(record).send().await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(format!("server returned {status}: {text}").into());
    }

    let body: serde_json::Value = resp.json().await?;
    log::info!("Session logged: {body}");
    Ok(())
}
