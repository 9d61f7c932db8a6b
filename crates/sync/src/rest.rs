use std::time::Duration;

use async_trait::async_trait;
use collector_core::{SessionSummary, UsageEvent};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::rows::{SummaryRow, UsageEventRow, WatermarkRow};
use crate::target::SyncTarget;

const MERGE_PREFER: &str = "resolution=merge-duplicates,return=minimal";

#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base project URL; requests go to `{url}/rest/v1/{table}`.
    pub url: String,
    pub api_key: Option<String>,
    pub sessions_table: String,
    pub usage_table: String,
    pub watermarks_table: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub retry_base: Duration,
}

impl RestConfig {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
            sessions_table: "agent_sessions".to_string(),
            usage_table: "usage_events".to_string(),
            watermarks_table: "usage_watermarks".to_string(),
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_base: Duration::from_millis(250),
        }
    }
}

/// PostgREST-style remote store using merge-duplicate upserts.
pub struct RestStore {
    client: Client,
    config: RestConfig,
}

#[derive(Deserialize)]
struct WatermarkSelect {
    last_timestamp: i64,
}

impl RestStore {
    pub fn new(config: RestConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }

    async fn upsert_rows<T: Serialize + Sync>(
        &self,
        table: &str,
        on_conflict: &str,
        rows: &[T],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(table);
        self.send_with_retry(table, || {
            self.authorize(self.client.post(&url))
                .query(&[("on_conflict", on_conflict)])
                .header("Prefer", MERGE_PREFER)
                .json(rows)
        })
        .await?;
        debug!(table, rows = rows.len(), "upserted rows");
        Ok(())
    }

    async fn send_with_retry<F>(&self, table: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.retry_base;
        let mut attempt = 1;
        loop {
            let result = match build().send().await {
                Ok(response) => check_status(table, response).await,
                Err(err) => Err(SyncError::Http(err)),
            };
            match result {
                Ok(response) => return Ok(response),
                Err(err) if attempt < attempts && err.is_transient() => {
                    warn!(table, attempt, error = %err, "request failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

async fn check_status(table: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Status {
        table: table.to_string(),
        status,
        body,
    })
}

#[async_trait]
impl SyncTarget for RestStore {
    async fn upsert_summaries(&self, summaries: &[SessionSummary]) -> Result<()> {
        let rows: Vec<SummaryRow<'_>> = summaries.iter().map(SummaryRow::from).collect();
        self.upsert_rows(&self.config.sessions_table, "session_key", &rows)
            .await
    }

    async fn upsert_usage_events(&self, events: &[UsageEvent]) -> Result<()> {
        let rows: Vec<UsageEventRow<'_>> = events.iter().map(UsageEventRow::from).collect();
        self.upsert_rows(&self.config.usage_table, "event_key", &rows)
            .await
    }

    async fn get_watermark(&self, session_id: &str) -> Result<Option<i64>> {
        let table = &self.config.watermarks_table;
        let url = self.endpoint(table);
        let filter = format!("eq.{session_id}");
        let response = self
            .send_with_retry(table, || {
                self.authorize(self.client.get(&url))
                    .query(&[("session_id", filter.as_str()), ("select", "last_timestamp")])
            })
            .await?;
        let rows: Vec<WatermarkSelect> = response.json().await?;
        Ok(rows.into_iter().map(|row| row.last_timestamp).max())
    }

    async fn set_watermark(&self, session_id: &str, last_timestamp: i64) -> Result<()> {
        let row = WatermarkRow {
            session_id,
            last_timestamp,
        };
        self.upsert_rows(&self.config.watermarks_table, "session_id", &[row])
            .await
    }

    fn name(&self) -> &'static str {
        "rest"
    }
}
