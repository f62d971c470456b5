//! Indexed download client.

use std::time::Duration;

use chrono::{DateTime, Utc};
use grid::Array2D;
use reqwest::{header, Client, StatusCode};
use tracing::{debug, info, warn};

use crate::decode;
use crate::error::{GribIndexError, Result};
use crate::index::{self, IndexRecord, MessageAttributes};

/// One variable selector: an opaque tag handed back with the decoded
/// frame and the substring matched against index records.
#[derive(Debug, Clone)]
pub struct Selector<T> {
    pub tag: T,
    pub pattern: String,
}

/// A decoded message paired with the selector that matched it.
#[derive(Debug)]
pub struct IndexedMessage<T> {
    pub tag: T,
    pub frame: Array2D,
    pub attributes: MessageAttributes,
}

/// Retry behaviour of one indexed download.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Absolute point after which waiting is abandoned.
    pub deadline: DateTime<Utc>,
    /// How long the index may stay unchanged while selectors are missing
    /// before the run is declared stalled.
    pub wait_after_last_modified: Duration,
    /// Pause between retries.
    pub retry_interval: Duration,
}

/// HTTP client for index sidecars and ranged message GETs.
///
/// One instance holds one connection pool; it is cheap to clone and safe
/// to share across concurrent downloads.
#[derive(Debug, Clone)]
pub struct GribIndexClient {
    client: Client,
}

impl GribIndexClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Download and decode every message matching a selector.
    ///
    /// Emission order mirrors the order of matched index records. The
    /// same selector may match several records (sub-hourly products carry
    /// one message per sub-step).
    pub async fn download_indexed<T: Clone>(
        &self,
        url: &str,
        selectors: &[Selector<T>],
        grid_shape: (usize, usize),
        policy: &FetchPolicy,
    ) -> Result<Vec<IndexedMessage<T>>> {
        let records = self.wait_for_index(url, selectors, policy).await?;

        let mut messages = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let Some(selector) = selectors.iter().find(|s| record.line.contains(&s.pattern))
            else {
                continue;
            };

            let (start, end) = index::byte_range(&records, i);
            let data = self.fetch_range(url, start, end, policy).await?;
            let (nx, ny) = grid_shape;
            let frame = decode::decode_message(&data, nx, ny)?;

            debug!(
                url = %url,
                pattern = %selector.pattern,
                record = record.record_no,
                bytes = data.len(),
                "Decoded message"
            );

            messages.push(IndexedMessage {
                tag: selector.tag.clone(),
                frame,
                attributes: MessageAttributes::from_record(record),
            });
        }

        Ok(messages)
    }

    /// Poll the index sidecar until every selector matches at least one
    /// record.
    ///
    /// Missing sidecars are retried until the deadline. A sidecar that is
    /// present but stops advancing while selectors are still missing is
    /// fatal: either the run will never carry them (catalogue bug) or the
    /// upstream publisher stalled. Advancement is tracked via the
    /// Last-Modified header, falling back to comparing the body when the
    /// server does not send one.
    async fn wait_for_index<T>(
        &self,
        url: &str,
        selectors: &[Selector<T>],
        policy: &FetchPolicy,
    ) -> Result<Vec<IndexRecord>> {
        let index_url = format!("{}.idx", url);
        let mut last_marker: Option<String> = None;
        let mut last_progress = Utc::now();

        loop {
            let fetched = match self.try_fetch_index(&index_url).await {
                Ok(fetched) => Some(fetched),
                Err(e) => {
                    debug!(url = %index_url, error = %e, "Index not available yet");
                    None
                }
            };

            if let Some((last_modified, content)) = fetched {
                let records = index::parse_index(&content);
                let missing: Vec<String> = selectors
                    .iter()
                    .filter(|s| !records.iter().any(|r| r.line.contains(&s.pattern)))
                    .map(|s| s.pattern.clone())
                    .collect();

                if missing.is_empty() {
                    return Ok(records);
                }

                let marker = last_modified.unwrap_or(content);
                if last_marker.as_deref() != Some(marker.as_str()) {
                    last_progress = Utc::now();
                    last_marker = Some(marker);
                } else if (Utc::now() - last_progress).to_std().unwrap_or_default()
                    > policy.wait_after_last_modified
                {
                    return Err(GribIndexError::SelectorNotFound {
                        url: url.to_string(),
                        patterns: missing,
                    });
                }

                info!(
                    url = %index_url,
                    missing = missing.len(),
                    "Index incomplete, waiting"
                );
            }

            if Utc::now() > policy.deadline {
                return Err(GribIndexError::DeadlineExceeded {
                    url: url.to_string(),
                });
            }
            tokio::time::sleep(policy.retry_interval).await;
        }
    }

    /// Ranged GET with retry until the deadline.
    async fn fetch_range(
        &self,
        url: &str,
        start: u64,
        end: Option<u64>,
        policy: &FetchPolicy,
    ) -> Result<Vec<u8>> {
        let range = match end {
            Some(end) => format!("bytes={}-{}", start, end - 1),
            None => format!("bytes={}-", start),
        };

        loop {
            match self.try_fetch_range(url, &range).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    if Utc::now() > policy.deadline {
                        return Err(e);
                    }
                    warn!(url = %url, range = %range, error = %e, "Range request failed, retrying");
                    tokio::time::sleep(policy.retry_interval).await;
                }
            }
        }
    }

    /// Fetch the sidecar, returning its Last-Modified header (if any)
    /// and body.
    async fn try_fetch_index(&self, url: &str) -> Result<(Option<String>, String)> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(GribIndexError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((last_modified, response.text().await?))
    }

    async fn try_fetch_range(&self, url: &str, range: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(header::RANGE, range)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                Ok(response.bytes().await?.to_vec())
            }
            status => Err(GribIndexError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}
