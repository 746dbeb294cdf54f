#![doc = include_str!("../README.md")]

extern crate alloc;

use alloc::sync::Arc;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::Mutex;

/// Default `Accept` header when a primary-key declaration names none.
pub const DEFAULT_ACCEPT: &str = "text/uri-list";

/// Default cap on concurrent provider requests.
pub const DEFAULT_CONCURRENCY: usize = 8;

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// A provider feed to fetch: one URL per (provider, schema id) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub url: String,
    pub accept: String,
    pub schema_id: String,
    pub pk_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// 4xx/5xx after the retry budget. 4xx never retries.
    #[error("{url}: HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("{url}: {message}")]
    Network { url: String, message: String },

    #[error("{url}: failed to decode feed: {message}")]
    Decode { url: String, message: String },
}

/// In-memory response for the test backend.
type MockResponse = Result<(String, String), u16>;

enum HttpMode {
    /// Production mode — reqwest with per-request timeout.
    Reqwest(reqwest::Client),
    /// Test mode — canned `(content_type, body)` responses per URL,
    /// or an HTTP status to fail with.
    Memory(Mutex<HashMap<String, MockResponse>>),
}

/// Fetches provider feeds with bounded concurrency and retries.
#[derive(Clone)]
pub struct ProviderFetcher {
    http: Arc<HttpMode>,
    semaphore: Arc<tokio::sync::Semaphore>,
    max_retries: u32,
    timeout: Duration,
}

impl ProviderFetcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            http: Arc::new(HttpMode::Reqwest(reqwest::Client::new())),
            semaphore: Arc::new(tokio::sync::Semaphore::new(concurrency.max(1))),
            max_retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Test constructor — no HTTP; responses come from [`insert`](Self::insert).
    pub fn memory() -> Self {
        Self {
            http: Arc::new(HttpMode::Memory(Mutex::new(HashMap::new()))),
            semaphore: Arc::new(tokio::sync::Semaphore::new(DEFAULT_CONCURRENCY)),
            max_retries: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Register a canned response for the memory backend.
    #[allow(clippy::missing_panics_doc)] // Mutex poisoning is unreachable
    pub fn insert(&self, url: &str, content_type: &str, body: &str) {
        if let HttpMode::Memory(map) = &*self.http {
            map.lock()
                .expect("memory responses poisoned")
                .insert(url.to_string(), Ok((content_type.to_string(), body.to_string())));
        }
    }

    /// Register a canned HTTP failure for the memory backend.
    #[allow(clippy::missing_panics_doc)] // Mutex poisoning is unreachable
    pub fn insert_failure(&self, url: &str, status: u16) {
        if let HttpMode::Memory(map) = &*self.http {
            map.lock()
                .expect("memory responses poisoned")
                .insert(url.to_string(), Err(status));
        }
    }

    /// Fetch one feed and decode it into key strings.
    ///
    /// Network errors and 5xx responses are retried with exponential
    /// backoff up to the retry budget; 4xx is fatal immediately.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the URL is unreachable after
    /// retries, answers with an error status, or the body cannot be decoded.
    #[tracing::instrument(level = "debug", skip(self), fields(url = feed.url.as_str()))]
    pub async fn fetch_feed(&self, feed: &Feed) -> Result<Vec<String>, ProviderError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ProviderError::Network {
                url: feed.url.clone(),
                message: e.to_string(),
            })?;

        let mut attempt = 0;
        let (content_type, body) = loop {
            match self.get(&feed.url, &feed.accept).await {
                Ok(response) => break response,
                Err(e) => {
                    let retryable = match &e {
                        ProviderError::Http { status, .. } => *status >= 500,
                        ProviderError::Network { .. } => true,
                        ProviderError::Decode { .. } => false,
                    };
                    if !retryable || attempt >= self.max_retries {
                        return Err(e);
                    }
                    let delay = BACKOFF_BASE * 2u32.saturating_pow(attempt);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying provider fetch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        let media_type = if content_type.is_empty() {
            feed.accept.as_str()
        } else {
            content_type.as_str()
        };
        decode_feed(&feed.url, media_type, &body)
    }

    /// Fetch many feeds concurrently, preserving input order in the result.
    pub async fn fetch_feeds(
        &self,
        feeds: Vec<Feed>,
    ) -> Vec<(Feed, Result<Vec<String>, ProviderError>)> {
        let mut tasks = tokio::task::JoinSet::new();
        for (i, feed) in feeds.into_iter().enumerate() {
            let fetcher = self.clone();
            tasks.spawn(async move {
                let result = fetcher.fetch_feed(&feed).await;
                (i, feed, result)
            });
        }

        let mut results: Vec<(usize, Feed, Result<Vec<String>, ProviderError>)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(item) => results.push(item),
                Err(e) => tracing::warn!("provider fetch task panicked: {e}"),
            }
        }
        results.sort_by_key(|(i, _, _)| *i);
        results.into_iter().map(|(_, feed, r)| (feed, r)).collect()
    }

    async fn get(&self, url: &str, accept: &str) -> Result<(String, String), ProviderError> {
        match &*self.http {
            HttpMode::Reqwest(client) => {
                let resp = client
                    .get(url)
                    .header("Accept", accept)
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(|e| ProviderError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    })?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(ProviderError::Http {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                let content_type = resp
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let body = resp.text().await.map_err(|e| ProviderError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
                Ok((content_type, body))
            }
            HttpMode::Memory(map) => {
                let canned = map
                    .lock()
                    .expect("memory responses poisoned")
                    .get(url)
                    .cloned();
                match canned {
                    Some(Ok(response)) => Ok(response),
                    Some(Err(status)) => Err(ProviderError::Http {
                        url: url.to_string(),
                        status,
                    }),
                    None => Err(ProviderError::Network {
                        url: url.to_string(),
                        message: "memory-only fetcher: no canned response".to_string(),
                    }),
                }
            }
        }
    }
}

/// Compose the feed URL for one (provider, schema id) pair.
///
/// When `schema_prefix` matches a prefix of the schema id, the remainder is
/// appended to the provider; otherwise the schema id is appended verbatim.
pub fn compose_url(provider: &str, schema_id: &str, schema_prefix: Option<&str>) -> String {
    let suffix = match schema_prefix {
        Some(prefix) => schema_id.strip_prefix(prefix).unwrap_or(schema_id),
        None => schema_id,
    };
    format!("{provider}{suffix}")
}

/// Decode a feed body into key strings according to its media type.
fn decode_feed(url: &str, media_type: &str, body: &str) -> Result<Vec<String>, ProviderError> {
    if media_type.starts_with("text/csv") {
        return decode_csv(url, body);
    }
    // text/uri-list (RFC 2483): one URI per line, '#' lines are comments.
    Ok(body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn decode_csv(url: &str, body: &str) -> Result<Vec<String>, ProviderError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut keys = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ProviderError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if let Some(first) = record.get(0) {
            let first = first.trim();
            if !first.is_empty() {
                keys.push(first.to_string());
            }
        }
    }
    Ok(keys)
}
