//! Data service clients.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use super::{DataSource, PageRequest, PageResult, build_client, request_error};
use crate::error::{Result, UpstreamError};
use crate::types::Record;

/// Wire shape of a data service page
#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default)]
    results: serde_json::Value,
    #[serde(default, rename = "_links")]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    next: Option<String>,
}

/// Normalize `results`: lists pass through, a single resource becomes a
/// one-element list, null becomes empty
fn into_records(results: serde_json::Value) -> Vec<Record> {
    match results {
        serde_json::Value::Array(records) => records,
        serde_json::Value::Null => Vec::new(),
        single => vec![single],
    }
}

/// Data service reached over HTTP
pub struct HttpDataSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDataSource {
    /// Create a client for the data service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Resolve a request path (relative or absolute) to a full URL
    fn resolve(&self, request: &PageRequest) -> Result<Url> {
        let raw = if request.path.starts_with("http://") || request.path.starts_with("https://") {
            request.path.clone()
        } else {
            format!(
                "{}/{}",
                self.base_url,
                request.path.trim_start_matches('/')
            )
        };

        let mut url = Url::parse(&raw).map_err(|e| {
            UpstreamError::DataSource(format!("invalid page URL '{}': {}", raw, e))
        })?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn list_page(&self, request: &PageRequest) -> Result<PageResult> {
        let url = self.resolve(request)?;
        let operation = format!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(e, &operation, self.timeout, UpstreamError::DataSource))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(request = %request, "data service returned 404");
            return Ok(PageResult::NotFound);
        }
        if !status.is_success() {
            return Err(
                UpstreamError::DataSource(format!("{} returned {}", operation, status)).into(),
            );
        }

        let body: PageBody = response.json().await.map_err(|e| {
            UpstreamError::DataSource(format!("invalid page body from {}: {}", operation, e))
        })?;

        Ok(PageResult::Page {
            results: into_records(body.results),
            next: body.links.next.filter(|next| !next.is_empty()),
        })
    }
}

enum Scripted {
    Page(PageResult),
    Fail(String),
}

/// In-memory [`DataSource`] serving scripted pages
///
/// Pages are keyed by the rendered request (`path?k=v&...`). Unknown requests
/// answer [`PageResult::NotFound`]. Every request is recorded in order.
#[derive(Default)]
pub struct MemoryDataSource {
    pages: Mutex<HashMap<String, (Scripted, Duration)>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryDataSource {
    /// Create a source that knows no pages
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `pages` as a chain starting at `first`
    ///
    /// Each page links to the next through a synthetic `page=N` link; the
    /// last page has no `next`. Every page is delayed by `delay`.
    pub fn insert_pages(&self, first: &PageRequest, pages: Vec<Vec<Record>>, delay: Duration) {
        let base = first.to_string();
        let sep = if base.contains('?') { '&' } else { '?' };
        let key = |n: usize| {
            if n == 0 {
                base.clone()
            } else {
                format!("{base}{sep}page={n}")
            }
        };

        let count = pages.len();
        let mut scripted = self.lock_pages();
        for (n, results) in pages.into_iter().enumerate() {
            let next = (n + 1 < count).then(|| key(n + 1));
            scripted.insert(
                key(n),
                (Scripted::Page(PageResult::Page { results, next }), delay),
            );
        }
    }

    /// Serve a single page with an explicit `next` link
    pub fn insert_page(&self, request: &PageRequest, results: Vec<Record>, next: Option<String>) {
        self.lock_pages().insert(
            request.to_string(),
            (
                Scripted::Page(PageResult::Page { results, next }),
                Duration::ZERO,
            ),
        );
    }

    /// Fail every fetch of `request` with `message`
    pub fn insert_failure(&self, request: &PageRequest, message: impl Into<String>, delay: Duration) {
        self.lock_pages()
            .insert(request.to_string(), (Scripted::Fail(message.into()), delay));
    }

    /// Requests served so far, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn lock_pages(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Scripted, Duration)>> {
        self.pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn list_page(&self, request: &PageRequest) -> Result<PageResult> {
        let key = request.to_string();
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key.clone());

        let (outcome, delay) = match self.lock_pages().get(&key) {
            Some((Scripted::Page(page), delay)) => (Ok(page.clone()), *delay),
            Some((Scripted::Fail(message), delay)) => (Err(message.clone()), *delay),
            None => (Ok(PageResult::NotFound), Duration::ZERO),
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        outcome.map_err(|message| UpstreamError::DataSource(message).into())
    }
}
