//! Pagination crawler
//!
//! Follows a data service listing page by page and concatenates the
//! `results` of every page in arrival order. Page n+1 is requested only after
//! page n has been decoded.
//!
//! A "not found" page ends the crawl as if the listing were exhausted, so an
//! entity the service does not know contributes whatever was read before it
//! (usually nothing). Every other failure aborts the crawl.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::clients::{DataSource, PageRequest, PageResult};
use crate::error::{Error, Result, UpstreamError};
use crate::types::Record;

/// Crawl a listing starting at `first`
///
/// Each page fetch is bounded by `timeout` and abandoned as soon as `cancel`
/// fires.
pub async fn crawl(
    source: &dyn DataSource,
    first: PageRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut request = first;
    let mut pages = 0usize;

    loop {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled(format!("crawl of {}", request)));
            }
            fetched = tokio::time::timeout(timeout, source.list_page(&request)) => fetched,
        };

        let page = fetched.map_err(|_| UpstreamError::Timeout {
            operation: format!("GET {}", request),
            timeout,
        })??;
        pages += 1;

        match page {
            PageResult::NotFound => {
                tracing::debug!(request = %request, pages, "listing not found, ending crawl");
                break;
            }
            PageResult::Page { results, next } => {
                records.extend(results);
                match next {
                    Some(next) if next == request.to_string() => {
                        return Err(UpstreamError::DataSource(format!(
                            "next link of {} points at itself",
                            request
                        ))
                        .into());
                    }
                    Some(next) => request = PageRequest::follow(next),
                    None => break,
                }
            }
        }
    }

    tracing::trace!(pages, records = records.len(), "crawl finished");
    Ok(records)
}
