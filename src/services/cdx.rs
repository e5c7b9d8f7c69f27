// src/services/cdx.rs

//! Index listing client.
//!
//! Pages through the CDX search API and yields one [`CdxRecord`] per listing
//! line. Every page is buffered in full and replayed in reverse, so records
//! come out newest-first within a page while pages are visited in increasing
//! order.

use std::sync::Arc;

use futures::stream::{self, Stream};

use crate::models::{CdxFilter, CdxRecord, DownloadRequest, MatchType};
use crate::resilience::ResilientClient;
use crate::utils::CancelToken;

const SEARCH_PATH: &str = "/cdx/search/cdx";

/// Parameters of one listing.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    pub match_url: String,
    pub match_type: MatchType,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub filters: Vec<CdxFilter>,
    /// Stop after this many parsed records
    pub limit: Option<u64>,
}

impl ListingQuery {
    pub fn from_request(request: &DownloadRequest) -> Self {
        Self {
            match_url: request.match_url.clone(),
            match_type: request.match_type,
            from: request.from,
            to: request.to,
            filters: request.filters.clone(),
            limit: request.limit,
        }
    }

    /// Query string shared by every page request.
    pub fn to_query_string(&self) -> String {
        let mut query = format!(
            "url={}&matchType={}",
            urlencoding::encode(&self.match_url),
            self.match_type
        );
        if let Some(from) = self.from {
            query.push_str(&format!("&from={from}"));
        }
        if let Some(to) = self.to {
            query.push_str(&format!("&to={to}"));
        }
        for filter in &self.filters {
            query.push_str(&format!("&filter={}", urlencoding::encode(&filter.to_string())));
        }
        query
    }
}

/// Client for the CDX index API.
pub struct CdxClient {
    client: Arc<ResilientClient>,
    index_host: String,
}

struct PageCursor {
    query: String,
    page: u64,
    /// Records of the current page, oldest first; popped from the back
    buffer: Vec<CdxRecord>,
    emitted: u64,
    finished: bool,
}

impl CdxClient {
    pub fn new(client: Arc<ResilientClient>, index_host: impl Into<String>) -> Self {
        Self {
            client,
            index_host: index_host.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn page_url(&self, query: &str, page: u64) -> String {
        format!(
            "{}{SEARCH_PATH}?{query}&collapse=digest&page={page}",
            self.index_host
        )
    }

    /// Stream every record of the listing.
    ///
    /// The stream ends on an empty page, on an unsuccessful response, once
    /// `limit` records were yielded, or when `cancel` fires. Failures are
    /// logged, never raised.
    pub fn records<'a>(
        &'a self,
        query: &ListingQuery,
        cancel: &'a CancelToken,
    ) -> impl Stream<Item = CdxRecord> + 'a {
        let limit = query.limit;
        let cursor = PageCursor {
            query: query.to_query_string(),
            page: 0,
            buffer: Vec::new(),
            emitted: 0,
            finished: false,
        };

        stream::unfold(cursor, move |mut cursor| async move {
            loop {
                if limit.is_some_and(|limit| cursor.emitted >= limit) {
                    log::info!("Record limit of {} reached", cursor.emitted);
                    return None;
                }
                if let Some(record) = cursor.buffer.pop() {
                    cursor.emitted += 1;
                    return Some((record, cursor));
                }
                if cursor.finished || cancel.is_cancelled() {
                    return None;
                }

                match self.fetch_page(&cursor.query, cursor.page, cancel).await {
                    Some(records) => {
                        cursor.buffer = records;
                        cursor.page += 1;
                    }
                    None => cursor.finished = true,
                }
            }
        })
    }

    /// Fetch and parse one page. `None` means the listing is over.
    async fn fetch_page(&self, query: &str, page: u64, cancel: &CancelToken) -> Option<Vec<CdxRecord>> {
        let url = self.page_url(query, page);
        log::info!("Requesting page {} of snapshot list, {}", page, url);

        let response = match self.client.get(&url, cancel).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Snapshot list page {} could not be fetched: {}", page, e);
                return None;
            }
        };

        if !response.is_success() {
            log::info!(
                "Snapshot list download was unsuccessful. Page {} StatusCode {}.",
                page,
                response.status()
            );
            return None;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Snapshot list page {} could not be read: {}", page, e);
                return None;
            }
        };

        let lines: Vec<&str> = body.lines().filter(|line| !line.trim().is_empty()).collect();
        if lines.is_empty() {
            log::info!("Finished fetching snapshots after {} page(s)", page);
            return None;
        }

        let records = lines
            .into_iter()
            .filter_map(|line| match CdxRecord::parse_line(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping malformed CDX line ({}): '{}'", e, line);
                    None
                }
            })
            .collect();
        Some(records)
    }
}
