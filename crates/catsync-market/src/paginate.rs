//! Generic cursor-based pagination.
//!
//! Every marketplace endpoint that lists offers, attributes, or prices hands
//! back an opaque continuation cursor. [`fetch_all_pages`] drives any such
//! endpoint to completion against three stop conditions: an exhausted cursor,
//! the hard page cap, and an optional caller-supplied item cap.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::MarketError;

/// One page of results plus the continuation cursor for the next call.
/// An absent or empty cursor means the listing is exhausted.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Caps and pacing applied while walking a paginated endpoint.
#[derive(Debug, Clone)]
pub struct PageLimits {
    /// Hard safety cap on the number of pages fetched. Exceeding it is an
    /// error: a cursor that never drains means the remote API is looping.
    pub max_pages: usize,
    /// Stop after accumulating this many items, truncating the final page
    /// rather than discarding it. `None` means fetch everything.
    pub max_items: Option<usize>,
    /// Fixed delay between page requests (never before the first).
    pub inter_page_delay_ms: u64,
}

/// All items accumulated across a pagination walk, plus the number of pages
/// consulted, for diagnostics.
#[derive(Debug)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pages: usize,
}

/// Repeatedly calls `fetch` with the previous page's cursor, accumulating
/// items until the cursor drains, `limits.max_items` is reached, or
/// `limits.max_pages` is exceeded.
///
/// The cancellation token is checked between pages; an in-flight request is
/// allowed to finish.
///
/// # Errors
///
/// - [`MarketError::PaginationLimit`] when more than `max_pages` pages would
///   be fetched.
/// - [`MarketError::Cancelled`] when `cancel` trips between pages.
/// - Any error from `fetch`, propagated unchanged. Items from earlier pages
///   are discarded on failure: a partial listing would make the downstream
///   reconciliation treat absent offers as gone.
pub async fn fetch_all_pages<T, F, Fut>(
    limits: &PageLimits,
    cancel: &CancellationToken,
    context: &str,
    mut fetch: F,
) -> Result<Paginated<T>, MarketError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, MarketError>>,
{
    let mut items: Vec<T> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut is_first_page = true;
    let mut pages = 0usize;

    loop {
        pages += 1;
        if pages > limits.max_pages {
            return Err(MarketError::PaginationLimit {
                context: context.to_owned(),
                max_pages: limits.max_pages,
            });
        }

        if !is_first_page {
            if cancel.is_cancelled() {
                return Err(MarketError::Cancelled);
            }
            if limits.inter_page_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(limits.inter_page_delay_ms)).await;
            }
        }
        is_first_page = false;

        let page = fetch(cursor.take()).await?;
        items.extend(page.items);

        if let Some(cap) = limits.max_items {
            if items.len() >= cap {
                items.truncate(cap);
                return Ok(Paginated { items, pages });
            }
        }

        cursor = page.next_cursor.filter(|c| !c.is_empty());
        if cursor.is_none() {
            return Ok(Paginated { items, pages });
        }
    }
}
