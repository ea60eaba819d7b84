//! Cursor-pagination driver shared by the discovery phases.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::MAX_PAGE_SIZE;
use crate::error::{Result, ScoutError};
use crate::types::{Page, RawStreamer};

/// Outcome of driving one paginated discovery sequence.
///
/// The sequence can end for three reasons: the upstream stopped returning a
/// cursor, the caller's cap was reached, or a fetch failed after the client
/// exhausted its retries. In the last case the records gathered so far are
/// still returned alongside the error that truncated the sequence.
#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<RawStreamer>,
    pub truncated_by: Option<ScoutError>,
    pub cancelled: bool,
}

/// Drive `fetch_page` until the cursor runs out or `cap` records have been
/// gathered. Consecutive pages may repeat records; deduplication happens
/// downstream.
pub async fn fetch_all<F, Fut>(
    cap: usize,
    cancel: &CancellationToken,
    mut fetch_page: F,
) -> FetchOutcome
where
    F: FnMut(u32, Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<RawStreamer>>>,
{
    let mut records: Vec<RawStreamer> = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        if cancel.is_cancelled() {
            debug!("stop requested, ending discovery at page boundary");
            return FetchOutcome {
                records,
                truncated_by: None,
                cancelled: true,
            };
        }
        if records.len() >= cap {
            break;
        }

        let page_size = (cap - records.len()).min(MAX_PAGE_SIZE as usize) as u32;
        match fetch_page(page_size, cursor.take()).await {
            Ok(page) => {
                records.extend(page.items);
                match page.cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            Err(e) => {
                warn!(error = %e, "discovery sequence truncated");
                return FetchOutcome {
                    records,
                    truncated_by: Some(e),
                    cancelled: false,
                };
            }
        }
    }

    FetchOutcome {
        records,
        truncated_by: None,
        cancelled: false,
    }
}
