//! Bounded-concurrency page retrieval.

use crate::errors::PageFetchError;
use crate::http_client::HttpClient;
use crate::metrics_defs::{PAGE_FETCHES_INFLIGHT, PAGES_FETCHED};
use crate::planner::{PagePlan, PlannedPage};
use crate::token::{Token, data_headers};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// Records of one page, tagged with the page index.
#[derive(Clone, Debug, PartialEq)]
pub struct PageResult {
    pub index: u32,
    pub records: Vec<Value>,
}

#[derive(Deserialize)]
struct PageBody {
    data: Vec<Value>,
}

/// Keeps the in-flight gauge honest when a task finishes or is aborted.
struct InflightGuard {
    _permit: OwnedSemaphorePermit,
}

impl InflightGuard {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        shared::gauge!(PAGE_FETCHES_INFLIGHT).increment(1.0);
        Self { _permit: permit }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        shared::gauge!(PAGE_FETCHES_INFLIGHT).decrement(1.0);
    }
}

pub struct Fetcher {
    client: HttpClient,
    workspace: HeaderValue,
    max_concurrency: usize,
}

impl Fetcher {
    pub fn new(client: HttpClient, workspace: HeaderValue, max_concurrency: usize) -> Self {
        Self {
            client,
            workspace,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Fetches every planned page with at most `max_concurrency` requests outstanding.
    ///
    /// Pages are dispatched in index order and returned in index order whatever
    /// order they complete in. The first page that fails ends the whole call;
    /// the remaining tasks are aborted when the join set is dropped.
    pub async fn fetch_all(
        &self,
        plan: &PagePlan,
        token: &Token,
    ) -> Result<Vec<PageResult>, PageFetchError> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let headers = data_headers(&self.workspace, token);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let mut join_set = JoinSet::new();
        let mut task_pages: HashMap<tokio::task::Id, u32> = HashMap::new();
        let mut results = Vec::with_capacity(plan.len());

        let mut pending = plan.iter();
        let mut next = pending.next();

        loop {
            tokio::select! {
                // Drain completions first so a failure stops dispatching early
                biased;

                Some(joined) = join_set.join_next_with_id(), if !join_set.is_empty() => {
                    let page: PageResult = match joined {
                        Ok((id, result)) => {
                            task_pages.remove(&id);
                            result?
                        }
                        Err(e) => {
                            let page = task_pages.remove(&e.id()).unwrap_or_default();
                            tracing::error!(page, error = %e, "page task failed");
                            return Err(PageFetchError {
                                page,
                                message: format!("task failed: {e}"),
                            });
                        }
                    };

                    tracing::debug!(page = page.index, records = page.records.len(), "page fetched");
                    shared::counter!(PAGES_FETCHED).increment(1);
                    results.push(page);
                }

                permit = semaphore.clone().acquire_owned(), if next.is_some() => {
                    let Some(page) = next.take() else {
                        continue;
                    };
                    next = pending.next();

                    // The semaphore is never closed
                    let permit = permit.map_err(|e| PageFetchError {
                        page: page.index,
                        message: e.to_string(),
                    })?;

                    let abort_handle = join_set.spawn(fetch_page(
                        self.client.clone(),
                        page.clone(),
                        headers.clone(),
                        InflightGuard::new(permit),
                    ));
                    task_pages.insert(abort_handle.id(), page.index);
                }

                else => break,
            }
        }

        results.sort_unstable_by_key(|page| page.index);
        Ok(results)
    }
}

async fn fetch_page(
    client: HttpClient,
    page: PlannedPage,
    headers: HeaderMap,
    _guard: InflightGuard,
) -> Result<PageResult, PageFetchError> {
    let body = client
        .get(&page.url, &headers)
        .await
        .map_err(|e| PageFetchError {
            page: page.index,
            message: e.to_string(),
        })?;

    let body: PageBody = serde_json::from_value(body).map_err(|e| PageFetchError {
        page: page.index,
        message: format!("response has no data array: {e}"),
    })?;

    Ok(PageResult {
        index: page.index,
        records: body.data,
    })
}
