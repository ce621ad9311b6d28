//! Token → plan → fetch → aggregate, for one caller request.

use crate::aggregate::{AggregateResult, aggregate};
use crate::config::{Config, ValidationError};
use crate::errors::{CollectorError, Result};
use crate::fetcher::Fetcher;
use crate::filters::FilterPayload;
use crate::http_client::HttpClient;
use crate::planner::Planner;
use crate::token::TokenProvider;
use reqwest::header::HeaderValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct Collector {
    config: Arc<Config>,
    workspace: HeaderValue,
}

impl Collector {
    pub fn new(config: Arc<Config>) -> Result<Self, ValidationError> {
        config.validate()?;
        let workspace = config.upstream.workspace_header()?;
        Ok(Self { config, workspace })
    }

    /// Runs one aggregation, bounded by the configured deadline if any.
    ///
    /// Dropping the returned future cancels every outstanding request.
    pub async fn collect(&self, filters: &FilterPayload) -> Result<AggregateResult> {
        match self.config.aggregation_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.run(filters))
                .await
                .map_err(|_| CollectorError::Timeout(limit))?,
            None => self.run(filters).await,
        }
    }

    async fn run(&self, filters: &FilterPayload) -> Result<AggregateResult> {
        // Fresh client per aggregation: no connections are kept between requests
        let client = HttpClient::new(&self.config.retry)?;
        let upstream = &self.config.upstream;

        tracing::info!("requesting token");
        let token = TokenProvider::new(&client, &self.config.auth)
            .fetch_token()
            .await?;

        tracing::info!("probing page count");
        let probe_started = Instant::now();
        let plan = Planner::new(&client, upstream, &self.workspace)
            .plan(filters, &token)
            .await?;

        let estimate =
            estimate_fetch_duration(probe_started.elapsed(), plan.len(), upstream.max_concurrency);
        tracing::info!(
            pages = plan.len(),
            max_concurrency = upstream.max_concurrency,
            estimated_secs = estimate.as_secs(),
            "fetching pages"
        );

        let pages = Fetcher::new(client, self.workspace.clone(), upstream.max_concurrency)
            .fetch_all(&plan, &token)
            .await?;

        let result = aggregate(pages);
        tracing::info!(records = result.len(), "collection finished");

        Ok(result)
    }
}

/// Rough wall time of the fetch phase, assuming every page takes as long as the probe.
pub fn estimate_fetch_duration(
    probe_latency: Duration,
    pages: usize,
    max_concurrency: usize,
) -> Duration {
    let rounds = pages.div_ceil(max_concurrency.max(1));
    probe_latency.saturating_mul(u32::try_from(rounds).unwrap_or(u32::MAX))
}
