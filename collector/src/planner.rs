//! Page-count discovery and page URL construction.

use crate::config::UpstreamConfig;
use crate::errors::PlanningError;
use crate::filters::FilterPayload;
use crate::http_client::HttpClient;
use crate::token::{Token, data_headers};
use reqwest::header::HeaderValue;
use serde::Deserialize;
use url::Url;

/// One page to fetch, addressed by its 1-based index.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedPage {
    pub index: u32,
    pub url: Url,
}

/// Ordered page requests for one aggregation, indices `1..=N`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PagePlan {
    pages: Vec<PlannedPage>,
}

impl PagePlan {
    /// Plans `max(0, reported_pages - deduction)` pages.
    pub fn build(base: &Url, filters: &FilterPayload, reported_pages: u32, deduction: u32) -> Self {
        let count = reported_pages.saturating_sub(deduction);
        let pages = (1..=count)
            .map(|index| PlannedPage {
                index,
                url: page_url(base, filters, index),
            })
            .collect();

        PagePlan { pages }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlannedPage> {
        self.pages.iter()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// `<base>?page=<n>&<filters>`, keeping any query already present on `base`.
///
/// Spaces in filter values are sent as `%20`, not `+`.
pub fn page_url(base: &Url, filters: &FilterPayload, page: u32) -> Url {
    let mut pairs = url::form_urlencoded::Serializer::new(String::new());
    pairs.append_pair("page", &page.to_string());
    for (key, value) in filters.iter() {
        pairs.append_pair(key, &value.to_string());
    }
    // A literal '+' is already escaped as %2B, so every remaining '+' is a space
    let appended = pairs.finish().replace('+', "%20");

    let query = match base.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{appended}"),
        _ => appended,
    };

    let mut url = base.clone();
    url.set_query(Some(&query));
    url
}

#[derive(Deserialize)]
struct PageCount {
    pages: serde_json::Number,
}

pub struct Planner<'a> {
    client: &'a HttpClient,
    upstream: &'a UpstreamConfig,
    workspace: &'a HeaderValue,
}

impl<'a> Planner<'a> {
    pub fn new(
        client: &'a HttpClient,
        upstream: &'a UpstreamConfig,
        workspace: &'a HeaderValue,
    ) -> Self {
        Self {
            client,
            upstream,
            workspace,
        }
    }

    /// Probes page 1 for the total page count and plans the page requests.
    ///
    /// The probe's own records are not kept; page 1 is part of the plan like
    /// every other page.
    pub async fn plan(
        &self,
        filters: &FilterPayload,
        token: &Token,
    ) -> Result<PagePlan, PlanningError> {
        let probe_url = page_url(&self.upstream.url, filters, 1);
        let headers = data_headers(self.workspace, token);

        let body = self.client.get(&probe_url, &headers).await?;
        let reported_pages = parse_page_count(body)?;

        let plan = PagePlan::build(
            &self.upstream.url,
            filters,
            reported_pages,
            self.upstream.page_deduction,
        );

        tracing::info!(
            reported_pages,
            deduction = self.upstream.page_deduction,
            planned_pages = plan.len(),
            "planned page requests"
        );

        Ok(plan)
    }
}

/// Reads the `pages` field of the probe response.
///
/// Negative counts mean "nothing to fetch" and become 0. Integral floats such
/// as `3.0` count as integers. A missing, non-numeric or fractional field, or a
/// count beyond `u32`, is an error.
fn parse_page_count(body: serde_json::Value) -> Result<u32, PlanningError> {
    let PageCount { pages } = serde_json::from_value(body)
        .map_err(|e| PlanningError::MissingPageCount(e.to_string()))?;

    let out_of_range =
        || PlanningError::MissingPageCount(format!("page count {pages} is out of range"));

    if let Some(count) = pages.as_i64() {
        return u32::try_from(count.max(0)).map_err(|_| out_of_range());
    }
    if pages.is_u64() {
        return Err(out_of_range());
    }

    match pages.as_f64() {
        Some(count) if count.fract() != 0.0 => Err(PlanningError::MissingPageCount(format!(
            "page count {pages} is not an integer"
        ))),
        Some(count) if count < 0.0 => Ok(0),
        Some(count) if count <= f64::from(u32::MAX) => Ok(count as u32),
        _ => Err(out_of_range()),
    }
}
