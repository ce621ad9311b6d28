use crate::fetcher::PageResult;
use serde::Serialize;
use serde_json::Value;

/// Every record of every page, in page order then in-page order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregateResult(Vec<Value>);

impl AggregateResult {
    pub fn into_records(self) -> Vec<Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn aggregate(mut pages: Vec<PageResult>) -> AggregateResult {
    // Stable, so pages already in order keep their relative order untouched
    pages.sort_by_key(|page| page.index);
    AggregateResult(pages.into_iter().flat_map(|page| page.records).collect())
}
