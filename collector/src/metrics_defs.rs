//! Metrics definitions for the collector.

use shared::metrics_defs::{MetricDef, MetricType};

pub const AGGREGATION_DURATION: MetricDef = MetricDef {
    name: "aggregation.duration",
    metric_type: MetricType::Histogram,
    description: "Time to serve one aggregation request in seconds. Tagged with status.",
};

pub const AGGREGATION_RECORDS: MetricDef = MetricDef {
    name: "aggregation.records",
    metric_type: MetricType::Histogram,
    description: "Number of records returned by a successful aggregation",
};

pub const PAGES_FETCHED: MetricDef = MetricDef {
    name: "pages.fetched",
    metric_type: MetricType::Counter,
    description: "Number of data pages fetched successfully",
};

pub const PAGE_FETCHES_INFLIGHT: MetricDef = MetricDef {
    name: "pages.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of page requests currently holding a concurrency permit",
};

pub const UPSTREAM_RETRIES: MetricDef = MetricDef {
    name: "upstream.retries",
    metric_type: MetricType::Counter,
    description: "Number of outbound requests retried after a failed attempt",
};

pub const ALL_METRICS: &[MetricDef] = &[
    AGGREGATION_DURATION,
    AGGREGATION_RECORDS,
    PAGES_FETCHED,
    PAGE_FETCHES_INFLIGHT,
    UPSTREAM_RETRIES,
];
