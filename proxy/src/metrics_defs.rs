//! Metrics definitions for the dispatch engine.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS_DURATION: MetricDef = MetricDef {
    name: "requests.duration",
    metric_type: MetricType::Histogram,
    description: "Time to serve one request in seconds",
};

pub const TARGET_DURATION: MetricDef = MetricDef {
    name: "target.duration",
    metric_type: MetricType::Histogram,
    description: "Time to serve one request in seconds, labelled by target service",
};

pub const REQUESTS_NOROUTE: MetricDef = MetricDef {
    name: "requests.noroute",
    metric_type: MetricType::Counter,
    description: "Requests for which no route matched",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUESTS_DURATION, TARGET_DURATION, REQUESTS_NOROUTE];
