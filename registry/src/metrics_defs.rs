//! Metrics definitions for the registry watcher.

use shared::metrics_defs::{MetricDef, MetricType};

pub const HEALTH_INDEX: MetricDef = MetricDef {
    name: "consul.health.index",
    metric_type: MetricType::Gauge,
    description: "Last index observed from the health-state blocking query",
};

pub const WATCH_PUBLISH: MetricDef = MetricDef {
    name: "consul.watch.publish",
    metric_type: MetricType::Counter,
    description: "Number of routing documents published by the watcher",
};

pub const ROUTES_PUBLISHED: MetricDef = MetricDef {
    name: "consul.watch.routes",
    metric_type: MetricType::Gauge,
    description: "Number of route lines in the most recent routing document",
};

pub const ALL_METRICS: &[MetricDef] = &[HEALTH_INDEX, WATCH_PUBLISH, ROUTES_PUBLISHED];
