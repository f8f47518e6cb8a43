//! Common types for metrics definitions.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricType::Counter => "Counter",
            MetricType::Gauge => "Gauge",
            MetricType::Histogram => "Histogram",
        })
    }
}

/// One metric a crate can emit, declared as a const in its `metrics_defs`
/// module and collected into that crate's `ALL_METRICS` table.
#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

/// Column header matching [`MetricDef::markdown_row`] output.
pub const MARKDOWN_TABLE_HEADER: &str =
    "| Metric | Type | Description |\n|--------|------|-------------|";

impl MetricDef {
    pub fn markdown_row(&self) -> String {
        format!(
            "| `{}` | {} | {} |",
            self.name, self.metric_type, self.description
        )
    }
}
