//! Metric extraction from simulator output.

use arcstr::ArcStr;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

lazy_static! {
    static ref METRIC_RE: Regex = Regex::new(
        r"\b([A-Z][A-Z0-9_]*)\s*:\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)"
    )
    .unwrap();
}

/// Extracts every `NAME: value` pair from simulator output.
///
/// Names are upper-case identifiers. A name printed more than once keeps
/// its first position and its last value.
pub fn extract_metrics(stdout: &str) -> IndexMap<ArcStr, f64> {
    let mut metrics = IndexMap::new();
    for caps in METRIC_RE.captures_iter(stdout) {
        match caps[2].parse::<f64>() {
            Ok(value) => {
                metrics.insert(ArcStr::from(&caps[1]), value);
            }
            Err(err) => tracing::warn!(line = &caps[0], ?err, "could not parse metric value"),
        }
    }
    metrics
}

/// Extracts metrics, keeping only those named in `keywords` unless it is empty.
///
/// Fails with [`Error::NoMetrics`] only if the output contains no metrics at all;
/// output with metrics that are all filtered out yields an empty map.
pub fn parse_metrics<S: AsRef<str>>(stdout: &str, keywords: &[S]) -> Result<IndexMap<ArcStr, f64>> {
    let mut metrics = extract_metrics(stdout);
    if metrics.is_empty() {
        return Err(Error::NoMetrics {
            stdout: stdout.into(),
        });
    }
    if !keywords.is_empty() {
        metrics.retain(|name, _| keywords.iter().any(|k| k.as_ref() == name.as_str()));
    }
    Ok(metrics)
}
