use serde::{Deserialize, Serialize};

use crate::MetricSample;

/// Summary over a group of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub count: usize,
    pub avg_time: f64,
    /// Mean over the samples that measured TTFT; `None` when none did.
    pub avg_ttft: Option<f64>,
    pub avg_tokens_per_second: f64,
}

/// All-requests and warm-only aggregates for one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub all_requests: AggregateStats,
    /// `None` when the run holds only the cold sample.
    pub warm_requests: Option<AggregateStats>,
}

/// Reduces a subset of samples. Returns `None` for an empty subset.
pub fn aggregate(samples: &[MetricSample]) -> Option<AggregateStats> {
    if samples.is_empty() {
        return None;
    }

    let n = samples.len() as f64;
    let avg_time = samples.iter().map(|s| s.wall_time_seconds()).sum::<f64>() / n;
    let avg_tokens_per_second = samples.iter().map(|s| s.tokens_per_second()).sum::<f64>() / n;

    let ttfts: Vec<f64> = samples
        .iter()
        .filter_map(|s| s.time_to_first_token_seconds())
        .collect();
    let avg_ttft = if ttfts.is_empty() {
        None
    } else {
        Some(ttfts.iter().sum::<f64>() / ttfts.len() as f64)
    };

    Some(AggregateStats {
        count: samples.len(),
        avg_time,
        avg_ttft,
        avg_tokens_per_second,
    })
}

/// All vs warm statistics. The first sample is the cold start, so the warm
/// subset is `samples[1..]`.
pub fn summarize(samples: &[MetricSample]) -> Option<Statistics> {
    let all_requests = aggregate(samples)?;
    let warm_requests = aggregate(&samples[1..]);
    Some(Statistics {
        all_requests,
        warm_requests,
    })
}

/// Splits an interleaved run into per-backend sequences, keeping first-seen
/// backend order and execution order within each backend.
pub fn by_backend(samples: &[MetricSample]) -> Vec<(String, Vec<MetricSample>)> {
    let mut groups: Vec<(String, Vec<MetricSample>)> = Vec::new();
    for sample in samples {
        match groups.iter_mut().find(|(name, _)| name == sample.backend_label()) {
            Some((_, group)) => group.push(sample.clone()),
            None => groups.push((sample.backend_label().to_string(), vec![sample.clone()])),
        }
    }
    groups
}
