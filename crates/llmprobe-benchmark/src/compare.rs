use chrono::{DateTime, Utc};
use llmprobe_core::{AggregateStats, RunRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    AvgTime,
    AvgTtft,
    AvgTokensPerSecond,
}

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::AvgTime => "Avg time (s)",
            Metric::AvgTtft => "Avg TTFT (s)",
            Metric::AvgTokensPerSecond => "Avg tokens/s",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDelta {
    pub baseline: f64,
    pub candidate: f64,
    pub delta: f64,
    pub percent: f64,
}

impl MetricDelta {
    pub fn new(baseline: f64, candidate: f64) -> Self {
        let delta = candidate - baseline;
        let percent = if baseline == 0.0 { 0.0 } else { 100.0 * delta / baseline };
        Self {
            baseline,
            candidate,
            delta,
            percent,
        }
    }
}

/// One metric row; `delta` is `None` when either side lacks warm data.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub metric: Metric,
    pub delta: Option<MetricDelta>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// `ratio` is larger / smaller throughput, absent when the smaller is 0.
    Winner { backend: String, ratio: Option<f64> },
    Identical,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundComparison {
    pub index: usize,
    pub baseline_tps: Option<f64>,
    pub candidate_tps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSide {
    pub backend: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub baseline: RecordSide,
    pub candidate: RecordSide,
    pub metrics: Vec<MetricRow>,
    pub verdict: Verdict,
    pub rounds: Vec<RoundComparison>,
}

/// Compares the warm statistics of two runs. `baseline` is A, `candidate` is B;
/// deltas are B - A.
pub fn compare(baseline: &RunRecord, candidate: &RunRecord) -> ComparisonReport {
    let warm_a = baseline.statistics().warm_requests.as_ref();
    let warm_b = candidate.statistics().warm_requests.as_ref();
    let both = warm_a.zip(warm_b);

    let mut metrics = vec![
        MetricRow {
            metric: Metric::AvgTime,
            delta: both.map(|(a, b)| MetricDelta::new(a.avg_time, b.avg_time)),
        },
        MetricRow {
            metric: Metric::AvgTokensPerSecond,
            delta: both.map(|(a, b)| MetricDelta::new(a.avg_tokens_per_second, b.avg_tokens_per_second)),
        },
    ];

    if let Some((a, b)) = both.and_then(|(a, b)| a.avg_ttft.zip(b.avg_ttft)) {
        metrics.insert(
            1,
            MetricRow {
                metric: Metric::AvgTtft,
                delta: Some(MetricDelta::new(a, b)),
            },
        );
    }

    let verdict = match both {
        Some((a, b)) => verdict(baseline.backend(), a, candidate.backend(), b),
        None => Verdict::Unavailable,
    };

    let len = baseline.results().len().max(candidate.results().len());
    let rounds = (0..len)
        .map(|index| RoundComparison {
            index,
            baseline_tps: baseline.results().get(index).map(|s| s.tokens_per_second()),
            candidate_tps: candidate.results().get(index).map(|s| s.tokens_per_second()),
        })
        .collect();

    ComparisonReport {
        baseline: RecordSide {
            backend: baseline.backend().to_string(),
            timestamp: baseline.timestamp(),
        },
        candidate: RecordSide {
            backend: candidate.backend().to_string(),
            timestamp: candidate.timestamp(),
        },
        metrics,
        verdict,
        rounds,
    }
}

fn verdict(name_a: &str, a: &AggregateStats, name_b: &str, b: &AggregateStats) -> Verdict {
    let (tps_a, tps_b) = (a.avg_tokens_per_second, b.avg_tokens_per_second);

    if tps_a == tps_b {
        return Verdict::Identical;
    }

    let (winner, larger, smaller) = if tps_a > tps_b {
        (name_a, tps_a, tps_b)
    } else {
        (name_b, tps_b, tps_a)
    };

    Verdict::Winner {
        backend: winner.to_string(),
        ratio: (smaller > 0.0).then(|| larger / smaller),
    }
}
