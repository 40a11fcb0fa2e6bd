//! Metric extraction from inference server logs.
//!
//! Each extractor is an independent regex plus a setter, so a single line
//! can contribute any number of fields.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Fields scraped from one log line. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEntry {
    pub timestamp: Option<String>,
    pub request_id: Option<String>,
    pub ttft_ms: Option<f64>,
    pub total_time_ms: Option<f64>,
    pub prompt_tokens: Option<u64>,
    pub generation_tokens: Option<u64>,
    pub avg_prompt_throughput: Option<f64>,
    pub avg_generation_throughput: Option<f64>,
    pub cache_hit_rate: Option<f64>,
    pub running_requests: Option<u64>,
    pub waiting_requests: Option<u64>,
}

impl LogEntry {
    /// Lines worth echoing while a log is being read.
    pub fn is_notable(&self) -> bool {
        self.ttft_ms.is_some() || self.avg_prompt_throughput.is_some()
    }
}

type Apply = fn(&Captures<'_>, &mut LogEntry);

struct Extractor {
    name: &'static str,
    re: Regex,
    apply: Apply,
}

const PATTERNS: &[(&str, &str, Apply)] = &[
    ("timestamp", r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})", |c, e| {
        e.timestamp = Some(c[1].to_string());
    }),
    ("request_id", r"(?i)request_id[=:]?\s*([a-f0-9-]+)", |c, e| {
        e.request_id = Some(c[1].to_string());
    }),
    (
        "ttft",
        r"(?i)time[_\s]to[_\s]first[_\s]token[:\s=]+([0-9.]+)\s*(ms|s)?",
        |c, e| e.ttft_ms = millis(c),
    ),
    ("total_time", r"(?i)total[_\s]time[:\s=]+([0-9.]+)\s*(ms|s)?", |c, e| {
        e.total_time_ms = millis(c);
    }),
    ("prompt_tokens", r"(?i)prompt[_\s]tokens?[:\s=]+(\d+)", |c, e| {
        e.prompt_tokens = c[1].parse().ok();
    }),
    (
        "generation_tokens",
        r"(?i)(?:generation|generated|output)[_\s]tokens?[:\s=]+(\d+)",
        |c, e| e.generation_tokens = c[1].parse().ok(),
    ),
    (
        "avg_prompt_throughput",
        r"Avg prompt throughput:\s*([0-9.]+)\s*tokens/s",
        |c, e| e.avg_prompt_throughput = c[1].parse().ok(),
    ),
    (
        "avg_generation_throughput",
        r"Avg generation throughput:\s*([0-9.]+)\s*tokens/s",
        |c, e| e.avg_generation_throughput = c[1].parse().ok(),
    ),
    ("cache_hit_rate", r"Prefix cache hit rate:\s*([0-9.]+)%", |c, e| {
        e.cache_hit_rate = c[1].parse().ok();
    }),
    ("running", r"Running:\s*(\d+)\s*reqs", |c, e| {
        e.running_requests = c[1].parse().ok();
    }),
    ("waiting", r"Waiting:\s*(\d+)\s*reqs", |c, e| {
        e.waiting_requests = c[1].parse().ok();
    }),
];

fn millis(c: &Captures<'_>) -> Option<f64> {
    let value: f64 = c[1].parse().ok()?;
    match c.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(unit) if unit == "s" => Some(value * 1000.0),
        _ => Some(value),
    }
}

fn extractors() -> &'static [Extractor] {
    static EXTRACTORS: OnceLock<Vec<Extractor>> = OnceLock::new();
    EXTRACTORS.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|(name, pattern, apply)| match Regex::new(pattern) {
                Ok(re) => Some(Extractor {
                    name: *name,
                    re,
                    apply: *apply,
                }),
                Err(e) => {
                    tracing::error!(extractor = name, error = %e, "Invalid log pattern");
                    None
                }
            })
            .collect()
    })
}

/// Runs every extractor over `line`. Returns `None` when nothing matched.
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let mut entry = LogEntry::default();
    let mut matched = false;

    for ex in extractors() {
        if let Some(caps) = ex.re.captures(line) {
            (ex.apply)(&caps, &mut entry);
            matched = true;
            tracing::trace!(extractor = ex.name, "Matched");
        }
    }

    matched.then_some(entry)
}

/// min / max / mean / median of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// Upper median: element `len / 2` of the sorted series.
    pub median: f64,
    pub count: usize,
    pub total: f64,
}

impl SeriesStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let total: f64 = sorted.iter().sum();
        Some(Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            avg: total / sorted.len() as f64,
            median: sorted[sorted.len() / 2],
            count: sorted.len(),
            total,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSummary {
    pub entries: usize,
    pub ttft_ms: Option<SeriesStats>,
    pub total_time_ms: Option<SeriesStats>,
    pub prompt_tokens: Option<SeriesStats>,
    pub generation_tokens: Option<SeriesStats>,
    pub prompt_throughput: Option<SeriesStats>,
    pub generation_throughput: Option<SeriesStats>,
    pub cache_hit_rate: Option<SeriesStats>,
    pub latest_cache_hit_rate: Option<f64>,
}

impl LogSummary {
    pub fn from_entries(entries: &[LogEntry]) -> Self {
        let series = |f: fn(&LogEntry) -> Option<f64>| {
            let values: Vec<f64> = entries.iter().filter_map(f).collect();
            SeriesStats::from_values(&values)
        };

        Self {
            entries: entries.len(),
            ttft_ms: series(|e| e.ttft_ms),
            total_time_ms: series(|e| e.total_time_ms),
            prompt_tokens: series(|e| e.prompt_tokens.map(|v| v as f64)),
            generation_tokens: series(|e| e.generation_tokens.map(|v| v as f64)),
            prompt_throughput: series(|e| e.avg_prompt_throughput),
            generation_throughput: series(|e| e.avg_generation_throughput),
            cache_hit_rate: series(|e| e.cache_hit_rate),
            latest_cache_hit_rate: entries.iter().rev().find_map(|e| e.cache_hit_rate),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(extractors().len(), PATTERNS.len());
    }

    #[test]
    fn test_engine_stats_line_yields_several_fields() {
        let line = "INFO 2025-01-15 10:23:45 metrics.py:351] Avg prompt throughput: 1523.4 tokens/s, \
                    Avg generation throughput: 87.2 tokens/s, Running: 3 reqs, Swapped: 0 reqs, \
                    Waiting: 1 reqs, GPU KV cache usage: 12.5%, Prefix cache hit rate: 45.3%";
        let e = parse_line(line).unwrap();

        assert_eq!(e.timestamp.as_deref(), Some("2025-01-15 10:23:45"));
        assert_eq!(e.avg_prompt_throughput, Some(1523.4));
        assert_eq!(e.avg_generation_throughput, Some(87.2));
        assert_eq!(e.running_requests, Some(3));
        assert_eq!(e.waiting_requests, Some(1));
        assert_eq!(e.cache_hit_rate, Some(45.3));
        assert!(e.is_notable());
    }

    #[test]
    fn test_seconds_normalized_to_ms() {
        let e = parse_line("request_id=ab12-cd34 time_to_first_token: 0.25s total_time=1.5 s").unwrap();
        assert_eq!(e.request_id.as_deref(), Some("ab12-cd34"));
        assert_eq!(e.ttft_ms, Some(250.0));
        assert_eq!(e.total_time_ms, Some(1500.0));

        let e = parse_line("Time to first token = 120ms").unwrap();
        assert_eq!(e.ttft_ms, Some(120.0));

        let e = parse_line("total time: 900").unwrap();
        assert_eq!(e.total_time_ms, Some(900.0));
    }

    #[test]
    fn test_token_counts() {
        let e = parse_line("Finished: prompt_tokens=512 output_tokens: 128").unwrap();
        assert_eq!(e.prompt_tokens, Some(512));
        assert_eq!(e.generation_tokens, Some(128));
        assert!(!e.is_notable());
    }

    #[test]
    fn test_unrelated_line_yields_nothing() {
        assert_eq!(parse_line("Loading safetensors checkpoint shards"), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn test_summary_uses_upper_median() {
        let entries: Vec<LogEntry> = [40.0, 10.0, 30.0, 20.0]
            .iter()
            .map(|v| LogEntry {
                ttft_ms: Some(*v),
                ..Default::default()
            })
            .collect();
        let summary = LogSummary::from_entries(&entries);
        let ttft = summary.ttft_ms.unwrap();

        assert_eq!(ttft.min, 10.0);
        assert_eq!(ttft.max, 40.0);
        assert_eq!(ttft.avg, 25.0);
        assert_eq!(ttft.median, 30.0);
        assert_eq!(ttft.count, 4);
        assert!(summary.total_time_ms.is_none());
    }

    #[test]
    fn test_summary_totals_and_latest_cache_rate() {
        let entries = vec![
            LogEntry {
                prompt_tokens: Some(100),
                cache_hit_rate: Some(10.0),
                ..Default::default()
            },
            LogEntry {
                prompt_tokens: Some(300),
                ..Default::default()
            },
            LogEntry {
                cache_hit_rate: Some(55.5),
                ..Default::default()
            },
        ];
        let summary = LogSummary::from_entries(&entries);
        assert_eq!(summary.prompt_tokens.unwrap().total, 400.0);
        assert_eq!(summary.latest_cache_hit_rate, Some(55.5));
        assert_eq!(summary.entries, 3);
    }
}
