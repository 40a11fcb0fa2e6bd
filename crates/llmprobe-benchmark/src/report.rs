//! Plain-text rendering of samples, records, comparisons and log summaries.
//!
//! Every function here is pure: the same input always renders the same text.

use std::fmt::{self, Write};

use llmprobe_core::{AggregateStats, MetricSample, RunRecord, Statistics};

use crate::compare::{ComparisonReport, Metric, Verdict};
use crate::log_analysis::{LogEntry, LogSummary, SeriesStats};

const WIDTH: usize = 80;

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Response preview length in characters; 0 hides the preview.
    pub preview_chars: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { preview_chars: 100 }
    }
}

/// Single-line response preview. Newlines are collapsed and the text is cut
/// at `max_chars` characters with a trailing `...`.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let flat = flat.trim();

    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat.to_string(),
    }
}

fn secs(v: Option<f64>, precision: usize) -> String {
    match v {
        Some(v) => format!("{:.*}s", precision, v),
        None => "n/a".to_string(),
    }
}

pub fn render_sample(sample: &MetricSample, opts: &ReportOptions) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_sample(&mut out, sample, opts);
    out
}

fn write_sample(out: &mut impl Write, s: &MetricSample, opts: &ReportOptions) -> fmt::Result {
    let ms_per_token = s
        .ms_per_token()
        .map(|v| format!("{:.1} ms/tok", v))
        .unwrap_or_else(|| "n/a ms/tok".to_string());

    writeln!(
        out,
        "  [{}] Round {} {}: {} | TTFT {} | {:.2} tok/s | {} tokens | {}",
        s.backend_label(),
        s.round() + 1,
        s.phase().label(),
        secs(Some(s.wall_time_seconds()), 2),
        secs(s.time_to_first_token_seconds(), 3),
        s.tokens_per_second(),
        s.completion_tokens(),
        ms_per_token,
    )?;

    if opts.preview_chars > 0 && !s.response_text().trim().is_empty() {
        writeln!(out, "      > {}", preview(s.response_text(), opts.preview_chars))?;
    }
    Ok(())
}

pub fn render_statistics(backend: &str, stats: &Statistics) -> String {
    let mut out = String::new();
    let _ = write_statistics(&mut out, backend, stats);
    out
}

fn write_aggregate(out: &mut impl Write, title: &str, agg: Option<&AggregateStats>) -> fmt::Result {
    let Some(agg) = agg else {
        return writeln!(out, "  {}: unavailable", title);
    };
    writeln!(out, "  {} ({} requests):", title, agg.count)?;
    writeln!(out, "    Avg time:      {:.2}s", agg.avg_time)?;
    writeln!(out, "    Avg TTFT:      {}", secs(agg.avg_ttft, 3))?;
    writeln!(out, "    Avg tokens/s:  {:.2}", agg.avg_tokens_per_second)
}

fn write_statistics(out: &mut impl Write, backend: &str, stats: &Statistics) -> fmt::Result {
    writeln!(out, "{}:", backend)?;
    write_aggregate(out, "All requests", Some(&stats.all_requests))?;
    write_aggregate(out, "Warm requests", stats.warm_requests.as_ref())
}

/// Full report of one saved run: header, every sample, then statistics.
pub fn render_record(record: &RunRecord, opts: &ReportOptions) -> String {
    let mut out = String::new();
    let _ = write_record(&mut out, record, opts);
    out
}

fn write_record(out: &mut impl Write, record: &RunRecord, opts: &ReportOptions) -> fmt::Result {
    let cfg = record.configuration();

    writeln!(out, "{:=<WIDTH$}", "")?;
    writeln!(out, "{} ({})", record.backend(), record.model())?;
    writeln!(out, "{:=<WIDTH$}", "")?;
    writeln!(out, "  Endpoint:     {}", record.endpoint())?;
    writeln!(out, "  Timestamp:    {}", record.timestamp().to_rfc3339())?;
    writeln!(
        out,
        "  Settings:     max_tokens={} temperature={} stream={} requests={}",
        cfg.max_tokens, cfg.temperature, cfg.stream, cfg.num_requests
    )?;
    if !cfg.description.is_empty() {
        writeln!(out, "  Description:  {}", cfg.description)?;
    }
    if let Some(url) = &cfg.image_url {
        writeln!(out, "  Image:        {}", preview(url, 60))?;
    }

    writeln!(out)?;
    for sample in record.results() {
        write_sample(out, sample, opts)?;
    }

    writeln!(out)?;
    writeln!(out, "{:-<WIDTH$}", "")?;
    write_statistics(out, record.backend(), record.statistics())
}

pub fn render_comparison(report: &ComparisonReport) -> String {
    let mut out = String::new();
    let _ = write_comparison(&mut out, report);
    out
}

fn write_comparison(out: &mut impl Write, report: &ComparisonReport) -> fmt::Result {
    let (a, b) = (&report.baseline, &report.candidate);

    writeln!(out, "{:=<WIDTH$}", "")?;
    writeln!(out, "COMPARISON (warm requests)")?;
    writeln!(out, "{:=<WIDTH$}", "")?;
    writeln!(out, "  A: {} ({})", a.backend, a.timestamp.to_rfc3339())?;
    writeln!(out, "  B: {} ({})", b.backend, b.timestamp.to_rfc3339())?;
    writeln!(out)?;
    writeln!(
        out,
        "  {:<16} {:>14} {:>14} {:>22}",
        "Metric", "A", "B", "Diff (B - A)"
    )?;
    writeln!(out, "  {:-<69}", "")?;

    for row in &report.metrics {
        let precision = match row.metric {
            Metric::AvgTokensPerSecond => 2,
            Metric::AvgTime => 2,
            Metric::AvgTtft => 3,
        };
        match &row.delta {
            Some(d) => writeln!(
                out,
                "  {:<16} {:>14.p$} {:>14.p$} {:>22}",
                row.metric.label(),
                d.baseline,
                d.candidate,
                format!("{:+.p$} ({:+.1}%)", d.delta, d.percent, p = precision),
                p = precision
            )?,
            None => writeln!(
                out,
                "  {:<16} {:>14} {:>14} {:>22}",
                row.metric.label(),
                "unavailable",
                "unavailable",
                "-"
            )?,
        }
    }

    writeln!(out)?;
    match &report.verdict {
        Verdict::Winner {
            backend,
            ratio: Some(ratio),
        } => writeln!(out, "  {} is {:.2}x faster (warm tokens/s)", backend, ratio)?,
        Verdict::Winner {
            backend,
            ratio: None,
        } => writeln!(out, "  {} is faster (the other backend produced 0 tokens/s)", backend)?,
        Verdict::Identical => writeln!(out, "  Both backends have identical warm throughput")?,
        Verdict::Unavailable => writeln!(
            out,
            "  Verdict unavailable: both runs need at least 2 samples for warm statistics"
        )?,
    }

    if report.rounds.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "  Per request tokens/s:")?;
    for round in &report.rounds {
        let fmt_tps = |v: Option<f64>| match v {
            Some(v) => format!("{:.2}", v),
            None => "unavailable".to_string(),
        };
        let tag = if round.index == 0 { " (cold)" } else { "" };
        writeln!(
            out,
            "    #{:<3} A {:>12}   B {:>12}{}",
            round.index + 1,
            fmt_tps(round.baseline_tps),
            fmt_tps(round.candidate_tps),
            tag
        )?;
    }
    Ok(())
}

/// Echo line for a log entry carrying TTFT or throughput.
pub fn render_log_entry(entry: &LogEntry) -> String {
    let mut parts = vec![format!("[{}]", entry.timestamp.as_deref().unwrap_or("N/A"))];
    if let Some(ttft) = entry.ttft_ms {
        parts.push(format!("TTFT: {:.1}ms", ttft));
    }
    if let Some(tps) = entry.avg_prompt_throughput {
        parts.push(format!(
            "Throughput: {:.0} t/s (prompt), {:.1} t/s (gen)",
            tps,
            entry.avg_generation_throughput.unwrap_or(0.0)
        ));
    }
    if let Some(rate) = entry.cache_hit_rate {
        parts.push(format!("Cache: {:.1}%", rate));
    }
    parts.join(" ")
}

pub fn render_log_summary(summary: &LogSummary) -> String {
    let mut out = String::new();
    let _ = write_log_summary(&mut out, summary);
    out
}

fn write_series(out: &mut impl Write, title: &str, stats: &SeriesStats, unit: &str, tokens: bool) -> fmt::Result {
    writeln!(out, "\n{}:", title)?;
    if tokens {
        writeln!(out, "  Min:    {:.0}", stats.min)?;
        writeln!(out, "  Max:    {:.0}", stats.max)?;
        writeln!(out, "  Avg:    {:.1}", stats.avg)?;
        writeln!(out, "  Total:  {:.0}", stats.total)
    } else {
        writeln!(out, "  Min:    {:.2}{}", stats.min, unit)?;
        writeln!(out, "  Max:    {:.2}{}", stats.max, unit)?;
        writeln!(out, "  Avg:    {:.2}{}", stats.avg, unit)?;
        writeln!(out, "  Median: {:.2}{}", stats.median, unit)?;
        writeln!(out, "  Count:  {}", stats.count)
    }
}

fn write_log_summary(out: &mut impl Write, summary: &LogSummary) -> fmt::Result {
    if summary.is_empty() {
        return writeln!(out, "No metrics found in logs.");
    }

    writeln!(out, "{:=<WIDTH$}", "")?;
    writeln!(out, "PERFORMANCE ANALYSIS ({} matching lines)", summary.entries)?;
    writeln!(out, "{:=<WIDTH$}", "")?;

    let series = [
        ("Time to First Token (TTFT)", &summary.ttft_ms, " ms", false),
        ("Total Request Time", &summary.total_time_ms, " ms", false),
        ("Prompt Tokens", &summary.prompt_tokens, "", true),
        ("Generation Tokens", &summary.generation_tokens, "", true),
        ("Prompt Throughput", &summary.prompt_throughput, " tokens/s", false),
        ("Generation Throughput", &summary.generation_throughput, " tokens/s", false),
        ("Prefix Cache Hit Rate", &summary.cache_hit_rate, "%", false),
    ];
    for (title, stats, unit, tokens) in series {
        if let Some(stats) = stats {
            write_series(out, title, stats, unit, tokens)?;
        }
    }

    if let Some(latest) = summary.latest_cache_hit_rate {
        writeln!(out, "  Latest: {:.1}%", latest)?;
    }
    writeln!(out, "\n{:=<WIDTH$}", "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::compare;
    use chrono::{TimeZone, Utc};
    use llmprobe_core::{Measurement, Phase, RunConfiguration};

    fn sample(round: usize, tokens: u32, ttft: Option<f64>, text: &str) -> MetricSample {
        MetricSample::new(
            "vllm",
            "q",
            round,
            if round == 0 { Phase::Cold } else { Phase::Warm },
            Measurement {
                wall_time_seconds: 2.0,
                time_to_first_token_seconds: ttft,
                prompt_tokens: 20,
                completion_tokens: tokens,
                response_text: text.to_string(),
            },
        )
    }

    fn record(samples: Vec<MetricSample>) -> RunRecord {
        let n = samples.len();
        RunRecord::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
            "vllm",
            "qwen3",
            "http://localhost:8083/v1/chat/completions",
            RunConfiguration {
                max_tokens: 50,
                temperature: 0.7,
                stream: true,
                num_requests: n,
                description: "baseline".to_string(),
                image_url: None,
            },
            samples,
        )
        .unwrap()
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview("line one\nline two", 100), "line one line two");
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview(&"a".repeat(10), 10), "a".repeat(10));
    }

    #[test]
    fn test_sample_line() {
        let s = sample(1, 50, Some(0.3), "Quantum entanglement links particles.");
        let line = render_sample(&s, &ReportOptions::default());
        assert!(line.contains("Round 2 WARM"));
        assert!(line.contains("2.00s"));
        assert!(line.contains("TTFT 0.300s"));
        assert!(line.contains("25.00 tok/s"));
        assert!(line.contains("50 tokens"));
        assert!(line.contains("40.0 ms/tok"));
        assert!(line.contains("> Quantum entanglement"));
    }

    #[test]
    fn test_sample_without_ttft_or_tokens() {
        let s = sample(0, 0, None, "");
        let line = render_sample(&s, &ReportOptions { preview_chars: 0 });
        assert!(line.contains("COLD"));
        assert!(line.contains("TTFT n/a"));
        assert!(line.contains("n/a ms/tok"));
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn test_single_sample_warm_unavailable() {
        let r = record(vec![sample(0, 10, None, "x")]);
        let text = render_record(&r, &ReportOptions::default());
        assert!(text.contains("All requests (1 requests):"));
        assert!(text.contains("Warm requests: unavailable"));
        assert!(text.contains("Description:  baseline"));
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let r = record(vec![sample(0, 10, Some(0.9), "a"), sample(1, 50, Some(0.3), "b")]);
        let opts = ReportOptions::default();
        assert_eq!(render_record(&r, &opts), render_record(&r, &opts));

        let report = compare(&r, &r);
        assert_eq!(render_comparison(&report), render_comparison(&report));
    }

    #[test]
    fn test_comparison_table() {
        let a = record(vec![sample(0, 100, None, "a"), sample(1, 200, None, "a")]);
        let b = record(vec![sample(0, 100, None, "b"), sample(1, 300, None, "b")]);
        let text = render_comparison(&compare(&a, &b));

        assert!(text.contains("+50.0%"));
        assert!(text.contains("1.50x faster"));
        assert!(text.contains("(cold)"));
    }

    #[test]
    fn test_comparison_unavailable() {
        let a = record(vec![sample(0, 100, None, "a")]);
        let b = record(vec![sample(0, 100, None, "b"), sample(1, 300, None, "b")]);
        let text = render_comparison(&compare(&a, &b));
        assert!(text.contains("Verdict unavailable"));
        assert!(text.contains("unavailable"));
    }

    #[test]
    fn test_log_summary() {
        assert_eq!(render_log_summary(&LogSummary::default()), "No metrics found in logs.\n");

        let entries = vec![
            LogEntry {
                ttft_ms: Some(120.0),
                prompt_tokens: Some(10),
                ..Default::default()
            },
            LogEntry {
                ttft_ms: Some(80.0),
                prompt_tokens: Some(30),
                cache_hit_rate: Some(42.0),
                ..Default::default()
            },
        ];
        let text = render_log_summary(&LogSummary::from_entries(&entries));
        assert!(text.contains("Median: 120.00 ms"));
        assert!(text.contains("Total:  40"));
        assert!(text.contains("Latest: 42.0%"));
    }

    #[test]
    fn test_log_entry_echo() {
        let entry = LogEntry {
            timestamp: Some("2025-01-15 10:23:45".to_string()),
            avg_prompt_throughput: Some(1523.4),
            avg_generation_throughput: Some(87.2),
            ..Default::default()
        };
        assert_eq!(
            render_log_entry(&entry),
            "[2025-01-15 10:23:45] Throughput: 1523 t/s (prompt), 87.2 t/s (gen)"
        );
    }
}
