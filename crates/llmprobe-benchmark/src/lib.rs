pub mod compare;
pub mod executor;
pub mod log_analysis;
pub mod prompts;
pub mod report;
pub mod runner;
pub mod store;
pub mod stream;
mod wire;

pub use compare::{compare, ComparisonReport, Metric, MetricDelta, MetricRow, RoundComparison, Verdict};
pub use executor::{normalize_base, RequestExecutor};
pub use log_analysis::{parse_line, LogEntry, LogSummary, SeriesStats};
pub use prompts::{prompt_set, PROMPT_SETS};
pub use report::{
    render_comparison, render_log_entry, render_log_summary, render_record, render_sample,
    render_statistics, ReportOptions,
};
pub use runner::{BenchmarkEvent, BenchmarkRun, BenchmarkRunner, RequestFailure};
pub use store::{default_root, ResultStore};
pub use stream::StreamAccumulator;
pub use wire::Usage;
