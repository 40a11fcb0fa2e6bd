pub mod chat;
pub mod config;
pub mod error;
pub mod metrics;
pub mod record;
pub mod sample;

pub use chat::{ChatMessage, ContentPart, ImageUrl, MessageContent, Prompt, Role};
pub use config::{slug, BackendConfig, BenchConfig, PromptConfig, RequestConfig, RunConfig};
pub use error::{ProbeError, Result};
pub use metrics::{aggregate, by_backend, summarize, AggregateStats, Statistics};
pub use record::{RunConfiguration, RunRecord};
pub use sample::{estimate_completion_tokens, Measurement, MetricSample, Phase};
