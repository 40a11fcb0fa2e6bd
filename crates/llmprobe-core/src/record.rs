use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{summarize, Statistics};
use crate::{MetricSample, ProbeError, Result};

/// Request settings captured alongside a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
    pub num_requests: usize,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A finished benchmark session for a single backend.
///
/// `statistics` is derived from `results` on construction and on load; the
/// persisted copy is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RunRecordFile")]
pub struct RunRecord {
    timestamp: DateTime<Utc>,
    backend: String,
    model: String,
    endpoint: String,
    configuration: RunConfiguration,
    results: Vec<MetricSample>,
    statistics: Statistics,
}

/// On-disk shape, validated into a [`RunRecord`].
#[derive(Deserialize)]
struct RunRecordFile {
    timestamp: DateTime<Utc>,
    backend: String,
    model: String,
    endpoint: String,
    configuration: RunConfiguration,
    results: Vec<MetricSample>,
}

impl TryFrom<RunRecordFile> for RunRecord {
    type Error = ProbeError;

    fn try_from(f: RunRecordFile) -> Result<Self> {
        RunRecord::new(f.timestamp, f.backend, f.model, f.endpoint, f.configuration, f.results)
    }
}

impl RunRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        backend: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
        configuration: RunConfiguration,
        results: Vec<MetricSample>,
    ) -> Result<Self> {
        let backend = backend.into();

        if let Some(stray) = results.iter().find(|s| s.backend_label() != backend) {
            return Err(ProbeError::Config(format!(
                "Sample from backend '{}' in record for '{}'",
                stray.backend_label(),
                backend
            )));
        }

        let statistics = summarize(&results).ok_or_else(|| {
            ProbeError::Config(format!("Run record for '{}' has no samples", backend))
        })?;

        Ok(Self {
            timestamp,
            backend,
            model: model.into(),
            endpoint: endpoint.into(),
            configuration,
            results,
            statistics,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn configuration(&self) -> &RunConfiguration {
        &self.configuration
    }

    pub fn results(&self) -> &[MetricSample] {
        &self.results
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Measurement, Phase};

    fn config() -> RunConfiguration {
        RunConfiguration {
            max_tokens: 64,
            temperature: 0.7,
            stream: true,
            num_requests: 2,
            description: "test".to_string(),
            image_url: None,
        }
    }

    fn sample(backend: &str, round: usize, tokens: u32) -> MetricSample {
        MetricSample::new(
            backend,
            "q",
            round,
            if round == 0 { Phase::Cold } else { Phase::Warm },
            Measurement {
                wall_time_seconds: 1.0,
                time_to_first_token_seconds: Some(0.1),
                prompt_tokens: 3,
                completion_tokens: tokens,
                response_text: "ok".to_string(),
            },
        )
    }

    #[test]
    fn test_empty_record_rejected() {
        let err = RunRecord::new(Utc::now(), "vllm", "m", "http://x", config(), vec![]);
        assert!(matches!(err, Err(ProbeError::Config(_))));
    }

    #[test]
    fn test_foreign_sample_rejected() {
        let err = RunRecord::new(
            Utc::now(),
            "vllm",
            "m",
            "http://x",
            config(),
            vec![sample("vllm", 0, 1), sample("sglang", 1, 1)],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_statistics_recomputed_on_load() {
        let record = RunRecord::new(
            Utc::now(),
            "vllm",
            "m",
            "http://x",
            config(),
            vec![sample("vllm", 0, 10), sample("vllm", 1, 30)],
        )
        .unwrap();

        let mut value = serde_json::to_value(&record).unwrap();
        value["statistics"]["all_requests"]["avg_tokens_per_second"] = serde_json::json!(9999.0);

        let loaded: RunRecord = serde_json::from_value(value).unwrap();
        assert_eq!(loaded.statistics().all_requests.avg_tokens_per_second, 20.0);
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_single_sample_warm_serializes_null() {
        let record = RunRecord::new(
            Utc::now(),
            "vllm",
            "m",
            "http://x",
            config(),
            vec![sample("vllm", 0, 10)],
        )
        .unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["statistics"]["warm_requests"].is_null());
    }
}
