use std::time::Duration;

use chrono::{DateTime, Utc};
use llmprobe_core::{
    BenchConfig, MetricSample, Phase, ProbeError, Prompt, Result, RunConfiguration, RunRecord,
};
use tracing::{info, warn};

use crate::executor::RequestExecutor;

/// Progress notifications emitted while a run is in flight.
#[derive(Debug)]
pub enum BenchmarkEvent<'a> {
    RoundStarted {
        round: usize,
        total: usize,
        prompt: &'a Prompt,
    },
    SampleRecorded(&'a MetricSample),
    RequestFailed {
        round: usize,
        backend: &'a str,
        error: &'a ProbeError,
    },
}

#[derive(Debug)]
pub struct RequestFailure {
    pub round: usize,
    pub backend: String,
    pub error: ProbeError,
}

/// Everything a run produced, in execution order.
#[derive(Debug, Default)]
pub struct BenchmarkRun {
    pub samples: Vec<MetricSample>,
    pub failures: Vec<RequestFailure>,
    pub rounds: usize,
}

impl BenchmarkRun {
    pub fn samples_for<'a>(&'a self, backend: &'a str) -> impl Iterator<Item = &'a MetricSample> + 'a {
        self.samples.iter().filter(move |s| s.backend_label() == backend)
    }
}

pub struct BenchmarkRunner {
    executors: Vec<RequestExecutor>,
    stream: bool,
    pause: Duration,
    description: String,
    image_url: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl BenchmarkRunner {
    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        config.validate()?;

        let executors = config
            .backends
            .iter()
            .map(|b| RequestExecutor::new(b, &config.request))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            executors,
            stream: config.request.stream,
            pause: Duration::from_millis(config.run.pause_ms),
            description: config.run.description.clone(),
            image_url: config.image_url.clone(),
            max_tokens: config.request.max_tokens,
            temperature: config.request.temperature,
        })
    }

    pub fn executors(&self) -> &[RequestExecutor] {
        &self.executors
    }

    /// Runs `repeat_count` rounds. Each round sends the round's prompt to
    /// every backend in configuration order, one request at a time.
    /// Failed requests are recorded and skipped.
    pub async fn run<F>(&self, prompts: &[Prompt], repeat_count: usize, mut on_event: F) -> Result<BenchmarkRun>
    where
        F: FnMut(BenchmarkEvent<'_>),
    {
        if prompts.is_empty() {
            return Err(ProbeError::Config("No prompts to run".into()));
        }
        if repeat_count == 0 {
            return Err(ProbeError::Config("repeat_count must be greater than 0".into()));
        }

        info!(
            backends = self.executors.len(),
            rounds = repeat_count,
            stream = self.stream,
            "Starting benchmark"
        );

        let mut run = BenchmarkRun {
            rounds: repeat_count,
            ..Default::default()
        };
        let mut recorded = vec![0usize; self.executors.len()];
        let mut first_request = true;

        for round in 0..repeat_count {
            let prompt = &prompts[round % prompts.len()];
            on_event(BenchmarkEvent::RoundStarted {
                round,
                total: repeat_count,
                prompt,
            });

            for (idx, exec) in self.executors.iter().enumerate() {
                if !first_request && !self.pause.is_zero() {
                    tokio::time::sleep(self.pause).await;
                }
                first_request = false;

                match exec.execute(&prompt.messages, self.stream).await {
                    Ok(m) => {
                        let phase = if recorded[idx] == 0 { Phase::Cold } else { Phase::Warm };
                        recorded[idx] += 1;
                        let sample = MetricSample::new(exec.name(), &prompt.label, round, phase, m);
                        on_event(BenchmarkEvent::SampleRecorded(&sample));
                        run.samples.push(sample);
                    }
                    Err(e) => {
                        warn!(round = round + 1, backend = exec.name(), error = %e, "Request failed");
                        on_event(BenchmarkEvent::RequestFailed {
                            round,
                            backend: exec.name(),
                            error: &e,
                        });
                        run.failures.push(RequestFailure {
                            round,
                            backend: exec.name().to_string(),
                            error: e,
                        });
                    }
                }
            }
        }

        info!(
            samples = run.samples.len(),
            failures = run.failures.len(),
            "Benchmark complete"
        );
        Ok(run)
    }

    /// One record per backend that produced at least one sample.
    pub fn records(&self, run: &BenchmarkRun, timestamp: DateTime<Utc>) -> Result<Vec<RunRecord>> {
        let mut records = Vec::new();

        for exec in &self.executors {
            let results: Vec<MetricSample> = run.samples_for(exec.name()).cloned().collect();
            if results.is_empty() {
                warn!(backend = exec.name(), "No samples recorded, skipping record");
                continue;
            }

            let configuration = RunConfiguration {
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                stream: self.stream,
                num_requests: run.rounds,
                description: self.description.clone(),
                image_url: self.image_url.clone(),
            };

            records.push(RunRecord::new(
                timestamp,
                exec.name(),
                exec.model(),
                exec.chat_url(),
                configuration,
                results,
            )?);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmprobe_core::{BackendConfig, RequestConfig, RunConfig};
    use serde_json::json;

    fn config(backends: Vec<BackendConfig>) -> BenchConfig {
        BenchConfig {
            backends,
            request: RequestConfig {
                max_tokens: 32,
                temperature: 0.0,
                stream: false,
                timeout_secs: 5,
            },
            run: RunConfig {
                repeat_count: 3,
                pause_ms: 0,
                preview_chars: 100,
                description: "unit".to_string(),
            },
            ..Default::default()
        }
    }

    fn backend(name: &str, endpoint: &str) -> BackendConfig {
        BackendConfig {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            model: "qwen3".to_string(),
        }
    }

    fn prompts() -> Vec<Prompt> {
        vec![
            Prompt::from_parts(Some("Be brief."), "first", None),
            Prompt::from_parts(Some("Be brief."), "second", None),
        ]
    }

    async fn ok_server(hits: usize) -> (mockito::ServerGuard, mockito::Mock) {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{"message": {"content": "ok"}}],
                    "usage": {"prompt_tokens": 5, "completion_tokens": 10, "total_tokens": 15}
                })
                .to_string(),
            )
            .expect(hits)
            .create_async()
            .await;
        (server, mock)
    }

    #[tokio::test]
    async fn test_rounds_rotate_prompts_and_label_phases() {
        let (server, mock) = ok_server(3).await;
        let runner = BenchmarkRunner::from_config(&config(vec![backend("vllm", &server.url())])).unwrap();

        let mut rounds_seen = Vec::new();
        let run = runner
            .run(&prompts(), 3, |event| {
                if let BenchmarkEvent::RoundStarted { round, .. } = event {
                    rounds_seen.push(round);
                }
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rounds_seen, vec![0, 1, 2]);
        assert!(run.failures.is_empty());

        let labels: Vec<&str> = run.samples.iter().map(|s| s.prompt_label()).collect();
        assert_eq!(labels, vec!["first", "second", "first"]);

        let phases: Vec<Phase> = run.samples.iter().map(|s| s.phase()).collect();
        assert_eq!(phases, vec![Phase::Cold, Phase::Warm, Phase::Warm]);
    }

    #[tokio::test]
    async fn test_failed_backend_is_skipped_not_fatal() {
        let (server, _mock) = ok_server(2).await;
        let runner = BenchmarkRunner::from_config(&config(vec![
            backend("down", "http://127.0.0.1:1"),
            backend("up", &server.url()),
        ]))
        .unwrap();

        let mut failures = 0;
        let run = runner
            .run(&prompts(), 2, |event| {
                if matches!(event, BenchmarkEvent::RequestFailed { .. }) {
                    failures += 1;
                }
            })
            .await
            .unwrap();

        assert_eq!(failures, 2);
        assert_eq!(run.failures.len(), 2);
        assert!(run.failures.iter().all(|f| f.backend == "down"));
        assert_eq!(run.samples_for("down").count(), 0);
        assert_eq!(run.samples_for("up").count(), 2);

        let records = runner.records(&run, Utc::now()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].backend(), "up");
        assert_eq!(records[0].configuration().num_requests, 2);
        assert_eq!(records[0].configuration().description, "unit");
        assert!(records[0].results()[0].is_cold());
    }

    #[tokio::test]
    async fn test_single_round_has_no_warm_stats() {
        let (server, _mock) = ok_server(1).await;
        let runner = BenchmarkRunner::from_config(&config(vec![backend("vllm", &server.url())])).unwrap();
        let run = runner.run(&prompts(), 1, |_| {}).await.unwrap();

        let records = runner.records(&run, Utc::now()).unwrap();
        let stats = records[0].statistics();
        assert_eq!(stats.all_requests.count, 1);
        assert!(stats.warm_requests.is_none());
    }

    #[test]
    fn test_from_config_rejects_bad_endpoint() {
        let result = BenchmarkRunner::from_config(&config(vec![backend("x", "localhost:8000")]));
        assert!(matches!(result, Err(ProbeError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_empty_prompts_rejected() {
        let runner = BenchmarkRunner::from_config(&config(vec![backend("x", "http://127.0.0.1:1")])).unwrap();
        assert!(runner.run(&[], 1, |_| {}).await.is_err());
    }
}
