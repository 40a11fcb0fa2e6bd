use serde::{Deserialize, Serialize};

/// Positional warm-up label of a sample within its backend's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Cold,
    Warm,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Cold => "COLD",
            Phase::Warm => "WARM",
        }
    }
}

/// Raw measurement of one finished request, before it is labeled.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub wall_time_seconds: f64,
    pub time_to_first_token_seconds: Option<f64>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub response_text: String,
}

/// One measured request outcome. Derived fields are computed once in
/// [`MetricSample::new`] and never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(rename = "backend")]
    backend_label: String,
    #[serde(rename = "query")]
    prompt_label: String,
    round: usize,
    phase: Phase,
    #[serde(rename = "time")]
    wall_time_seconds: f64,
    #[serde(rename = "ttft")]
    time_to_first_token_seconds: Option<f64>,
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(rename = "tokens")]
    completion_tokens: u32,
    #[serde(rename = "tps")]
    tokens_per_second: f64,
    #[serde(default)]
    ms_per_token: Option<f64>,
    #[serde(rename = "response")]
    response_text: String,
}

impl MetricSample {
    pub fn new(
        backend_label: impl Into<String>,
        prompt_label: impl Into<String>,
        round: usize,
        phase: Phase,
        m: Measurement,
    ) -> Self {
        let wall = m.wall_time_seconds.max(0.0);
        // TTFT is taken inside the same timed window, clamp against float noise
        let ttft = m.time_to_first_token_seconds.map(|t| t.clamp(0.0, wall));

        Self {
            backend_label: backend_label.into(),
            prompt_label: prompt_label.into(),
            round,
            phase,
            wall_time_seconds: wall,
            time_to_first_token_seconds: ttft,
            prompt_tokens: m.prompt_tokens,
            completion_tokens: m.completion_tokens,
            tokens_per_second: tokens_per_second(m.completion_tokens, wall),
            ms_per_token: ms_per_token(m.completion_tokens, wall),
            response_text: m.response_text,
        }
    }

    pub fn backend_label(&self) -> &str {
        &self.backend_label
    }

    pub fn prompt_label(&self) -> &str {
        &self.prompt_label
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_cold(&self) -> bool {
        self.phase == Phase::Cold
    }

    pub fn wall_time_seconds(&self) -> f64 {
        self.wall_time_seconds
    }

    pub fn time_to_first_token_seconds(&self) -> Option<f64> {
        self.time_to_first_token_seconds
    }

    pub fn prompt_tokens(&self) -> u32 {
        self.prompt_tokens
    }

    pub fn completion_tokens(&self) -> u32 {
        self.completion_tokens
    }

    pub fn tokens_per_second(&self) -> f64 {
        self.tokens_per_second
    }

    pub fn ms_per_token(&self) -> Option<f64> {
        self.ms_per_token
    }

    pub fn response_text(&self) -> &str {
        &self.response_text
    }
}

pub fn tokens_per_second(completion_tokens: u32, wall_time_seconds: f64) -> f64 {
    if wall_time_seconds > 0.0 {
        completion_tokens as f64 / wall_time_seconds
    } else {
        0.0
    }
}

pub fn ms_per_token(completion_tokens: u32, wall_time_seconds: f64) -> Option<f64> {
    if completion_tokens == 0 {
        return None;
    }
    Some(wall_time_seconds * 1000.0 / completion_tokens as f64)
}

/// Completion-token estimate used when a stream never reports usage:
/// roughly four characters per token, never below one.
pub fn estimate_completion_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    (chars / 4).max(1)
}
