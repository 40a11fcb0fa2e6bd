use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ProbeError, Prompt, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub prompts: Vec<PromptConfig>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub endpoint: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
    pub timeout_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
            stream: true,
            timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub repeat_count: usize,
    pub pause_ms: u64,
    pub preview_chars: usize,
    pub description: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            repeat_count: 3,
            pause_ms: 1000,
            preview_chars: 100,
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    pub user: String,
}

impl PromptConfig {
    pub fn to_prompt(&self, image_url: Option<&str>) -> Prompt {
        let mut prompt = Prompt::from_parts(self.system.as_deref(), &self.user, image_url);
        if let Some(label) = &self.label {
            prompt.label = label.clone();
        }
        prompt
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: BenchConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Structural checks; endpoint URLs are parsed when executors are built.
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(ProbeError::Config("No backends configured".into()));
        }
        if let Some(b) = self.backends.iter().find(|b| b.name.trim().is_empty()) {
            return Err(ProbeError::Config(format!(
                "Backend with endpoint {} has an empty name",
                b.endpoint
            )));
        }
        for (i, a) in self.backends.iter().enumerate() {
            if let Some(b) = self.backends[i + 1..].iter().find(|b| slug(&b.name) == slug(&a.name)) {
                return Err(ProbeError::Config(if a.name == b.name {
                    format!("Duplicate backend name: {}", a.name)
                } else {
                    format!(
                        "Backend names '{}' and '{}' share the result file name '{}'",
                        a.name,
                        b.name,
                        slug(&a.name)
                    )
                }));
            }
        }
        if self.request.max_tokens == 0 {
            return Err(ProbeError::Config("max_tokens must be greater than 0".into()));
        }
        if self.run.repeat_count == 0 {
            return Err(ProbeError::Config("repeat_count must be greater than 0".into()));
        }
        if self.prompts.iter().any(|p| p.user.trim().is_empty()) {
            return Err(ProbeError::Config("Prompt user text must not be empty".into()));
        }
        Ok(())
    }

    pub fn build_prompts(&self) -> Vec<Prompt> {
        self.prompts
            .iter()
            .map(|p| p.to_prompt(self.image_url.as_deref()))
            .collect()
    }
}

/// File-name form of a backend name: lowercased, with every
/// non-alphanumeric character replaced by `-`.
pub fn slug(backend: &str) -> String {
    backend
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}
