//! Built-in prompt sets. Round `i` of a run uses entry `i % len`.

use llmprobe_core::{ProbeError, Prompt, Result};

pub const PROMPT_SETS: &[&str] = &["default", "short", "vision"];

const TOPIC_SYSTEM: &[&str] = &[
    "You are an expert educator teaching advanced physics. Give a thorough account of quantum \
     entanglement: the EPR paper of 1935, what it means for two particles to share one quantum \
     state, Bell's theorem and its experimental tests, why measurement correlations do not allow \
     faster-than-light signalling, how entangled pairs are produced in the lab, and the role of \
     entanglement in quantum computing, cryptography and teleportation.",
    "You are a molecular biologist explaining genome editing. Cover how CRISPR was discovered as a \
     bacterial immune system, how Cas9 is guided by RNA to a target sequence, the repair pathways \
     that follow a double-strand break, base and prime editing, delivery methods, off-target \
     effects, current clinical applications and the ethical debate around germline editing.",
    "You are a machine learning researcher explaining the Transformer architecture. Describe \
     scaled dot-product self-attention, multi-head attention, positional encodings, the encoder and \
     decoder stacks with residual connections and layer normalization, autoregressive decoding, \
     training with teacher forcing and learning rate warmup, and what is known about the patterns \
     individual attention heads learn.",
];

const TOPIC_QUERIES: &[&str] = &[
    "Summarize quantum entanglement in 10-15 words.",
    "Explain CRISPR gene editing briefly in 10-15 words.",
    "Describe Transformer architecture concisely in 10-15 words.",
];

const SHORT_SYSTEM: &str = "You are a concise assistant. Answer in one sentence.";

const SHORT_QUERIES: &[&str] = &[
    "What is the capital of France?",
    "Why is the sky blue?",
    "What does a compiler do?",
];

const VISION_SYSTEM: &str = "You are an expert computer vision analyst. Consider scene \
     composition, the objects present and their positions, colors and lighting, any people and \
     what they are doing, and any visible text before you answer.";

const VISION_QUERIES: &[&str] = &[
    "Describe the main subject in this image in 10-15 words.",
    "What is the setting or location shown in 10-15 words?",
    "List the key objects you can identify in 10-15 words.",
];

/// Resolves a named prompt set. `vision` requires an image URL; the other
/// sets attach it when one is given.
pub fn prompt_set(name: &str, image_url: Option<&str>) -> Result<Vec<Prompt>> {
    let prompts = match name {
        "default" => TOPIC_SYSTEM
            .iter()
            .zip(TOPIC_QUERIES)
            .map(|(system, user)| Prompt::from_parts(Some(*system), user, image_url))
            .collect(),
        "short" => SHORT_QUERIES
            .iter()
            .map(|user| Prompt::from_parts(Some(SHORT_SYSTEM), user, image_url))
            .collect(),
        "vision" => {
            let url = image_url.ok_or_else(|| {
                ProbeError::Config("Prompt set 'vision' needs an image URL".into())
            })?;
            VISION_QUERIES
                .iter()
                .map(|user| Prompt::from_parts(Some(VISION_SYSTEM), user, Some(url)))
                .collect()
        }
        other => {
            return Err(ProbeError::Config(format!(
                "Unknown prompt set '{}' (expected one of: {})",
                other,
                PROMPT_SETS.join(", ")
            )))
        }
    };
    Ok(prompts)
}
