//! Server-sent-event accumulation for streamed chat completions.
//!
//! The accumulator is fed one line at a time together with the time elapsed
//! since the request was sent, so timing is decided by the caller and the
//! parsing can be driven from tests without a network.

use std::time::Duration;

use llmprobe_core::{estimate_completion_tokens, Measurement};
use tracing::debug;

use crate::wire::{StreamChunk, Usage};

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    first_token_at: Option<Duration>,
    usage: Option<Usage>,
    done: bool,
    skipped: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line of the response body. Lines that are not `data:`
    /// records are ignored; unparseable payloads are skipped.
    pub fn push_line(&mut self, line: &str, elapsed: Duration) {
        if self.done {
            return;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = payload.trim();

        if payload == DONE_MARKER {
            self.done = true;
            return;
        }

        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, "Skipping malformed stream chunk");
                return;
            }
        };

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let content = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .unwrap_or_default();

        if content.is_empty() {
            return;
        }

        if self.first_token_at.is_none() && !content.trim().is_empty() {
            self.first_token_at = Some(elapsed);
        }
        self.text.push_str(&content);
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Closes the stream at `wall` and produces the measurement.
    pub fn finish(self, wall: Duration) -> Measurement {
        let reported = self.usage.map(|u| u.completion_tokens).unwrap_or(0);

        let completion_tokens = match self.usage {
            Some(_) if reported > 0 || self.text.is_empty() => reported,
            _ => {
                debug!(
                    chars = self.text.chars().count(),
                    "No usage reported, estimating completion tokens"
                );
                estimate_completion_tokens(&self.text)
            }
        };

        Measurement {
            wall_time_seconds: wall.as_secs_f64(),
            time_to_first_token_seconds: self.first_token_at.map(|d| d.as_secs_f64()),
            prompt_tokens: self.usage.map(|u| u.prompt_tokens).unwrap_or(0),
            completion_tokens,
            response_text: self.text,
        }
    }
}

/// Splits a growing byte buffer into complete lines, leaving any partial
/// trailing line in place for the next network read.
pub(crate) fn drain_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn delta(content: &str) -> String {
        format!(
            r#"data: {{"choices":[{{"index":0,"delta":{{"content":{}}}}}]}}"#,
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn test_ttft_is_first_non_whitespace_delta() {
        let mut acc = StreamAccumulator::new();
        acc.push_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#, ms(100));
        acc.push_line(&delta(" "), ms(200));
        acc.push_line(&delta("Hello"), ms(300));
        acc.push_line(&delta(" world"), ms(900));
        acc.push_line("data: [DONE]", ms(1900));

        let m = acc.finish(ms(2000));
        assert_eq!(m.time_to_first_token_seconds, Some(0.3));
        assert_eq!(m.wall_time_seconds, 2.0);
        assert_eq!(m.response_text, " Hello world");
    }

    #[test]
    fn test_usage_chunk_overrides_estimate() {
        let mut acc = StreamAccumulator::new();
        acc.push_line(&delta("abcdefghijkl"), ms(10));
        acc.push_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":1500,"completion_tokens":42,"total_tokens":1542}}"#,
            ms(20),
        );
        acc.push_line("data: [DONE]", ms(30));

        let m = acc.finish(ms(30));
        assert_eq!(m.completion_tokens, 42);
        assert_eq!(m.prompt_tokens, 1500);
    }

    #[test]
    fn test_missing_usage_estimates_from_length() {
        let mut acc = StreamAccumulator::new();
        acc.push_line(&delta(&"x".repeat(37)), ms(10));
        let m = acc.finish(ms(20));
        assert_eq!(m.completion_tokens, 9);
        assert_eq!(m.prompt_tokens, 0);
    }

    #[test]
    fn test_empty_stream_without_usage_counts_one_token() {
        let mut acc = StreamAccumulator::new();
        acc.push_line("data: [DONE]", ms(10));
        let m = acc.finish(ms(10));
        assert_eq!(m.completion_tokens, 1);
        assert_eq!(m.time_to_first_token_seconds, None);
    }

    #[test]
    fn test_malformed_chunks_are_skipped() {
        let mut acc = StreamAccumulator::new();
        acc.push_line("data: {not json", ms(1));
        acc.push_line(r#"data: {"choices": "wrong shape"}"#, ms(2));
        acc.push_line(": keep-alive comment", ms(3));
        acc.push_line("", ms(4));
        acc.push_line(&delta("ok"), ms(5));

        assert_eq!(acc.skipped(), 2);
        assert_eq!(acc.text(), "ok");
    }

    #[test]
    fn test_lines_after_done_are_ignored() {
        let mut acc = StreamAccumulator::new();
        acc.push_line(&delta("a"), ms(1));
        acc.push_line("data: [DONE]", ms(2));
        acc.push_line(&delta("b"), ms(3));
        assert!(acc.is_done());
        assert_eq!(acc.text(), "a");
    }

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut buf = b"data: one\r\ndata: tw".to_vec();
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["data: one\r".to_string()]);
        assert_eq!(buf, b"data: tw".to_vec());

        buf.extend_from_slice(b"o\n\n");
        assert_eq!(drain_lines(&mut buf), vec!["data: two".to_string(), String::new()]);
        assert!(buf.is_empty());
    }
}
