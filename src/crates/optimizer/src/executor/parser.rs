//! LLM Response Parser
//!
//! Helpers that pull structure out of free-form agent output: embedded JSON,
//! the quality score from an evaluation, and the optimized prompt text from a
//! design response.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// Score used when an evaluation does not contain a recognizable number.
pub const DEFAULT_QUALITY_SCORE: u8 = 75;

const PROMPT_MARKERS: [&str; 3] = ["optimized prompt", "improved prompt", "refined prompt"];
const EXPLANATION_MARKERS: [&str; 3] = ["explanation", "improvements", "key changes"];

fn fenced_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\n?(.*?)\n?```").expect("valid fenced block regex")
    })
}

fn score_regexes() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?:total|overall|final|quality)\s*(?:score)?[:\s]+(\d+)",
            r"(\d+)\s*/\s*100",
            r"score[:\s]+(\d+)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid score regex"))
        .collect()
    })
}

/// Extract a JSON value from an agent response
///
/// Accepts raw JSON, fenced code blocks (```json or bare ```), or the
/// outermost `{...}` span inside surrounding prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    for cap in fenced_block_regex().captures_iter(trimmed) {
        if let Some(body) = cap.get(1) {
            if let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim()) {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("No parseable JSON object in response: {}", e);
            None
        }
    }
}

/// Extract a 0-100 quality score from evaluation text
pub fn extract_score(text: &str) -> u8 {
    let lower = text.to_lowercase();

    for re in score_regexes() {
        if let Some(score) = re
            .captures(&lower)
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        {
            return score.min(100) as u8;
        }
    }

    DEFAULT_QUALITY_SCORE
}

/// Extract the optimized prompt from designer output
///
/// Collects the lines following an "optimized/improved/refined prompt"
/// marker until a heading, a code fence, or an explanation section. Falls
/// back to the first substantial paragraph, then to the first 500
/// characters.
pub fn extract_optimized_prompt(design_output: &str) -> String {
    let mut in_prompt = false;
    let mut prompt_lines: Vec<&str> = Vec::new();

    for line in design_output.lines() {
        let lower = line.to_lowercase();
        let trimmed = line.trim();

        if !in_prompt {
            if PROMPT_MARKERS.iter().any(|m| lower.contains(m)) {
                in_prompt = true;
                // "**Optimized Prompt:** text" keeps the inline text
                if let Some((_, rest)) = trimmed.split_once(':') {
                    let rest = rest.trim().trim_start_matches('*').trim();
                    if !rest.is_empty() {
                        prompt_lines.push(rest);
                    }
                }
            }
            continue;
        }

        if trimmed.starts_with('#') || trimmed.starts_with("```") {
            if !prompt_lines.is_empty() {
                break;
            }
            continue;
        }

        if EXPLANATION_MARKERS.iter().any(|m| lower.contains(m)) {
            break;
        }

        if !trimmed.is_empty() {
            prompt_lines.push(line);
        }
    }

    if !prompt_lines.is_empty() {
        return prompt_lines.join("\n").trim().to_string();
    }

    if let Some(paragraph) = design_output
        .split("\n\n")
        .map(str::trim)
        .find(|p| p.chars().count() > 50)
    {
        return paragraph.to_string();
    }

    design_output.chars().take(500).collect()
}
