//! Turning free text into question/answer pairs for LUT training.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Only this much of the source text is sent to the model.
pub const MAX_SOURCE_CHARS: usize = 2000;
const MIN_FIELD_CHARS: usize = 5;
const MAX_FALLBACK_PAIRS: usize = 10;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\n?").expect("valid regex"));
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid regex"));
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n+").expect("valid regex"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid regex"));
static MARKDOWN_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,3}\s+(.+)$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { question: question.into(), answer: answer.into() }
    }
}

/// Instruction asking the model for a JSON array of Q&A pairs about `text`.
pub fn qa_extraction_prompt(text: &str) -> String {
    let source: String = text.chars().take(MAX_SOURCE_CHARS).collect();
    format!(
        "Extract 8-12 key question-answer pairs from this text. Return ONLY a JSON array, no other text. \
         Format: [{{\"question\":\"...\",\"answer\":\"...\"}}]\n\nText:\n{source}\n\nJSON:"
    )
}

/// Parses the model's reply, falling back to a heuristic over `source_text`
/// when the reply holds no usable pairs.
pub fn parse_qa_pairs(completion: &str, source_text: &str) -> Vec<QaPair> {
    let pairs = parse_json_pairs(completion);
    if pairs.is_empty() {
        debug!("No usable Q&A JSON in completion, using heuristic extraction");
        return heuristic_pairs(source_text);
    }
    pairs
}

/// Tries each top-level `[...]` span in turn. The completion may echo the
/// prompt, whose instruction tokens and format example come first.
fn parse_json_pairs(completion: &str) -> Vec<QaPair> {
    let cleaned = CODE_FENCE.replace_all(completion, "");
    let mut rest: &str = &cleaned;
    while let Some((start, end)) = balanced_array(rest) {
        let pairs = pairs_from_array(&rest[start..end]);
        if !pairs.is_empty() {
            return pairs;
        }
        rest = &rest[end..];
    }
    Vec::new()
}

fn pairs_from_array(array: &str) -> Vec<QaPair> {
    let items = match serde_json::from_str::<Vec<Value>>(array) {
        Ok(items) => items,
        Err(_) => {
            let flattened = CONTROL_CHARS
                .replace_all(array, "")
                .replace("\r\n", " ")
                .replace(['\r', '\n', '\t'], " ");
            match serde_json::from_str::<Vec<Value>>(&flattened) {
                Ok(items) => items,
                Err(e) => {
                    debug!("Skipping unparseable array in completion: {e}");
                    return Vec::new();
                }
            }
        }
    };

    items
        .iter()
        .map(|item| {
            QaPair::new(
                field(item, &["question", "q"]),
                field(item, &["answer", "a"]),
            )
        })
        .filter(|qa| {
            qa.question.chars().count() > MIN_FIELD_CHARS
                && qa.answer.chars().count() > MIN_FIELD_CHARS
        })
        .collect()
}

/// Byte range of the first top-level `[...]` span. Brackets inside strings
/// are not special.
fn balanced_array(text: &str) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '[' => {
                if depth == 0 {
                    start = idx;
                }
                depth += 1;
            }
            ']' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, idx + 1));
                }
            }
            _ => {}
        }
    }
    None
}

fn field(item: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Builds pairs from the opening sentence of each long paragraph and from
/// markdown headers.
fn heuristic_pairs(text: &str) -> Vec<QaPair> {
    let paragraphs: Vec<&str> = PARAGRAPH_BREAK
        .split(text)
        .filter(|p| p.trim().chars().count() > 50)
        .collect();

    let mut pairs = Vec::new();

    for paragraph in &paragraphs {
        let Some(main) = SENTENCE_END
            .split(paragraph)
            .find(|s| s.trim().chars().count() > 20)
            .map(str::trim)
        else {
            continue;
        };
        let len = main.chars().count();
        if len > 30 && len < 200 {
            let key_terms = main
                .split_whitespace()
                .filter(|w| w.chars().count() > 4)
                .take(3)
                .collect::<Vec<_>>()
                .join(" ");
            pairs.push(QaPair::new(format!("What is {key_terms}?"), main));
        }
    }

    for (idx, caps) in MARKDOWN_HEADER.captures_iter(text).enumerate() {
        let header = caps[1].trim();
        let len = header.chars().count();
        if len <= 5 || len >= 100 {
            continue;
        }
        let next = paragraphs.get(idx).or_else(|| paragraphs.first()).copied().unwrap_or("");
        if next.chars().count() > 20 {
            let answer: String = next.chars().take(200).collect();
            pairs.push(QaPair::new(format!("Tell me about {header}"), answer.trim()));
        }
    }

    pairs.truncate(MAX_FALLBACK_PAIRS);
    pairs
}
