//! Isolates the assistant's answer from a raw model completion.
//!
//! Completions routinely echo the prompt, hallucinate further `User:` turns
//! or leak instruction tokens. [`extract_assistant_answer`] scopes the text
//! down to the first assistant turn and [`clean_answer`] scrubs what is left.

use std::sync::LazyLock;

use regex::Regex;

use crate::prompt::{END_OF_SEQUENCE, INST_CLOSE, INST_OPEN};

const USER_LABEL: &str = "User:";
const ASSISTANT_LABEL: &str = "Assistant:";

/// Earliest match among these ends the extracted answer.
const CUT_MARKERS: [&str; 3] = [INST_OPEN, USER_LABEL, ASSISTANT_LABEL];

/// Never allowed to reach the user.
const STRIPPED_TOKENS: [&str; 3] = [INST_OPEN, INST_CLOSE, END_OF_SEQUENCE];

static LEADING_ASSISTANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Assistant:\s*").expect("valid regex"));
static INLINE_ASSISTANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\nAssistant:\s*").expect("valid regex"));
static DANGLING_PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\n])\n\.").expect("valid regex"));
static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Returns the assistant's answer to `user_message` found in `completion`.
///
/// The echoed prompt is matched literally (`"User: " + user_message`). A
/// paraphrased echo is not recognised and the whole completion is scanned
/// instead. If nothing survives extraction the cleaning pass runs over the
/// full completion. Never fails; the result may be empty.
pub fn extract_assistant_answer(user_message: &str, completion: &str) -> String {
    let echo = format!("User: {user_message}");
    let mut text = match completion.find(&echo) {
        Some(idx) => &completion[idx + echo.len()..],
        None => completion,
    };

    if let Some(idx) = text.find(ASSISTANT_LABEL) {
        text = &text[idx + ASSISTANT_LABEL.len()..];
    }

    let answer = text.trim();
    let cut = CUT_MARKERS
        .iter()
        .filter_map(|marker| answer.find(marker))
        .min()
        .unwrap_or(answer.len());
    let answer = answer[..cut].trim();

    if answer.is_empty() {
        clean_answer(completion.trim())
    } else {
        clean_answer(answer)
    }
}

/// Scrubs turn labels and training artefacts from `raw`.
///
/// Idempotent: the pass is repeated until the text stops changing, so
/// removals that splice a new token together are caught too.
pub fn clean_answer(raw: &str) -> String {
    let mut text = clean_once(raw);
    loop {
        let next = clean_once(&text);
        if next == text {
            return text;
        }
        text = next;
    }
}

fn clean_once(raw: &str) -> String {
    let mut text = raw.to_string();

    for token in STRIPPED_TOKENS {
        text = text.replace(token, "");
    }

    text = LEADING_ASSISTANT.replace(&text, "").into_owned();
    text = INLINE_ASSISTANT.replace_all(&text, "\n").into_owned();

    if let Some(idx) = text.find("\nUser:") {
        text.truncate(idx);
    }

    // ".:" shows up when the model starts a new label right after a sentence
    if let Some(idx) = text.find(".:") {
        text.truncate(idx + 1);
    }

    // a period wrapped onto its own line rejoins the sentence; blank lines stay
    text = DANGLING_PERIOD.replace_all(&text, "${1}.").into_owned();
    text = BLANK_LINE_RUN.replace_all(&text, "\n\n").into_owned();

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_before_hallucinated_user_turn() {
        let completion = "User: Hi\nAssistant: Hello there\nUser: bye";
        assert_eq!(extract_assistant_answer("Hi", completion), "Hello there");
    }

    #[test]
    fn handles_instruction_wrapped_echo() {
        let completion = "[INST]User: Who founded Astarus AI?\nAssistant:[/INST] Rafayel Latif founded it.";
        assert_eq!(
            extract_assistant_answer("Who founded Astarus AI?", completion),
            "Rafayel Latif founded it."
        );
    }

    #[test]
    fn earliest_cut_marker_wins() {
        let completion = "Assistant: first part [INST] second User: third";
        assert_eq!(extract_assistant_answer("unrelated", completion), "first part");

        let completion = "Assistant: first part User: x [INST] y";
        assert_eq!(extract_assistant_answer("unrelated", completion), "first part");
    }

    #[test]
    fn no_markers_falls_through_to_cleaning() {
        let completion = "  Plain answer with no labels.\n\n\n\nSecond paragraph.  ";
        assert_eq!(
            extract_assistant_answer("question", completion),
            "Plain answer with no labels.\n\nSecond paragraph."
        );
    }

    #[test]
    fn paraphrased_echo_is_not_matched() {
        // echo differs in case, so scanning starts from the top of the completion
        let completion = "User: hi\nAssistant: Hey!";
        assert_eq!(extract_assistant_answer("Hi", completion), "Hey!");
    }

    #[test]
    fn empty_extraction_cleans_full_completion() {
        let completion = "User: Hi\nAssistant:   \nUser: follow up";
        let extracted = extract_assistant_answer("Hi", completion);
        assert_eq!(extracted, clean_answer(completion.trim()));
        assert_eq!(extracted, "User: Hi");
    }

    #[test]
    fn completely_empty_completion_yields_empty_string() {
        assert_eq!(extract_assistant_answer("Hi", "   "), "");
        assert_eq!(extract_assistant_answer("Hi", "[INST][/INST]"), "");
    }

    #[test]
    fn clean_strips_labels_and_artifacts() {
        assert_eq!(clean_answer("assistant: Sure thing"), "Sure thing");
        assert_eq!(clean_answer("One\nAssistant: Two"), "One\nTwo");
        assert_eq!(clean_answer("Answer.\nUser: more"), "Answer.");
        assert_eq!(clean_answer("It is London.: Assistant"), "It is London.");
        assert_eq!(clean_answer("Based in London\n."), "Based in London.");
    }

    #[test]
    fn clean_removes_spliced_tokens() {
        let cleaned = clean_answer("[IN[INST]ST]hello[/INST]</s>");
        assert_eq!(cleaned, "hello");
    }

    #[test]
    fn clean_handles_repeated_leading_labels() {
        let once = clean_answer("Assistant: Assistant: hi");
        assert_eq!(once, "hi");
        assert_eq!(clean_answer(&once), once);
    }

    #[test]
    fn newline_runs_collapse_to_two() {
        assert_eq!(clean_answer("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean_answer("a\n\nb"), "a\n\nb");
        assert_eq!(clean_answer("a\nb"), "a\nb");
    }

    #[test]
    fn period_after_blank_line_is_left_alone() {
        assert_eq!(clean_answer("a\n\n.b"), "a\n\n.b");
        assert_eq!(clean_answer("a\n\n\n\n.b"), "a\n\n.b");
        assert_eq!(clean_answer("one\n.\ntwo\n."), "one.\ntwo.");
    }
}
