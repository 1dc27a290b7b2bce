use lut_chat::extract::{clean_answer, extract_assistant_answer};
use lut_chat::prompt::{PromptFormatter, END_OF_SEQUENCE, INST_CLOSE, INST_OPEN};

const SAMPLES: &[&str] = &[
    "User: Hi\nAssistant: Hello there\nUser: bye",
    "[INST]User: Who are you?\nAssistant:[/INST] I am Astara.</s>",
    "Assistant: one\n\n\n\ntwo\nAssistant: three",
    "  [/INST][INST]  stray tokens </s> around text  ",
    "No labels at all.\n\n\n\n\nJust text.",
    "Answer.: trailing junk\nUser: next",
    "[IN[INST]ST]spliced[/IN[/INST]ST]",
    "",
];

#[test]
fn hallucinated_user_turn_is_cut() {
    let completion = "User: Hi\nAssistant: Hello there\nUser: bye";
    assert_eq!(extract_assistant_answer("Hi", completion), "Hello there");
}

#[test]
fn completion_without_markers_goes_through_cleaning() {
    let completion = "The office is in London.\n\n\n\nCome visit.";
    assert_eq!(
        extract_assistant_answer("Where are you?", completion),
        clean_answer(completion)
    );
}

#[test]
fn whitespace_only_answer_falls_back_to_raw_completion() {
    let completion = "Assistant:    ";
    let answer = extract_assistant_answer("Hi", completion);
    assert_eq!(answer, clean_answer(completion.trim()));
}

#[test]
fn prompt_echo_from_formatter_is_removed() {
    let prompt = PromptFormatter::plain().format("What does Astarus build?");
    let completion = format!("{prompt} Lookup-table language models.");
    assert_eq!(
        extract_assistant_answer("What does Astarus build?", &completion),
        "Lookup-table language models."
    );
}

#[test]
fn cleaning_is_idempotent() {
    for sample in SAMPLES {
        let once = clean_answer(sample);
        assert_eq!(clean_answer(&once), once, "input: {sample:?}");

        let extracted = extract_assistant_answer("Hi", sample);
        assert_eq!(clean_answer(&extracted), extracted, "input: {sample:?}");
    }
}

#[test]
fn long_newline_runs_become_exactly_two() {
    for run in 3..8 {
        let input = format!("first{}second", "\n".repeat(run));
        assert_eq!(clean_answer(&input), "first\n\nsecond");
    }
    assert_eq!(clean_answer("first\nsecond"), "first\nsecond");
    assert_eq!(clean_answer("first\n\nsecond"), "first\n\nsecond");
}

#[test]
fn delimiter_tokens_never_survive() {
    for sample in SAMPLES {
        for output in [clean_answer(sample), extract_assistant_answer("Hi", sample)] {
            for token in [INST_OPEN, INST_CLOSE, END_OF_SEQUENCE] {
                assert!(!output.contains(token), "{token} left in {output:?}");
            }
        }
    }
}
