//! Prompt formatting for the instruction-tuned model behind the LUT service.

pub const INST_OPEN: &str = "[INST]";
pub const INST_CLOSE: &str = "[/INST]";
pub const END_OF_SEQUENCE: &str = "</s>";

/// Persona used for space-scoped chat and Q&A generation.
pub const ASTARA_PREAMBLE: &str = "You are Astara, a friendly conversational AI assistant running on a \
     LUT-augmented Mistral model created by Astarus AI. \
     You are an expert on Astarus AI and have been fine-tuned on information on it. \
     Astarus AI is an AI startup which focuses on building continuously trainable LLMs through LUT (look up table) based LLMs. \
     You answer like a chat, not like an email. \
     Be concise and informal. \
     If the user just greets you or says thanks, reply briefly and naturally.";

/// Wraps user text into the exact format the model was trained on.
///
/// Without a preamble the message goes into a turn-labelled scaffold:
/// `[INST]User: <msg>\nAssistant:[/INST]`. With one, the preamble is
/// prepended and the scaffold is dropped: `[INST] <preamble>\n\n<msg> [/INST]`.
#[derive(Debug, Clone, Default)]
pub struct PromptFormatter {
    preamble: Option<String>,
}

impl PromptFormatter {
    pub fn plain() -> Self {
        Self { preamble: None }
    }

    pub fn with_preamble(preamble: impl Into<String>) -> Self {
        let preamble = preamble.into();
        let preamble = preamble.trim();
        Self {
            preamble: (!preamble.is_empty()).then(|| preamble.to_string()),
        }
    }

    pub fn preamble(&self) -> Option<&str> {
        self.preamble.as_deref()
    }

    /// Callers reject empty input before formatting; this never fails.
    pub fn format(&self, user_message: &str) -> String {
        let user_message = user_message.trim();
        match &self.preamble {
            Some(preamble) => {
                format!("{INST_OPEN} {preamble}\n\n{user_message} {INST_CLOSE}")
            }
            None => wrap_label(&turn_scaffold(user_message)),
        }
    }
}

/// `User: <msg>\nAssistant:`
pub fn turn_scaffold(user_message: &str) -> String {
    format!("User: {user_message}\nAssistant:")
}

/// Context used when teaching a single Q&A pair: the answer is trained as the
/// continuation of this text.
pub fn teach_context(question: &str) -> String {
    format!("User: {question}\nAssistant: ")
}

pub fn wrap_label(label: &str) -> String {
    format!("{INST_OPEN}{label}{INST_CLOSE}")
}

pub fn end_of_context(context: &str) -> String {
    format!("{context}{END_OF_SEQUENCE}")
}
