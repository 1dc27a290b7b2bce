use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::client::{GenerationRequest, Residuals, TrainingRequest};
use super::config::LutConfig;
use crate::prompt::{end_of_context, teach_context, wrap_label, PromptFormatter, ASTARA_PREAMBLE};

const DEMO_GEN_LENGTH: u32 = 128;
const SPACE_GEN_LENGTH: u32 = 300;
const COST_SCALE: f64 = 5.0;
const SPARSITY: f64 = 1.0;

pub const SPACE_THRESHOLD: f64 = 0.45;
pub const SPACE_BLOCKS: [i32; 2] = [-1, -4];
pub const SPACE_RESIDUALS: [f64; 2] = [0.2, 0.25];

/// How a chat session talks to the model server.
///
/// `Demo` is the playground chat: plain turn-scaffold prompts and tunable
/// LUT settings. `Space` backs a knowledge space: persona prompts and fixed
/// generation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProfile {
    Demo,
    Space,
}

/// Which training action a Q&A pair comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairKind {
    /// A single hand-written question and answer.
    Taught,
    /// An entry of a document batch.
    Document,
}

impl ChatProfile {
    pub fn formatter(&self) -> PromptFormatter {
        match self {
            ChatProfile::Demo => PromptFormatter::plain(),
            ChatProfile::Space => PromptFormatter::with_preamble(ASTARA_PREAMBLE),
        }
    }

    pub fn gen_length(&self) -> u32 {
        match self {
            ChatProfile::Demo => DEMO_GEN_LENGTH,
            ChatProfile::Space => SPACE_GEN_LENGTH,
        }
    }

    /// Initial LUT settings for a space's LUT.
    pub fn space_lut(lut_name: &str) -> LutConfig {
        LutConfig {
            lut_name: lut_name.to_string(),
            available_blocks: SPACE_BLOCKS.to_vec(),
            wnn_blocks: SPACE_BLOCKS.to_vec(),
            residual_map: SPACE_BLOCKS.into_iter().zip(SPACE_RESIDUALS).collect::<BTreeMap<_, _>>(),
            threshold: SPACE_THRESHOLD,
            read_only: false,
        }
    }

    pub fn generation_request(&self, lut: &LutConfig, model: &str, prompt: String) -> GenerationRequest {
        self.generation_request_with_length(lut, model, prompt, self.gen_length())
    }

    pub fn generation_request_with_length(
        &self,
        lut: &LutConfig,
        model: &str,
        prompt: String,
        length: u32,
    ) -> GenerationRequest {
        GenerationRequest {
            prompt,
            length,
            lut_name: lut.lut_name.clone(),
            model: model.to_string(),
            threshold: lut.threshold,
            residuals: Residuals::PerBlock(lut.current_residuals()),
            wnn_blocks: lut.wnn_blocks.clone(),
            cost_scale: Some(COST_SCALE),
        }
    }

    /// Encodes a Q&A pair the way this profile's LUTs were trained.
    pub fn training_request(
        &self,
        lut: &LutConfig,
        model: &str,
        question: &str,
        answer: &str,
        kind: PairKind,
    ) -> TrainingRequest {
        match self {
            ChatProfile::Demo => {
                let context = match kind {
                    PairKind::Taught => teach_context(question),
                    PairKind::Document => question.to_string(),
                };
                TrainingRequest {
                    label: wrap_label(answer),
                    label_context: Some(end_of_context(&context)),
                    lut_name: lut.lut_name.clone(),
                    model: model.to_string(),
                    wnn_blocks: lut.wnn_blocks.clone(),
                    sparsity: SPARSITY,
                    threshold: None,
                    residuals: None,
                    cost_scale: None,
                }
            }
            ChatProfile::Space => TrainingRequest {
                label: answer.trim().to_string(),
                label_context: Some(self.formatter().format(question)),
                lut_name: lut.lut_name.clone(),
                model: model.to_string(),
                wnn_blocks: lut.wnn_blocks.clone(),
                sparsity: SPARSITY,
                threshold: Some(lut.threshold),
                residuals: Some(Residuals::PerBlock(lut.current_residuals())),
                cost_scale: Some(COST_SCALE),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_generation_uses_session_settings() {
        let lut = LutConfig::new_lut("demo-abcdef01");
        let req = ChatProfile::Demo.generation_request(&lut, "mistral", "p".into());
        assert_eq!(req.length, 128);
        assert_eq!(req.residuals, Residuals::PerBlock(vec![0.75, 0.25]));
        assert_eq!(req.threshold, 0.25);
        assert_eq!(req.cost_scale, Some(5.0));
    }

    #[test]
    fn space_lut_defaults() {
        let lut = ChatProfile::space_lut("space-1234abcd");
        assert_eq!(lut.current_residuals(), vec![0.2, 0.25]);
        assert_eq!(lut.threshold, 0.45);
        let req = ChatProfile::Space.generation_request(&lut, "mistral", "p".into());
        assert_eq!(req.length, 300);
    }

    #[test]
    fn demo_training_wraps_label_and_context() {
        let lut = LutConfig::new_lut("demo-abcdef01");
        let taught = ChatProfile::Demo.training_request(&lut, "mistral", "Q?", "A.", PairKind::Taught);
        assert_eq!(taught.label, "[INST]A.[/INST]");
        assert_eq!(taught.label_context.as_deref(), Some("User: Q?\nAssistant: </s>"));
        assert!(taught.threshold.is_none());

        let doc = ChatProfile::Demo.training_request(&lut, "mistral", "Q?", "A.", PairKind::Document);
        assert_eq!(doc.label_context.as_deref(), Some("Q?</s>"));
    }

    #[test]
    fn space_training_formats_question_as_prompt() {
        let lut = ChatProfile::space_lut("space-1234abcd");
        let req = ChatProfile::Space.training_request(&lut, "mistral", "Q?", "  A.  ", PairKind::Document);
        assert_eq!(req.label, "A.");
        let context = req.label_context.unwrap();
        assert!(context.starts_with("[INST] You are Astara"));
        assert!(context.ends_with("\n\nQ? [/INST]"));
        assert_eq!(req.threshold, Some(0.45));
        assert_eq!(req.residuals, Some(Residuals::PerBlock(vec![0.2, 0.25])));
    }
}
