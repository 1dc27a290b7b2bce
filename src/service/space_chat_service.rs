use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::lut::{ChatProfile, PairKind};
use crate::models::{SessionView, TrainingLogEntry, TrainingSummary};
use crate::qa::{parse_qa_pairs, qa_extraction_prompt, QaPair};
use crate::service::chat_service::ChatService;

const QA_GEN_LENGTH: u32 = 800;

/// Knowledge workflow for a space's LUT: chat, derive Q&A pairs from text,
/// train them, and keep a log of training runs.
#[derive(Clone)]
pub struct SpaceChatService {
    chat: ChatService,
    training: Arc<Mutex<HashSet<String>>>,
    logs: Arc<Mutex<HashMap<String, Vec<TrainingLogEntry>>>>,
}

/// Releases a LUT's training slot on drop.
struct TrainingSlot {
    training: Arc<Mutex<HashSet<String>>>,
    lut_name: String,
}

impl Drop for TrainingSlot {
    fn drop(&mut self) {
        if let Ok(mut training) = self.training.lock() {
            training.remove(&self.lut_name);
        }
    }
}

impl SpaceChatService {
    pub fn new(chat: ChatService) -> Self {
        Self {
            chat,
            training: Arc::new(Mutex::new(HashSet::new())),
            logs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn open_session(&self, lut_name: &str) -> Result<SessionView, AppError> {
        self.chat.create_space_session(lut_name)
    }

    /// Asks the model to summarise `text` as Q&A pairs for review before training.
    pub async fn generate_qa_pairs(
        &self,
        lut_name: &str,
        text: &str,
    ) -> Result<Vec<QaPair>, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::empty_field("text"));
        }
        let profile = ChatProfile::Space;
        let lut = ChatProfile::space_lut(lut_name);
        let prompt = profile.formatter().format(&qa_extraction_prompt(text));
        let client = self.chat.client();
        let request =
            profile.generation_request_with_length(&lut, client.model(), prompt, QA_GEN_LENGTH);

        let response = client.generate(&request).await?;
        let pairs = parse_qa_pairs(&response.completion, text);
        info!("Derived {} Q&A pair(s) for LUT {lut_name}", pairs.len());
        Ok(pairs)
    }

    /// Trains `pairs` one after another. Stops at the first failure; pairs
    /// already sent stay trained.
    pub async fn train_pairs(
        &self,
        lut_name: &str,
        user: &str,
        pairs: &[QaPair],
    ) -> Result<TrainingSummary, AppError> {
        if pairs.is_empty() {
            return Err(AppError::empty_field("pairs"));
        }
        let _slot = self.acquire(lut_name)?;

        let profile = ChatProfile::Space;
        let lut = ChatProfile::space_lut(lut_name);
        let client = self.chat.client();
        for (idx, pair) in pairs.iter().enumerate() {
            info!("Training Q&A pair {} of {} on LUT {lut_name}", idx + 1, pairs.len());
            let request = profile.training_request(
                &lut,
                client.model(),
                &pair.question,
                &pair.answer,
                PairKind::Document,
            );
            client.train(&request).await?;
        }

        let entry = TrainingLogEntry {
            user: user.to_string(),
            date: Utc::now(),
            qa_count: pairs.len(),
        };
        match self.logs.lock() {
            Ok(mut logs) => logs.entry(lut_name.to_string()).or_default().insert(0, entry),
            Err(_) => warn!("Training log lock poisoned; run on {lut_name} not recorded"),
        }

        Ok(TrainingSummary { lut_name: lut_name.to_string(), trained: pairs.len() })
    }

    /// Newest run first.
    pub fn training_log(&self, lut_name: &str) -> Result<Vec<TrainingLogEntry>, AppError> {
        let logs = self
            .logs
            .lock()
            .map_err(|_| AppError::Unexpected("training log lock poisoned".to_string()))?;
        Ok(logs.get(lut_name).cloned().unwrap_or_default())
    }

    fn acquire(&self, lut_name: &str) -> Result<TrainingSlot, AppError> {
        let mut training = self
            .training
            .lock()
            .map_err(|_| AppError::Unexpected("training lock poisoned".to_string()))?;
        if !training.insert(lut_name.to_string()) {
            return Err(AppError::Busy { scope: lut_name.to_string(), action: "train" });
        }
        Ok(TrainingSlot { training: Arc::clone(&self.training), lut_name: lut_name.to_string() })
    }
}
