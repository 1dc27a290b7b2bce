use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::extract::extract_assistant_answer;
use crate::lut::docs::example_docs;
use crate::lut::{
    ChatProfile, LutClient, LutConfig, PairKind, PretrainedCatalog, PretrainedLut, Residuals,
};
use crate::models::{ChatResponse, Message, MessageRole, SessionView, TrainingSummary};

const MAX_MESSAGE_LENGTH: usize = 8000;

/// A UI control that may only have one request in flight per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Generate,
    Teach,
    TrainDocs,
}

impl Control {
    pub fn as_str(&self) -> &'static str {
        match self {
            Control::Generate => "generate",
            Control::Teach => "teach",
            Control::TrainDocs => "train",
        }
    }
}

#[derive(Debug)]
struct ChatSession {
    id: String,
    profile: ChatProfile,
    lut: LutConfig,
    messages: Vec<Message>,
    last_residual: Option<Residuals>,
    last_threshold: Option<f64>,
    in_flight: HashSet<Control>,
}

impl ChatSession {
    fn new(profile: ChatProfile, lut: LutConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            profile,
            lut,
            messages: Vec::new(),
            last_residual: None,
            last_threshold: None,
            in_flight: HashSet::new(),
        }
    }

    /// Drops the conversation and per-LUT readouts after a LUT switch.
    fn reset_with(&mut self, lut: LutConfig) {
        self.lut = lut;
        self.messages.clear();
        self.last_residual = None;
        self.last_threshold = None;
    }

    fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            profile: self.profile,
            lut: self.lut.clone(),
            messages: self.messages.clone(),
            last_residual: self.last_residual.clone(),
            last_threshold: self.last_threshold,
        }
    }
}

type SessionMap = Arc<Mutex<HashMap<String, ChatSession>>>;

/// Clears a session's in-flight flag when the request finishes, whatever the outcome.
struct InFlight {
    sessions: SessionMap,
    session_id: String,
    control: Control,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if let Some(session) = sessions.get_mut(&self.session_id) {
                session.in_flight.remove(&self.control);
            }
        }
    }
}

/// In-memory chat sessions against the LUT model server.
///
/// Each session holds one conversation and its LUT settings. Nothing is
/// persisted; sessions live as long as the process.
#[derive(Clone)]
pub struct ChatService {
    sessions: SessionMap,
    client: LutClient,
    catalog: Arc<PretrainedCatalog>,
}

impl ChatService {
    pub fn new(client: LutClient, catalog: PretrainedCatalog) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            client,
            catalog: Arc::new(catalog),
        }
    }

    pub fn client(&self) -> &LutClient {
        &self.client
    }

    pub fn pretrained(&self) -> &[PretrainedLut] {
        self.catalog.entries()
    }

    /// Opens a demo session. Without a name the first pre-trained LUT is used,
    /// or a freshly named LUT when the catalog is empty.
    pub fn create_session(&self, lut_name: Option<&str>) -> Result<SessionView, AppError> {
        let lut = match lut_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => LutConfig::resolve(&self.catalog, name),
            None => match self.catalog.first() {
                Some(pretrained) => LutConfig::from_pretrained(pretrained),
                None => LutConfig::new_lut(self.catalog.generate_lut_name()),
            },
        };
        self.insert(ChatSession::new(ChatProfile::Demo, lut))
    }

    /// Opens a session bound to a space's LUT with the space profile.
    pub fn create_space_session(&self, lut_name: &str) -> Result<SessionView, AppError> {
        let lut_name = lut_name.trim();
        if lut_name.is_empty() {
            return Err(AppError::empty_field("lut_name"));
        }
        self.insert(ChatSession::new(ChatProfile::Space, ChatProfile::space_lut(lut_name)))
    }

    fn insert(&self, session: ChatSession) -> Result<SessionView, AppError> {
        let view = session.view();
        info!("Opened {:?} session {} on LUT {}", view.profile, view.id, view.lut.lut_name);
        self.lock()?.insert(session.id.clone(), session);
        Ok(view)
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionView, AppError> {
        self.with_session(session_id, |s| Ok(s.view()))
    }

    pub fn switch_lut(&self, session_id: &str, lut_name: &str) -> Result<SessionView, AppError> {
        let lut_name = lut_name.trim();
        if lut_name.is_empty() {
            return Err(AppError::empty_field("lut_name"));
        }
        let lut = LutConfig::resolve(&self.catalog, lut_name);
        self.with_session(session_id, |s| {
            info!("Session {} switched to LUT {}", s.id, lut.lut_name);
            s.reset_with(lut);
            Ok(s.view())
        })
    }

    pub fn new_lut(&self, session_id: &str) -> Result<SessionView, AppError> {
        let name = self.catalog.generate_lut_name();
        self.switch_lut(session_id, &name)
    }

    pub fn set_threshold(&self, session_id: &str, threshold: f64) -> Result<SessionView, AppError> {
        self.with_session(session_id, |s| {
            s.lut.set_threshold(threshold);
            Ok(s.view())
        })
    }

    pub fn toggle_block(&self, session_id: &str, block: i32) -> Result<SessionView, AppError> {
        self.with_session(session_id, |s| {
            s.lut.toggle_block(block)?;
            Ok(s.view())
        })
    }

    pub fn set_residual(
        &self,
        session_id: &str,
        block: i32,
        value: f64,
    ) -> Result<SessionView, AppError> {
        self.with_session(session_id, |s| {
            s.lut.set_residual(block, value)?;
            Ok(s.view())
        })
    }

    pub fn add_block(&self, session_id: &str, block: i32) -> Result<SessionView, AppError> {
        self.with_session(session_id, |s| {
            s.lut.add_block(block)?;
            Ok(s.view())
        })
    }

    pub fn delete_block(&self, session_id: &str, block: i32) -> Result<SessionView, AppError> {
        self.with_session(session_id, |s| {
            s.lut.delete_block(block)?;
            Ok(s.view())
        })
    }

    pub async fn send_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<ChatResponse, AppError> {
        // ── Validation ────────────────────────────────────────────────────────
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(AppError::empty_field("message"));
        }
        if trimmed.len() > MAX_MESSAGE_LENGTH {
            return Err(AppError::FieldTooLong {
                field_name: "message".to_string(),
                max_length: MAX_MESSAGE_LENGTH,
                actual_length: trimmed.len(),
            });
        }

        // ── Record the user turn and snapshot LUT settings ────────────────────
        let (profile, lut, _guard) = self.begin(session_id, Control::Generate, |s| {
            s.messages.push(Message::new(MessageRole::User, trimmed.to_string()));
            Ok(())
        })?;

        let prompt = profile.formatter().format(trimmed);
        let request = profile.generation_request(&lut, self.client.model(), prompt);
        debug!("Generating for session {session_id} on LUT {}", lut.lut_name);
        let response = self.client.generate(&request).await?;

        let answer = extract_assistant_answer(trimmed, &response.completion);
        let assistant = Message::new(MessageRole::Assistant, answer);
        let residual = response.residual.unwrap_or(request.residuals);
        let threshold = response.threshold.unwrap_or(request.threshold);

        self.with_session(session_id, |s| {
            s.messages.push(assistant.clone());
            s.last_residual = Some(residual.clone());
            s.last_threshold = Some(threshold);
            Ok(())
        })?;

        Ok(ChatResponse {
            session_id: session_id.to_string(),
            message: assistant,
            residual,
            threshold,
        })
    }

    /// Stores one hand-written Q&A pair in the session's LUT.
    pub async fn teach(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<TrainingSummary, AppError> {
        let (question, answer) = (question.trim(), answer.trim());
        if question.is_empty() {
            return Err(AppError::empty_field("question"));
        }
        if answer.is_empty() {
            return Err(AppError::empty_field("answer"));
        }

        let (profile, lut, _guard) =
            self.begin(session_id, Control::Teach, |s| s.lut.ensure_writable())?;

        let request =
            profile.training_request(&lut, self.client.model(), question, answer, PairKind::Taught);
        self.client.train(&request).await?;
        info!("Taught one Q&A pair to LUT {}", lut.lut_name);

        Ok(TrainingSummary { lut_name: lut.lut_name, trained: 1 })
    }

    /// Trains the built-in example documents, one request at a time.
    pub async fn train_example_docs(&self, session_id: &str) -> Result<TrainingSummary, AppError> {
        let (profile, lut, _guard) =
            self.begin(session_id, Control::TrainDocs, |s| s.lut.ensure_writable())?;

        let docs = example_docs();
        info!("Training LUT {} on {} example docs", lut.lut_name, docs.len());
        for doc in &docs {
            let request = profile.training_request(
                &lut,
                self.client.model(),
                &doc.question,
                &doc.answer,
                PairKind::Document,
            );
            self.client.train(&request).await?;
        }

        Ok(TrainingSummary { lut_name: lut.lut_name, trained: docs.len() })
    }

    /// Marks `control` busy on the session, runs `prepare`, and snapshots the
    /// settings the request will use.
    fn begin(
        &self,
        session_id: &str,
        control: Control,
        prepare: impl FnOnce(&mut ChatSession) -> Result<(), AppError>,
    ) -> Result<(ChatProfile, LutConfig, InFlight), AppError> {
        let snapshot = self.with_session(session_id, |s| {
            if s.in_flight.contains(&control) {
                return Err(AppError::Busy {
                    scope: s.id.clone(),
                    action: control.as_str(),
                });
            }
            prepare(s)?;
            s.in_flight.insert(control);
            Ok((s.profile, s.lut.clone()))
        })?;
        let guard = InFlight {
            sessions: Arc::clone(&self.sessions),
            session_id: session_id.to_string(),
            control,
        };
        Ok((snapshot.0, snapshot.1, guard))
    }

    fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut ChatSession) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::SessionNotFound { id: session_id.to_string() })?;
        f(session)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ChatSession>>, AppError> {
        self.sessions
            .lock()
            .map_err(|_| AppError::Unexpected("session store lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::test_support::serve;

    async fn service_with(app: Router) -> ChatService {
        let base = serve(app).await;
        ChatService::new(LutClient::new(&base, "mistral").unwrap(), PretrainedCatalog::default())
    }

    fn echo_model() -> Router {
        Router::new().route(
            "/generate",
            post(|Json(body): Json<Value>| async move {
                let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
                Json(json!({ "completion": format!("{prompt} Hello there\nUser: more") }))
            }),
        )
    }

    #[tokio::test]
    async fn default_session_uses_first_pretrained_lut() {
        let svc = service_with(Router::new()).await;
        let session = svc.create_session(None).unwrap();
        assert_eq!(session.lut.lut_name, "demo-f0d18034");
        assert!(session.lut.read_only);

        let custom = svc.create_session(Some("demo-cafebabe")).unwrap();
        assert_eq!(custom.lut.wnn_blocks, vec![-1, -4]);
        assert!(!custom.lut.read_only);
    }

    #[tokio::test]
    async fn send_message_extracts_and_records_both_turns() {
        let svc = service_with(echo_model()).await;
        let session = svc.create_session(Some("demo-cafebabe")).unwrap();

        let reply = svc.send_message(&session.id, "  Hi  ").await.unwrap();
        assert_eq!(reply.message.content, "Hello there");
        assert_eq!(reply.message.role, MessageRole::Assistant);
        assert_eq!(reply.residual, Residuals::PerBlock(vec![0.75, 0.25]));
        assert_eq!(reply.threshold, 0.25);

        let view = svc.get_session(&session.id).unwrap();
        assert_eq!(view.messages.len(), 2);
        assert_eq!(view.messages[0].content, "Hi");
        assert_eq!(view.last_threshold, Some(0.25));
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_any_request() {
        let svc = service_with(Router::new()).await;
        let session = svc.create_session(None).unwrap();
        let err = svc.send_message(&session.id, "   ").await.unwrap_err();
        assert!(err.is_validation());
        assert!(svc.get_session(&session.id).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn generation_failure_keeps_user_turn_and_frees_control() {
        let app = Router::new().route(
            "/generate",
            post(|| async { (StatusCode::BAD_REQUEST, Json(json!({ "error": "LUT missing" }))) }),
        );
        let svc = service_with(app).await;
        let session = svc.create_session(None).unwrap();

        let err = svc.send_message(&session.id, "Hi").await.unwrap_err();
        assert_eq!(err.to_string(), "LUT missing");
        assert_eq!(svc.get_session(&session.id).unwrap().messages.len(), 1);

        // the control is usable again
        let err = svc.send_message(&session.id, "Hi again").await.unwrap_err();
        assert_eq!(err.to_string(), "LUT missing");
    }

    #[tokio::test]
    async fn concurrent_send_on_same_session_is_busy() {
        let app = Router::new().route(
            "/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Json(json!({ "completion": "Assistant: late" }))
            }),
        );
        let svc = service_with(app).await;
        let session = svc.create_session(None).unwrap();

        let first = {
            let svc = svc.clone();
            let id = session.id.clone();
            tokio::spawn(async move { svc.send_message(&id, "one").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = svc.send_message(&session.id, "two").await.unwrap_err();
        assert!(matches!(err, AppError::Busy { action: "generate", .. }));
        assert_eq!(first.await.unwrap().unwrap().message.content, "late");
    }

    #[tokio::test]
    async fn teach_is_refused_on_read_only_lut() {
        let svc = service_with(Router::new()).await;
        let session = svc.create_session(None).unwrap();
        let err = svc.teach(&session.id, "Q?", "A.").await.unwrap_err();
        assert!(matches!(err, AppError::ReadOnlyLut { .. }));
    }

    #[tokio::test]
    async fn example_docs_train_sequentially() {
        let calls = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let app = {
            let calls = Arc::clone(&calls);
            let in_flight = Arc::clone(&in_flight);
            Router::new().route(
                "/train_lut",
                post(move |Json(body): Json<Value>| {
                    let calls = Arc::clone(&calls);
                    let in_flight = Arc::clone(&in_flight);
                    async move {
                        assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                        assert!(body["label"].as_str().unwrap().starts_with("[INST]"));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Json(json!({ "ok": true }))
                    }
                }),
            )
        };
        let svc = service_with(app).await;
        let session = svc.create_session(Some("demo-cafebabe")).unwrap();

        let summary = svc.train_example_docs(&session.id).await.unwrap();
        assert_eq!(summary.trained, example_docs().len());
        assert_eq!(calls.load(Ordering::SeqCst), example_docs().len());
    }

    #[tokio::test]
    async fn switching_lut_resets_conversation() {
        let svc = service_with(echo_model()).await;
        let session = svc.create_session(None).unwrap();
        svc.send_message(&session.id, "Hi").await.unwrap();

        let view = svc.new_lut(&session.id).unwrap();
        assert!(view.messages.is_empty());
        assert!(view.last_threshold.is_none());
        assert!(view.lut.lut_name.starts_with("demo-"));
        assert!(!view.lut.read_only);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let svc = service_with(Router::new()).await;
        let err = svc.get_session("missing").unwrap_err();
        assert!(err.is_not_found());
    }
}
