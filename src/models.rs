use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::lut::{ChatProfile, LutConfig, Residuals};
use crate::qa::QaPair;

/// `as_str`, `Display` and case-insensitive `TryFrom<String>` for a lowercase text enum.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl TryFrom<String> for $ty {
            type Error = String;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!("Unknown {}: {other}", stringify!($ty))),
                }
            }
        }
    };
}

// ── Chat ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

text_enum!(MessageRole { User => "user", Assistant => "assistant" });

/// One chat turn. Immutable once created; lives only in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
        }
    }
}

/// Snapshot of a chat session as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub profile: ChatProfile,
    pub lut: LutConfig,
    pub messages: Vec<Message>,
    pub last_residual: Option<Residuals>,
    pub last_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub lut_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchLutRequest {
    pub lut_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub message: Message,
    pub residual: Residuals,
    pub threshold: f64,
}

#[derive(Debug, Deserialize)]
pub struct TeachRequest {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct ValueRequest {
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub block: i32,
}

#[derive(Debug, Serialize)]
pub struct TrainingSummary {
    pub lut_name: String,
    pub trained: usize,
}

// ── Space knowledge ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GenerateQaRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct TrainPairsRequest {
    pub user: String,
    pub pairs: Vec<QaPair>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingLogEntry {
    pub user: String,
    pub date: DateTime<Utc>,
    pub qa_count: usize,
}

// ── Spaces ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    Company,
    Personal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Pending,
    Accepted,
    Declined,
}

text_enum!(SpaceType { Company => "company", Personal => "personal" });
text_enum!(MemberRole { Owner => "owner", Admin => "admin", Member => "member" });
text_enum!(MemberStatus { Pending => "pending", Accepted => "accepted", Declined => "declined" });

/// A named knowledge container backed by its own LUT.
#[derive(Debug, Clone, Serialize)]
pub struct Space {
    pub id: String,
    pub creator_id: String,
    pub lut_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub space_type: SpaceType,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpaceMember {
    pub id: String,
    pub space_id: String,
    pub user_id: Option<String>,
    pub email: String,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub invited_by: String,
    pub invited_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSpaceRequest {
    pub creator_id: String,
    pub creator_email: String,
    pub name: String,
    #[serde(rename = "type")]
    pub space_type: SpaceType,
    pub description: Option<String>,
}

/// Partial update. `description` is `None` when absent and `Some(None)` when
/// sent as `null`, which clears it.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSpaceRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(rename = "type")]
    pub space_type: Option<SpaceType>,
}

/// Wraps any value that is present in the payload, `null` included.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub invited_by: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    pub user_id: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_role_serializes_lowercase() {
        let msg = Message::new(MessageRole::Assistant, "hi".into());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "assistant");
        assert!(uuid::Uuid::parse_str(&msg.id).is_ok());
    }

    #[test]
    fn message_ids_are_unique() {
        let a = Message::new(MessageRole::User, "x".into());
        let b = Message::new(MessageRole::User, "x".into());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn text_enums_round_trip_through_strings() {
        assert_eq!(MemberStatus::try_from("Accepted".to_string()), Ok(MemberStatus::Accepted));
        assert_eq!(SpaceType::Company.as_str(), "company");
        assert!(MemberRole::try_from("guest".to_string()).is_err());
    }

    #[test]
    fn space_type_uses_type_key() {
        let req: UpdateSpaceRequest = serde_json::from_str(r#"{"type":"company"}"#).unwrap();
        assert_eq!(req.space_type, Some(SpaceType::Company));
        assert!(req.name.is_none());
        assert!(req.description.is_none());
    }

    #[test]
    fn null_description_is_told_apart_from_absent() {
        let req: UpdateSpaceRequest = serde_json::from_str(r#"{"description":null}"#).unwrap();
        assert_eq!(req.description, Some(None));

        let req: UpdateSpaceRequest = serde_json::from_str(r#"{"description":"Notes"}"#).unwrap();
        assert_eq!(req.description, Some(Some("Notes".to_string())));
    }

    #[test]
    fn creator_email_is_required() {
        let body = r#"{"creator_id":"u1","name":"Lab","type":"personal"}"#;
        assert!(serde_json::from_str::<CreateSpaceRequest>(body).is_err());
    }

    #[test]
    fn message_role_text() {
        assert_eq!(MessageRole::User.to_string(), "user");
        assert_eq!(MessageRole::try_from("Assistant".to_string()), Ok(MessageRole::Assistant));
    }
}
