use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::member_repository::MemberRepository;
use crate::db::space_repository::SpaceRepository;
use crate::errors::AppError;
use crate::lut::config::random_lut_name;
use crate::models::{
    CreateSpaceRequest, MemberRole, MemberStatus, Space, SpaceMember, UpdateSpaceRequest,
};

const MAX_NAME_LENGTH: usize = 100;
const PENDING_INVITATION_LIMIT: i64 = 10;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Spaces and their membership, backed by Postgres.
#[derive(Clone)]
pub struct SpaceService {
    spaces: SpaceRepository,
    members: MemberRepository,
}

impl SpaceService {
    pub fn new(spaces: SpaceRepository, members: MemberRepository) -> Self {
        Self { spaces, members }
    }

    /// Spaces the user created plus those they joined, newest first.
    pub async fn get_user_spaces(&self, user_id: &str, email: &str) -> Result<Vec<Space>, AppError> {
        let created = self.spaces.find_by_creator(user_id).await?;
        let email = normalize_email(email);
        let email = (!email.is_empty()).then_some(email.as_str());
        let member_ids = self.members.find_accepted_space_ids(user_id, email).await?;
        let joined = self.spaces.find_by_ids(&member_ids).await?;
        Ok(merge_spaces(created, joined))
    }

    pub async fn create_space(&self, request: CreateSpaceRequest) -> Result<Space, AppError> {
        if request.creator_id.trim().is_empty() {
            return Err(AppError::empty_field("creator_id"));
        }
        let name = validate_name(&request.name)?;
        let creator_email = normalize_email(&request.creator_email);
        if !is_valid_email(&creator_email) {
            return Err(AppError::InvalidEmail { email: creator_email });
        }
        let now = Utc::now();
        let space = Space {
            id: Uuid::new_v4().to_string(),
            creator_id: request.creator_id.clone(),
            lut_name: random_lut_name("space"),
            name,
            space_type: request.space_type,
            description: request.description.filter(|d| !d.trim().is_empty()),
            created_at: now,
            updated_at: now,
        };
        let space = self.spaces.save(&space).await?;
        info!("Created space {} with LUT {}", space.id, space.lut_name);

        // The space is usable without the owner row; a failure here is only logged.
        let owner = SpaceMember {
            id: Uuid::new_v4().to_string(),
            space_id: space.id.clone(),
            user_id: Some(request.creator_id.clone()),
            email: creator_email,
            role: MemberRole::Owner,
            status: MemberStatus::Accepted,
            invited_by: request.creator_id,
            invited_at: now,
            accepted_at: Some(now),
        };
        if let Err(e) = self.members.save_if_absent(&owner).await {
            warn!("Could not add owner to space {}: {e}", space.id);
        }

        Ok(space)
    }

    pub async fn get_space(&self, id: &str) -> Result<Option<Space>, AppError> {
        self.spaces.find_by_id(id).await
    }

    pub async fn get_space_by_lut_name(&self, lut_name: &str) -> Result<Option<Space>, AppError> {
        self.spaces.find_by_lut_name(lut_name).await
    }

    pub async fn update_space(
        &self,
        id: &str,
        mut changes: UpdateSpaceRequest,
    ) -> Result<Space, AppError> {
        if let Some(name) = changes.name.take() {
            changes.name = Some(validate_name(&name)?);
        }
        if matches!(&changes.description, Some(Some(d)) if d.trim().is_empty()) {
            changes.description = Some(None);
        }
        if !self.spaces.update(id, &changes).await? {
            return Err(space_not_found(id));
        }
        self.spaces.find_by_id(id).await?.ok_or_else(|| space_not_found(id))
    }

    pub async fn delete_space(&self, id: &str) -> Result<(), AppError> {
        if !self.spaces.delete(id).await? {
            return Err(space_not_found(id));
        }
        info!("Deleted space {id}");
        Ok(())
    }

    /// Adds a pending invitation. Inviting the same address twice returns the
    /// existing membership row.
    pub async fn invite(
        &self,
        space_id: &str,
        email: &str,
        invited_by: &str,
    ) -> Result<SpaceMember, AppError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AppError::InvalidEmail { email });
        }
        if self.spaces.find_by_id(space_id).await?.is_none() {
            return Err(space_not_found(space_id));
        }

        let member = SpaceMember {
            id: Uuid::new_v4().to_string(),
            space_id: space_id.to_string(),
            user_id: None,
            email,
            role: MemberRole::Member,
            status: MemberStatus::Pending,
            invited_by: invited_by.to_string(),
            invited_at: Utc::now(),
            accepted_at: None,
        };
        if self.members.save_if_absent(&member).await? {
            info!("Invited {} to space {space_id}", member.email);
            return Ok(member);
        }
        self.members
            .find_by_space_and_email(space_id, &member.email)
            .await?
            .ok_or_else(|| AppError::Unexpected(format!("membership of {} vanished", member.email)))
    }

    pub async fn get_space_members(&self, space_id: &str) -> Result<Vec<SpaceMember>, AppError> {
        self.members.find_by_space(space_id).await
    }

    pub async fn accept_invitation(
        &self,
        space_id: &str,
        user_id: &str,
        email: &str,
    ) -> Result<(), AppError> {
        let email = normalize_email(email);
        if self.members.accept(space_id, user_id, &email).await? == 0 {
            return Err(AppError::RecordNotFound {
                entity_type: "Invitation".to_string(),
                id: format!("{space_id}/{email}"),
            });
        }
        info!("{email} joined space {space_id}");
        Ok(())
    }

    /// Never fails: a lookup error yields no invitations.
    pub async fn get_pending_invitations(&self, email: &str) -> Vec<SpaceMember> {
        let email = normalize_email(email);
        match self.members.find_pending_by_email(&email, PENDING_INVITATION_LIMIT).await {
            Ok(invitations) => invitations,
            Err(e) => {
                warn!("Pending invitations for {email} unavailable: {e}");
                Vec::new()
            }
        }
    }

    pub async fn remove_member(&self, member_id: &str) -> Result<(), AppError> {
        if !self.members.delete(member_id).await? {
            return Err(AppError::RecordNotFound {
                entity_type: "SpaceMember".to_string(),
                id: member_id.to_string(),
            });
        }
        Ok(())
    }
}

fn space_not_found(id: &str) -> AppError {
    AppError::RecordNotFound { entity_type: "Space".to_string(), id: id.to_string() }
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::empty_field("name"));
    }
    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(AppError::FieldTooLong {
            field_name: "name".to_string(),
            max_length: MAX_NAME_LENGTH,
            actual_length: len,
        });
    }
    Ok(name.to_string())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE.is_match(email)
}

/// Union by id, newest first.
fn merge_spaces(created: Vec<Space>, joined: Vec<Space>) -> Vec<Space> {
    let mut seen = HashSet::new();
    let mut all: Vec<Space> = created
        .into_iter()
        .chain(joined)
        .filter(|space| seen.insert(space.id.clone()))
        .collect();
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    all
}
