use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::organization::OrganizationId;
use crate::domain::thread::ThreadId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Requester,
    Provider,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Provider => "provider",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "requester" => Some(Self::Requester),
            "provider" => Some(Self::Provider),
            _ => None,
        }
    }
}

/// Identity used with the messaging provider. It doubles as the idempotency
/// key for provider-side membership, so it must stay reproducible.
pub fn external_identity(role: ParticipantRole, user_id: &UserId) -> String {
    format!("{}:{}", role.as_str(), user_id.0)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub thread_id: ThreadId,
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: ParticipantRole,
    pub identity: String,
    pub external_role_id: String,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}
