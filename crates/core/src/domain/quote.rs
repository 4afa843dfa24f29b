use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::organization::OrganizationId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Open,
    Awarded,
    Closed,
    Cancelled,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Awarded => "awarded",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "awarded" => Some(Self::Awarded),
            "closed" => Some(Self::Closed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Read-only view of a quote owned by the quoting subsystem.
///
/// The conversation engine only uses it to seed a thread's default scope and
/// its default participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteContext {
    pub id: QuoteId,
    pub title: Option<String>,
    pub owner_org_id: OrganizationId,
    pub shipment_id: Option<ShipmentId>,
    pub shipment_reference: Option<String>,
    pub submitted_by: Option<UserId>,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
}

impl QuoteContext {
    pub fn friendly_name(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Quote {}", self.id.0),
        }
    }
}
