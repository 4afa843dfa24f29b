use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::metadata::ThreadMetadata;
use crate::domain::organization::OrganizationId;
use crate::domain::quote::{QuoteId, ShipmentId};
use crate::domain::user::UserId;

const SCOPE_HASH_LEN: usize = 24;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Active,
    Archived,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Addressing key that separates conversations sharing one quote.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadScope {
    pub shipment_id: Option<ShipmentId>,
    pub requester_branch_org_id: Option<OrganizationId>,
    pub provider_branch_org_id: Option<OrganizationId>,
}

impl ThreadScope {
    pub fn is_empty(&self) -> bool {
        self.shipment_id.is_none()
            && self.requester_branch_org_id.is_none()
            && self.provider_branch_org_id.is_none()
    }

    /// Short stable digest of the scope tuple. Field order in the hashed JSON is
    /// part of the provider naming contract and must not change.
    pub fn digest(&self) -> String {
        let material = ScopeDigestMaterial {
            shipment_id: self.shipment_id.as_ref().map(|id| id.0.as_str()),
            provider_branch_org_id: self.provider_branch_org_id.as_ref().map(|id| id.0.as_str()),
            requester_branch_org_id: self
                .requester_branch_org_id
                .as_ref()
                .map(|id| id.0.as_str()),
        };
        let payload = match serde_json::to_vec(&material) {
            Ok(payload) => payload,
            Err(_) => Vec::new(),
        };
        let digest = Sha256::digest(&payload);
        let mut hex = encode_hex(digest.as_slice());
        hex.truncate(SCOPE_HASH_LEN);
        hex
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeDigestMaterial<'a> {
    shipment_id: Option<&'a str>,
    provider_branch_org_id: Option<&'a str>,
    requester_branch_org_id: Option<&'a str>,
}

/// Provider-side unique name for a quote conversation. Independent callers
/// derive the same name for the same scope, which is what makes provider
/// creation idempotent.
pub fn external_unique_name(quote_id: &QuoteId, scope: Option<&ThreadScope>) -> String {
    match scope {
        Some(scope) => format!("quote::{}::scope::{}", quote_id.0, scope.digest()),
        None => format!("quote::{}", quote_id.0),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub quote_id: QuoteId,
    pub organization_id: OrganizationId,
    pub scope: ThreadScope,
    pub external_conversation_id: String,
    pub external_unique_name: String,
    pub status: ThreadStatus,
    pub metadata: ThreadMetadata,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn is_active(&self) -> bool {
        self.status == ThreadStatus::Active
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
