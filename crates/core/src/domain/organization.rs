use serde::{Deserialize, Serialize};

use crate::domain::participant::ParticipantRole;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationType {
    Gallery,
    Shipper,
    Other(String),
}

impl OrganizationType {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "gallery" | "client" | "requester" => Self::Gallery,
            "shipper" | "provider" | "carrier" => Self::Shipper,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Gallery => "gallery",
            Self::Shipper => "shipper",
            Self::Other(value) => value.as_str(),
        }
    }

    /// Role a new participant gets when the caller does not override it.
    pub fn default_participant_role(&self) -> ParticipantRole {
        match self {
            Self::Shipper => ParticipantRole::Provider,
            Self::Gallery | Self::Other(_) => ParticipantRole::Requester,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSummary {
    pub id: OrganizationId,
    pub name: String,
    pub org_type: OrganizationType,
    pub logo_url: Option<String>,
    pub location_label: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub member_role: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::OrganizationType;
    use crate::domain::participant::ParticipantRole;

    #[test]
    fn provider_type_organizations_default_to_provider_role() {
        assert_eq!(OrganizationType::parse("Shipper"), OrganizationType::Shipper);
        assert_eq!(OrganizationType::parse("carrier"), OrganizationType::Shipper);
        assert_eq!(
            OrganizationType::Shipper.default_participant_role(),
            ParticipantRole::Provider
        );
    }

    #[test]
    fn every_other_type_defaults_to_requester_role() {
        assert_eq!(
            OrganizationType::Gallery.default_participant_role(),
            ParticipantRole::Requester
        );
        let museum = OrganizationType::parse("Museum");
        assert_eq!(museum, OrganizationType::Other("museum".to_string()));
        assert_eq!(museum.as_str(), "museum");
        assert_eq!(museum.default_participant_role(), ParticipantRole::Requester);
    }
}
