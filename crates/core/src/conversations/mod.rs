//! Conversation provisioning engine.
//!
//! Maps quotes to scoped provider conversations, keeps the participant roster
//! consistent with organization membership and mirrors a metadata document
//! into the provider. The relational store is the system of record; the
//! provider is a possibly-lagging mirror.

pub mod memory;
pub mod metadata;
pub mod participants;
pub mod provisioning;
pub mod scope;
pub mod sync;
pub mod threads;

use std::sync::Arc;
use std::time::Duration;

use crate::config::MessagingConfig;
use crate::domain::participant::ParticipantRole;
use crate::errors::ApplicationError;
use crate::ports::{DirectoryStore, MessagingProvider, ParticipantStore, ThreadStore};

pub use metadata::MetadataSyncOutcome;
pub use participants::{EnsuredParticipant, ParticipantOptions};
pub use provisioning::{ProvisioningOptions, ProvisioningReport, SkippedQuote};
pub use scope::{resolve_scope, ResolvedScope, ScopeField, ScopeFilter, ScopeOverrides};
pub use sync::ProviderSync;
pub use threads::EnsuredThread;

/// Deployment settings the engine needs. Constructed once at startup; the
/// role ids are checked eagerly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationSettings {
    requester_role_id: String,
    provider_role_id: String,
    provider_timeout: Duration,
}

impl ConversationSettings {
    pub fn new(
        requester_role_id: impl Into<String>,
        provider_role_id: impl Into<String>,
        provider_timeout: Duration,
    ) -> Result<Self, ApplicationError> {
        let requester_role_id = requester_role_id.into();
        let provider_role_id = provider_role_id.into();

        if requester_role_id.trim().is_empty() {
            return Err(ApplicationError::Configuration(
                "requester role id is not configured".to_string(),
            ));
        }
        if provider_role_id.trim().is_empty() {
            return Err(ApplicationError::Configuration(
                "provider role id is not configured".to_string(),
            ));
        }
        if provider_timeout.is_zero() {
            return Err(ApplicationError::Configuration(
                "provider timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self { requester_role_id, provider_role_id, provider_timeout })
    }

    pub fn from_config(config: &MessagingConfig) -> Result<Self, ApplicationError> {
        Self::new(
            config.requester_role_id.clone(),
            config.provider_role_id.clone(),
            config.request_timeout(),
        )
    }

    pub fn role_id(&self, role: ParticipantRole) -> &str {
        match role {
            ParticipantRole::Requester => &self.requester_role_id,
            ParticipantRole::Provider => &self.provider_role_id,
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }
}

#[derive(Clone)]
pub struct ConversationService {
    threads: Arc<dyn ThreadStore>,
    participants: Arc<dyn ParticipantStore>,
    directory: Arc<dyn DirectoryStore>,
    provider: Arc<dyn MessagingProvider>,
    settings: ConversationSettings,
}

impl ConversationService {
    pub fn new(
        threads: Arc<dyn ThreadStore>,
        participants: Arc<dyn ParticipantStore>,
        directory: Arc<dyn DirectoryStore>,
        provider: Arc<dyn MessagingProvider>,
        settings: ConversationSettings,
    ) -> Self {
        Self { threads, participants, directory, provider, settings }
    }

    pub fn settings(&self) -> &ConversationSettings {
        &self.settings
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::memory::{
        InMemoryDirectory, InMemoryMessagingProvider, InMemoryParticipantStore,
        InMemoryThreadStore,
    };
    use super::{ConversationService, ConversationSettings};
    use crate::domain::organization::{OrganizationId, OrganizationSummary, OrganizationType};
    use crate::domain::quote::{QuoteContext, QuoteId, QuoteStatus, ShipmentId};
    use crate::domain::user::{UserId, UserProfile};

    pub struct Harness {
        pub service: ConversationService,
        pub threads: Arc<InMemoryThreadStore>,
        pub participants: Arc<InMemoryParticipantStore>,
        pub provider: Arc<InMemoryMessagingProvider>,
    }

    pub fn settings() -> ConversationSettings {
        ConversationSettings::new("RL-requester", "RL-provider", Duration::from_millis(200))
            .expect("valid settings")
    }

    pub fn org(id: &str, org_type: OrganizationType) -> OrganizationSummary {
        OrganizationSummary {
            id: OrganizationId(id.to_string()),
            name: format!("{id} name"),
            org_type,
            logo_url: None,
            location_label: Some("Zurich".to_string()),
        }
    }

    pub fn user(id: &str) -> UserProfile {
        UserProfile {
            id: UserId(id.to_string()),
            display_name: format!("{id} display"),
            email: None,
        }
    }

    pub fn quote(id: &str, owner: &str, shipment: Option<&str>) -> QuoteContext {
        QuoteContext {
            id: QuoteId(id.to_string()),
            title: Some(format!("Quote title {id}")),
            owner_org_id: OrganizationId(owner.to_string()),
            shipment_id: shipment.map(|value| ShipmentId(value.to_string())),
            shipment_reference: None,
            submitted_by: None,
            status: QuoteStatus::Open,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid date"),
        }
    }

    /// Gallery `org-gallery` (members `u-gallery`, `u-gallery-2`), shipper
    /// `org-shipper` (member `u-shipper`) and quote `Q1` owned by the gallery
    /// with shipment `SHP-1`.
    pub fn directory() -> InMemoryDirectory {
        InMemoryDirectory::default()
            .with_organization(org("org-gallery", OrganizationType::Gallery))
            .with_organization(org("org-shipper", OrganizationType::Shipper))
            .with_user(user("u-gallery"))
            .with_user(user("u-gallery-2"))
            .with_user(user("u-shipper"))
            .with_membership("u-gallery", "org-gallery")
            .with_membership("u-gallery-2", "org-gallery")
            .with_membership("u-shipper", "org-shipper")
            .with_quote(quote("Q1", "org-gallery", Some("SHP-1")))
    }

    pub fn harness_with(
        directory: InMemoryDirectory,
        provider: InMemoryMessagingProvider,
    ) -> Harness {
        let threads = Arc::new(InMemoryThreadStore::default());
        let participants = Arc::new(InMemoryParticipantStore::default());
        let provider = Arc::new(provider);
        let service = ConversationService::new(
            threads.clone(),
            participants.clone(),
            Arc::new(directory),
            provider.clone(),
            settings(),
        );
        Harness { service, threads, participants, provider }
    }

    pub fn harness() -> Harness {
        harness_with(directory(), InMemoryMessagingProvider::default())
    }
}
