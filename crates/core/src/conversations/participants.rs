use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::info;
use uuid::Uuid;

use crate::conversations::metadata::MetadataSyncOutcome;
use crate::conversations::sync::{best_effort, ProviderSync};
use crate::conversations::ConversationService;
use crate::domain::metadata::ParticipantSummary;
use crate::domain::organization::{OrganizationId, OrganizationSummary};
use crate::domain::participant::{external_identity, Participant, ParticipantId, ParticipantRole};
use crate::domain::thread::{Thread, ThreadId};
use crate::domain::user::{UserId, UserProfile};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantOptions {
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
    #[serde(default, alias = "role")]
    pub role_override: Option<ParticipantRole>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsuredParticipant {
    pub participant: Participant,
    pub created: bool,
    /// Outcome of the provider membership call; `None` when the participant
    /// already existed and no call was made.
    pub provider: Option<ProviderSync>,
    pub metadata: MetadataSyncOutcome,
}

impl ConversationService {
    /// Ensures `user_id` is an active participant of the thread.
    ///
    /// An existing participant keeps its persisted role; only its display
    /// summary is refreshed. A new participant must belong to the target
    /// organization.
    pub async fn ensure_participant_in_thread(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
        options: ParticipantOptions,
    ) -> Result<EnsuredParticipant, ApplicationError> {
        let thread = self.load_thread(thread_id).await?;
        let existing = self.participants.find_active_participant(thread_id, user_id).await?;

        // An existing row pins the organization its roster summary describes.
        let organization_id = match &existing {
            Some(participant) => participant.organization_id.clone(),
            None => options.organization_id.unwrap_or_else(|| thread.organization_id.clone()),
        };
        let organization = self
            .directory
            .find_organization(&organization_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("organization", organization_id.0.clone()))?;
        let profile = self.directory.find_user(user_id).await?;

        if let Some(participant) = existing {
            let summary = participant_summary(&participant, profile.as_ref(), &organization);
            let metadata = self.sync_participant_metadata(&thread, summary).await?;
            return Ok(EnsuredParticipant { participant, created: false, provider: None, metadata });
        }

        if !self.directory.is_member(user_id, &organization_id).await? {
            return Err(ApplicationError::Forbidden {
                user_id: user_id.0.clone(),
                organization_id: organization_id.0.clone(),
            });
        }

        let role =
            options.role_override.unwrap_or_else(|| organization.org_type.default_participant_role());
        let identity = external_identity(role, user_id);
        let external_role_id = self.settings.role_id(role).to_string();

        let now = Utc::now();
        let participant = self
            .participants
            .upsert_participant(&Participant {
                id: ParticipantId(Uuid::new_v4().to_string()),
                thread_id: thread.id.clone(),
                user_id: user_id.clone(),
                organization_id: organization.id.clone(),
                role,
                identity,
                external_role_id,
                joined_at: now,
                left_at: None,
                updated_at: now,
            })
            .await?;
        info!(
            event_name = "conversations.participant.added",
            quote_id = %thread.quote_id.0,
            thread_id = %thread.id.0,
            user_id = %user_id.0,
            role = participant.role.as_str(),
            "participant added to thread"
        );

        let provider = best_effort(
            "add_participant",
            self.settings.provider_timeout(),
            &thread.external_conversation_id,
            self.provider.add_participant(
                &thread.external_conversation_id,
                &participant.identity,
                &participant.external_role_id,
            ),
        )
        .await;

        let summary = participant_summary(&participant, profile.as_ref(), &organization);
        let metadata = self.sync_participant_metadata(&thread, summary).await?;

        Ok(EnsuredParticipant { participant, created: true, provider: Some(provider), metadata })
    }

    /// Soft-removes an active participant. The roster entry in the thread
    /// metadata is kept as display history.
    pub async fn remove_participant(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<(), ApplicationError> {
        let thread = self.load_thread(thread_id).await?;
        if !self.participants.mark_participant_left(&thread.id, user_id).await? {
            return Err(ApplicationError::not_found(
                "participant",
                format!("{}/{}", thread.id.0, user_id.0),
            ));
        }
        info!(
            event_name = "conversations.participant.removed",
            quote_id = %thread.quote_id.0,
            thread_id = %thread.id.0,
            user_id = %user_id.0,
            "participant left thread"
        );
        Ok(())
    }

    pub async fn list_participants(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Vec<Participant>, ApplicationError> {
        let thread = self.load_thread(thread_id).await?;
        Ok(self.participants.list_active_participants(&thread.id).await?)
    }

    pub(crate) async fn load_thread(&self, thread_id: &ThreadId) -> Result<Thread, ApplicationError> {
        self.threads
            .find_thread(thread_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("thread", thread_id.0.clone()))
    }
}

fn participant_summary(
    participant: &Participant,
    profile: Option<&UserProfile>,
    organization: &OrganizationSummary,
) -> ParticipantSummary {
    ParticipantSummary {
        id: participant.user_id.clone(),
        identity: participant.identity.clone(),
        role: participant.role,
        display_name: profile.map(|profile| profile.display_name.clone()),
        organization_id: Some(organization.id.clone()),
        organization_name: Some(organization.name.clone()),
        organization_logo_url: organization.logo_url.clone(),
        location_label: organization.location_label.clone(),
        extra: Map::new(),
    }
}
