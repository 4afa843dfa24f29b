use serde::Serialize;
use tracing::debug;

use crate::conversations::sync::{best_effort, ProviderSync};
use crate::conversations::ConversationService;
use crate::domain::metadata::ParticipantSummary;
use crate::domain::thread::Thread;
use crate::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetadataSyncOutcome {
    /// The merged document equals the stored one; nothing was written.
    Unchanged,
    Persisted { provider: ProviderSync },
}

impl ConversationService {
    /// Merges `summary` into the thread's metadata document, persists it when
    /// it changed and mirrors it to the provider conversation attributes.
    pub async fn sync_participant_metadata(
        &self,
        thread: &Thread,
        summary: ParticipantSummary,
    ) -> Result<MetadataSyncOutcome, ApplicationError> {
        let before = thread.metadata.to_json();

        let mut metadata = thread.metadata.clone();
        metadata.apply_scope(&thread.scope);
        metadata.claim_role_display(&summary);
        metadata.upsert_participant(summary);

        let after = metadata.to_json();
        if before == after {
            debug!(
                event_name = "conversations.metadata.unchanged",
                thread_id = %thread.id.0,
                "metadata already up to date"
            );
            return Ok(MetadataSyncOutcome::Unchanged);
        }

        self.threads.update_thread_metadata(&thread.id, &metadata).await?;

        let provider = best_effort(
            "update_conversation_attributes",
            self.settings.provider_timeout(),
            &thread.external_conversation_id,
            self.provider.update_conversation_attributes(&thread.external_conversation_id, &after),
        )
        .await;

        Ok(MetadataSyncOutcome::Persisted { provider })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{json, Map};

    use super::MetadataSyncOutcome;
    use crate::conversations::fixtures::{harness, Harness};
    use crate::conversations::sync::ProviderSync;
    use crate::domain::metadata::{ParticipantSummary, ThreadMetadata};
    use crate::domain::organization::OrganizationId;
    use crate::domain::participant::ParticipantRole;
    use crate::domain::quote::{QuoteId, ShipmentId};
    use crate::domain::thread::{Thread, ThreadId, ThreadScope, ThreadStatus};
    use crate::domain::user::UserId;
    use crate::ports::ThreadStore;

    async fn stored_thread(h: &Harness, metadata: ThreadMetadata) -> Thread {
        let conversation = h.provider.seed_conversation("quote::Q1");
        let now = Utc::now();
        let thread = Thread {
            id: ThreadId("T1".to_string()),
            quote_id: QuoteId("Q1".to_string()),
            organization_id: OrganizationId("org-gallery".to_string()),
            scope: ThreadScope {
                shipment_id: Some(ShipmentId("SHP-1".to_string())),
                ..ThreadScope::default()
            },
            external_conversation_id: conversation.id,
            external_unique_name: conversation.unique_name,
            status: ThreadStatus::Active,
            metadata,
            created_by: UserId("u-gallery".to_string()),
            created_at: now,
            updated_at: now,
        };
        h.threads.insert_thread(&thread).await.expect("thread stored");
        thread
    }

    async fn reload(h: &Harness) -> Thread {
        h.threads
            .find_thread(&ThreadId("T1".to_string()))
            .await
            .expect("lookup succeeds")
            .expect("thread exists")
    }

    fn summary(user: &str, role: ParticipantRole, name: &str) -> ParticipantSummary {
        ParticipantSummary {
            id: UserId(user.to_string()),
            identity: format!("{}:{user}", role.as_str()),
            role,
            display_name: Some(name.to_string()),
            organization_id: Some(OrganizationId("org-gallery".to_string())),
            organization_name: Some("Gallery".to_string()),
            organization_logo_url: None,
            location_label: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn merge_keeps_other_roster_entries_and_unknown_keys() {
        let h = harness();
        let mut existing = ThreadMetadata::from_json(json!({"pinned": true}));
        let mut b = summary("b", ParticipantRole::Provider, "Bea");
        b.extra.insert("badge".to_string(), json!("vip"));
        existing.upsert_participant(b);
        let thread = stored_thread(&h, existing).await;

        let outcome = h
            .service
            .sync_participant_metadata(&thread, summary("a", ParticipantRole::Requester, "Ada"))
            .await
            .expect("sync succeeds");

        assert_eq!(outcome, MetadataSyncOutcome::Persisted { provider: ProviderSync::Synced });
        let stored = reload(&h).await.metadata;
        assert_eq!(stored.participants.len(), 2);
        let b = stored.roster_entry(&UserId("b".to_string())).expect("b kept");
        assert_eq!(b.display_name.as_deref(), Some("Bea"));
        assert_eq!(b.extra.get("badge"), Some(&json!("vip")));
        assert_eq!(stored.extra.get("pinned"), Some(&json!(true)));
        assert_eq!(stored.shipment_id, Some(ShipmentId("SHP-1".to_string())));
        assert_eq!(stored.partner_name.as_deref(), Some("Ada"));

        let mirrored =
            h.provider.attributes(&thread.external_conversation_id).expect("attributes pushed");
        assert_eq!(mirrored["participants"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn unchanged_summary_is_not_written_twice() {
        let h = harness();
        let thread = stored_thread(&h, ThreadMetadata::default()).await;

        let first = h
            .service
            .sync_participant_metadata(&thread, summary("a", ParticipantRole::Requester, "Ada"))
            .await
            .expect("first sync");
        let current = reload(&h).await;
        let second = h
            .service
            .sync_participant_metadata(&current, summary("a", ParticipantRole::Requester, "Ada"))
            .await
            .expect("second sync");

        assert!(matches!(first, MetadataSyncOutcome::Persisted { .. }));
        assert_eq!(second, MetadataSyncOutcome::Unchanged);
        assert_eq!(h.threads.metadata_writes(), 1);
    }

    #[tokio::test]
    async fn later_participant_does_not_replace_primary_display() {
        let h = harness();
        let thread = stored_thread(&h, ThreadMetadata::default()).await;

        let _ = h
            .service
            .sync_participant_metadata(&thread, summary("a", ParticipantRole::Requester, "Ada"))
            .await
            .expect("first sync");
        let current = reload(&h).await;
        let _ = h
            .service
            .sync_participant_metadata(&current, summary("c", ParticipantRole::Requester, "Cy"))
            .await
            .expect("second sync");

        let stored = reload(&h).await.metadata;
        assert_eq!(stored.partner_name.as_deref(), Some("Ada"));
        assert_eq!(stored.participants.len(), 2);
    }
}
