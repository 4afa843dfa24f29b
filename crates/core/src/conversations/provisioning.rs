use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::conversations::participants::ParticipantOptions;
use crate::conversations::scope::ScopeOverrides;
use crate::conversations::ConversationService;
use crate::domain::organization::OrganizationId;
use crate::domain::quote::QuoteId;
use crate::domain::user::UserId;
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningOptions {
    /// Restricts provisioning to these organizations. Empty means every
    /// organization the user belongs to.
    #[serde(default)]
    pub organization_ids: Vec<OrganizationId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningReport {
    pub processed_organizations: usize,
    pub ensured_threads: usize,
    pub ensured_participants: usize,
    pub skipped: Vec<SkippedQuote>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedQuote {
    pub organization_id: OrganizationId,
    /// `None` when the organization's quotes could not be listed at all.
    pub quote_id: Option<QuoteId>,
    pub reason: String,
}

impl ConversationService {
    /// Warms up every open-quote conversation for `user_id`.
    ///
    /// Per-quote failures are recorded in [`ProvisioningReport::skipped`] and
    /// never abort the batch.
    pub async fn provision_user_conversations(
        &self,
        user_id: &UserId,
        options: ProvisioningOptions,
    ) -> Result<ProvisioningReport, ApplicationError> {
        let memberships = self.directory.list_memberships(user_id).await?;
        let requested = if options.organization_ids.is_empty() {
            memberships.into_iter().map(|membership| membership.organization_id).collect()
        } else {
            options.organization_ids
        };

        let mut targets: Vec<OrganizationId> = Vec::with_capacity(requested.len());
        for organization_id in requested {
            if !targets.contains(&organization_id) {
                targets.push(organization_id);
            }
        }

        let mut report = ProvisioningReport::default();
        for organization_id in targets {
            report.processed_organizations += 1;

            let quotes = match self.directory.list_open_quotes(&organization_id).await {
                Ok(quotes) => quotes,
                Err(error) => {
                    warn!(
                        event_name = "conversations.provision.quotes_unavailable",
                        user_id = %user_id.0,
                        organization_id = %organization_id.0,
                        error = %error,
                        "skipping organization"
                    );
                    report.skipped.push(SkippedQuote {
                        organization_id,
                        quote_id: None,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            for quote in quotes {
                if let Err(error) =
                    self.provision_quote(&mut report, user_id, &organization_id, &quote.id).await
                {
                    warn!(
                        event_name = "conversations.provision.quote_skipped",
                        user_id = %user_id.0,
                        organization_id = %organization_id.0,
                        quote_id = %quote.id.0,
                        error = %error,
                        "skipping quote"
                    );
                    report.skipped.push(SkippedQuote {
                        organization_id: organization_id.clone(),
                        quote_id: Some(quote.id),
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(
            event_name = "conversations.provision.completed",
            user_id = %user_id.0,
            processed_organizations = report.processed_organizations,
            ensured_threads = report.ensured_threads,
            ensured_participants = report.ensured_participants,
            skipped = report.skipped.len(),
            "provisioned user conversations"
        );
        Ok(report)
    }

    async fn provision_quote(
        &self,
        report: &mut ProvisioningReport,
        user_id: &UserId,
        organization_id: &OrganizationId,
        quote_id: &QuoteId,
    ) -> Result<(), ApplicationError> {
        let ensured =
            self.ensure_thread_for_quote(quote_id, user_id, ScopeOverrides::default()).await?;
        report.ensured_threads += 1;

        let options = ParticipantOptions {
            organization_id: Some(organization_id.clone()),
            role_override: None,
        };
        self.ensure_participant_in_thread(&ensured.thread.id, user_id, options).await?;
        report.ensured_participants += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ProvisioningOptions;
    use crate::conversations::fixtures::{directory, harness, harness_with, quote};
    use crate::conversations::memory::InMemoryMessagingProvider;
    use crate::domain::organization::OrganizationId;
    use crate::domain::quote::{QuoteId, QuoteStatus};
    use crate::domain::user::UserId;

    #[tokio::test]
    async fn one_failing_quote_does_not_abort_the_batch() {
        let mut closed = quote("Q-closed", "org-gallery", None);
        closed.status = QuoteStatus::Closed;
        let directory = directory()
            .with_quote(quote("Q2", "org-gallery", None))
            .with_quote(quote("Q3", "org-gallery", None))
            .with_quote(closed);
        let h = harness_with(directory, InMemoryMessagingProvider::default());
        h.provider.fail_create_for("quote::Q2");

        let report = h
            .service
            .provision_user_conversations(
                &UserId("u-gallery".to_string()),
                ProvisioningOptions::default(),
            )
            .await
            .expect("batch completes");

        assert_eq!(report.processed_organizations, 1);
        assert_eq!(report.ensured_threads, 2);
        assert_eq!(report.ensured_participants, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].quote_id, Some(QuoteId("Q2".to_string())));
    }

    #[tokio::test]
    async fn explicit_organizations_are_deduplicated() {
        let h = harness();

        let report = h
            .service
            .provision_user_conversations(
                &UserId("u-gallery".to_string()),
                ProvisioningOptions {
                    organization_ids: vec![
                        OrganizationId("org-gallery".to_string()),
                        OrganizationId("org-gallery".to_string()),
                    ],
                },
            )
            .await
            .expect("batch completes");

        assert_eq!(report.processed_organizations, 1);
        assert_eq!(report.ensured_threads, 1);
        assert_eq!(report.ensured_participants, 1);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn foreign_organization_quotes_are_skipped_as_forbidden() {
        let directory = directory().with_quote(quote("Q-shipper", "org-shipper", None));
        let h = harness_with(directory, InMemoryMessagingProvider::default());

        let report = h
            .service
            .provision_user_conversations(
                &UserId("u-gallery".to_string()),
                ProvisioningOptions {
                    organization_ids: vec![OrganizationId("org-shipper".to_string())],
                },
            )
            .await
            .expect("batch completes");

        assert_eq!(report.ensured_threads, 1);
        assert_eq!(report.ensured_participants, 0);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.contains("not a member"));
    }
}
