use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversations::participants::ParticipantOptions;
use crate::conversations::scope::{resolve_scope, ResolvedScope, ScopeOverrides};
use crate::conversations::sync::call_with_timeout;
use crate::conversations::ConversationService;
use crate::domain::metadata::ThreadMetadata;
use crate::domain::organization::OrganizationId;
use crate::domain::participant::ParticipantRole;
use crate::domain::quote::{QuoteContext, QuoteId};
use crate::domain::thread::{external_unique_name, Thread, ThreadId, ThreadStatus};
use crate::domain::user::UserId;
use crate::errors::{ApplicationError, DomainError};
use crate::ports::{ExternalConversation, ProviderError, StoreError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnsuredThread {
    pub thread: Thread,
    pub quote: QuoteContext,
    /// `true` only for the caller whose insert created the row.
    pub created: bool,
}

impl ConversationService {
    pub async fn resolve_quote_scope(
        &self,
        quote_id: &QuoteId,
        overrides: &ScopeOverrides,
    ) -> Result<(QuoteContext, ResolvedScope), ApplicationError> {
        let quote = self
            .directory
            .find_quote(quote_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("quote", quote_id.0.clone()))?;
        let resolved = resolve_scope(&quote, overrides);
        Ok((quote, resolved))
    }

    /// Returns the thread serving `quote_id` under the requested scope,
    /// creating the provider conversation and the row when none exists.
    ///
    /// Safe to call concurrently for the same scope: every caller observes
    /// the same thread row and provider conversation.
    pub async fn ensure_thread_for_quote(
        &self,
        quote_id: &QuoteId,
        initiator: &UserId,
        overrides: ScopeOverrides,
    ) -> Result<EnsuredThread, ApplicationError> {
        let (quote, resolved) = self.resolve_quote_scope(quote_id, &overrides).await?;

        let (thread, created) = match self.search_thread(&quote, &resolved).await? {
            Some(existing) => (self.reconcile_existing(existing, &quote, &resolved).await?, false),
            None => self.create_thread(&quote, &resolved, initiator).await?,
        };

        self.seed_participants(&thread, &quote, initiator).await;

        let thread = self.threads.find_thread(&thread.id).await?.unwrap_or(thread);
        Ok(EnsuredThread { thread, quote, created })
    }

    async fn search_thread(
        &self,
        quote: &QuoteContext,
        resolved: &ResolvedScope,
    ) -> Result<Option<Thread>, ApplicationError> {
        if resolved.scoped {
            if let Some(thread) = self.threads.find_by_quote_scope(&quote.id, &resolved.filter).await?
            {
                debug!(
                    event_name = "conversations.thread.found_by_quote_scope",
                    quote_id = %quote.id.0,
                    thread_id = %thread.id.0,
                    "matched scoped thread for quote"
                );
                return Ok(Some(thread));
            }

            if let Some(shipment_id) = resolved.scope.shipment_id.as_ref() {
                if let Some(thread) =
                    self.threads.find_by_shipment_scope(shipment_id, &resolved.filter).await?
                {
                    debug!(
                        event_name = "conversations.thread.found_by_shipment_scope",
                        quote_id = %quote.id.0,
                        thread_id = %thread.id.0,
                        shipment_id = %shipment_id.0,
                        "matched shipment thread created for another quote"
                    );
                    return Ok(Some(thread));
                }
            }
        }

        let fallback = self.threads.find_first_for_quote(&quote.id).await?;
        Ok(fallback.filter(|thread| {
            let accepted = !resolved.scoped || resolved.filter.accepts_fallback(&thread.scope);
            debug!(
                event_name = "conversations.thread.fallback_candidate",
                quote_id = %quote.id.0,
                thread_id = %thread.id.0,
                accepted,
                "evaluated quote fallback thread"
            );
            accepted
        }))
    }

    /// Merges the resolved scope into a located thread, promoting its scope
    /// columns when the request narrows them.
    async fn reconcile_existing(
        &self,
        mut thread: Thread,
        quote: &QuoteContext,
        resolved: &ResolvedScope,
    ) -> Result<Thread, ApplicationError> {
        let target_scope = resolved.promoted_scope(&thread.scope);

        let mut metadata = thread.metadata.clone();
        metadata.apply_scope(&target_scope);
        metadata.apply_quote(quote);

        if target_scope != thread.scope {
            self.threads.update_thread_scope(&thread.id, &target_scope, &metadata).await?;
            info!(
                event_name = "conversations.thread.scope_promoted",
                quote_id = %quote.id.0,
                thread_id = %thread.id.0,
                "promoted thread scope"
            );
            thread.scope = target_scope;
            thread.metadata = metadata;
        } else if metadata != thread.metadata {
            self.threads.update_thread_metadata(&thread.id, &metadata).await?;
            thread.metadata = metadata;
        }

        Ok(thread)
    }

    async fn create_thread(
        &self,
        quote: &QuoteContext,
        resolved: &ResolvedScope,
        initiator: &UserId,
    ) -> Result<(Thread, bool), ApplicationError> {
        let scope = resolved.persisted_scope();
        let unique_name = external_unique_name(&quote.id, resolved.scoped.then_some(&scope));

        let mut metadata = ThreadMetadata::default();
        metadata.apply_quote(quote);
        metadata.apply_scope(&scope);

        let conversation = self.open_conversation(quote, &unique_name, &metadata).await?;

        let now = Utc::now();
        let thread = Thread {
            id: ThreadId(Uuid::new_v4().to_string()),
            quote_id: quote.id.clone(),
            organization_id: quote.owner_org_id.clone(),
            scope,
            external_conversation_id: conversation.id,
            external_unique_name: unique_name,
            status: ThreadStatus::Active,
            metadata,
            created_by: initiator.clone(),
            created_at: now,
            updated_at: now,
        };

        match self.threads.insert_thread(&thread).await {
            Ok(()) => {
                info!(
                    event_name = "conversations.thread.created",
                    quote_id = %quote.id.0,
                    thread_id = %thread.id.0,
                    unique_name = %thread.external_unique_name,
                    scoped = resolved.scoped,
                    "created conversation thread"
                );
                Ok((thread, true))
            }
            Err(StoreError::UniqueViolation(detail)) => {
                info!(
                    event_name = "conversations.thread.insert_race_lost",
                    quote_id = %quote.id.0,
                    unique_name = %thread.external_unique_name,
                    detail = %detail,
                    "concurrent caller inserted the thread first; re-running search"
                );
                match self.search_thread(quote, resolved).await? {
                    Some(winner) => Ok((winner, false)),
                    None => Err(DomainError::InvariantViolation(format!(
                        "thread `{}` rejected as duplicate but no winner row is visible",
                        thread.external_unique_name
                    ))
                    .into()),
                }
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Creates the provider conversation, adopting an existing one when a
    /// concurrent caller created it first.
    async fn open_conversation(
        &self,
        quote: &QuoteContext,
        unique_name: &str,
        metadata: &ThreadMetadata,
    ) -> Result<ExternalConversation, ApplicationError> {
        let timeout = self.settings.provider_timeout();
        let attributes = metadata.to_json();
        let friendly_name = quote.friendly_name();

        let created = call_with_timeout(
            "create_conversation",
            timeout,
            self.provider.create_conversation(unique_name, &friendly_name, &attributes),
        )
        .await;

        match created {
            Ok(conversation) => Ok(conversation),
            Err(ProviderError::Conflict { .. }) => {
                info!(
                    event_name = "conversations.provider.create_conflict",
                    quote_id = %quote.id.0,
                    unique_name,
                    "conversation already exists; fetching it"
                );
                let conversation = call_with_timeout(
                    "fetch_conversation",
                    timeout,
                    self.provider.fetch_conversation(unique_name),
                )
                .await?;
                Ok(conversation)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Adds the quote submitter and the scope organizations' members.
    /// Each seed is independent and failures only reach the log.
    async fn seed_participants(&self, thread: &Thread, quote: &QuoteContext, initiator: &UserId) {
        let mut seeds: Vec<(UserId, OrganizationId, ParticipantRole)> = Vec::new();

        if let Some(submitter) = quote.submitted_by.as_ref().filter(|user| *user != initiator) {
            let organization_id = thread
                .scope
                .requester_branch_org_id
                .clone()
                .unwrap_or_else(|| quote.owner_org_id.clone());
            seeds.push((submitter.clone(), organization_id, ParticipantRole::Requester));
        }

        let branches = [
            (thread.scope.requester_branch_org_id.as_ref(), ParticipantRole::Requester),
            (thread.scope.provider_branch_org_id.as_ref(), ParticipantRole::Provider),
        ];
        for (branch, role) in branches {
            let Some(organization_id) = branch else {
                continue;
            };
            match self.directory.list_organization_members(organization_id).await {
                Ok(members) => {
                    for member in members {
                        if seeds.iter().all(|(seeded, _, _)| seeded != &member) {
                            seeds.push((member, organization_id.clone(), role));
                        }
                    }
                }
                Err(error) => warn!(
                    event_name = "conversations.seed.members_unavailable",
                    thread_id = %thread.id.0,
                    organization_id = %organization_id.0,
                    error = %error,
                    "could not list organization members for seeding"
                ),
            }
        }

        for (user_id, organization_id, role) in seeds {
            let options = ParticipantOptions {
                organization_id: Some(organization_id.clone()),
                role_override: Some(role),
            };
            if let Err(error) = self.ensure_participant_in_thread(&thread.id, &user_id, options).await
            {
                warn!(
                    event_name = "conversations.seed.participant_failed",
                    thread_id = %thread.id.0,
                    user_id = %user_id.0,
                    organization_id = %organization_id.0,
                    error = %error,
                    "failed to seed participant; continuing"
                );
            }
        }
    }
}
