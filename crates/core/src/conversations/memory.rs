//! In-process implementations of the store and provider ports.
//!
//! Used by the engine's tests and by local runs without a provider account.
//! They enforce the same uniqueness rules as the SQL schema so race handling
//! can be exercised without a database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::conversations::scope::ScopeFilter;
use crate::domain::metadata::ThreadMetadata;
use crate::domain::organization::{OrganizationId, OrganizationMembership, OrganizationSummary};
use crate::domain::participant::Participant;
use crate::domain::quote::{QuoteContext, QuoteId, QuoteStatus, ShipmentId};
use crate::domain::thread::{Thread, ThreadId, ThreadScope};
use crate::domain::user::{UserId, UserProfile};
use crate::ports::{
    DirectoryStore, ExternalConversation, MessagingProvider, ParticipantStore, ProviderError,
    StoreError, ThreadStore,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Default)]
pub struct InMemoryThreadStore {
    threads: Mutex<Vec<Thread>>,
    metadata_writes: AtomicUsize,
}

impl InMemoryThreadStore {
    pub fn threads(&self) -> Vec<Thread> {
        lock(&self.threads).clone()
    }

    /// Number of metadata-only updates issued against the store.
    pub fn metadata_writes(&self) -> usize {
        self.metadata_writes.load(Ordering::SeqCst)
    }

    fn find_active<P>(&self, predicate: P) -> Option<Thread>
    where
        P: Fn(&Thread) -> bool,
    {
        lock(&self.threads).iter().find(|thread| thread.is_active() && predicate(thread)).cloned()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn find_thread(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        Ok(lock(&self.threads).iter().find(|thread| &thread.id == id).cloned())
    }

    async fn find_by_quote_scope(
        &self,
        quote_id: &QuoteId,
        filter: &ScopeFilter,
    ) -> Result<Option<Thread>, StoreError> {
        Ok(self.find_active(|thread| &thread.quote_id == quote_id && filter.matches(&thread.scope)))
    }

    async fn find_by_shipment_scope(
        &self,
        shipment_id: &ShipmentId,
        filter: &ScopeFilter,
    ) -> Result<Option<Thread>, StoreError> {
        Ok(self.find_active(|thread| {
            thread.scope.shipment_id.as_ref() == Some(shipment_id)
                && filter.matches_branches(&thread.scope)
        }))
    }

    async fn find_first_for_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Option<Thread>, StoreError> {
        Ok(self.find_active(|thread| &thread.quote_id == quote_id))
    }

    async fn insert_thread(&self, thread: &Thread) -> Result<(), StoreError> {
        let mut threads = lock(&self.threads);
        let duplicate = threads.iter().filter(|existing| existing.is_active()).find(|existing| {
            existing.id == thread.id
                || existing.external_unique_name == thread.external_unique_name
                || (existing.quote_id == thread.quote_id && existing.scope == thread.scope)
        });
        if let Some(existing) = duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "conversation_thread conflicts with `{}`",
                existing.id.0
            )));
        }
        threads.push(thread.clone());
        Ok(())
    }

    async fn update_thread_scope(
        &self,
        id: &ThreadId,
        scope: &ThreadScope,
        metadata: &ThreadMetadata,
    ) -> Result<(), StoreError> {
        let mut threads = lock(&self.threads);
        let quote_id = threads
            .iter()
            .find(|thread| &thread.id == id)
            .map(|thread| thread.quote_id.clone())
            .ok_or_else(|| StoreError::Backend(format!("thread `{}` does not exist", id.0)))?;
        let taken = threads.iter().any(|existing| {
            existing.is_active()
                && &existing.id != id
                && existing.quote_id == quote_id
                && &existing.scope == scope
        });
        if taken {
            return Err(StoreError::UniqueViolation(format!(
                "scope already held by another thread of quote `{}`",
                quote_id.0
            )));
        }

        let thread = threads
            .iter_mut()
            .find(|thread| &thread.id == id)
            .ok_or_else(|| StoreError::Backend(format!("thread `{}` does not exist", id.0)))?;
        thread.scope = scope.clone();
        thread.metadata = metadata.clone();
        thread.updated_at = Utc::now();
        Ok(())
    }

    async fn update_thread_metadata(
        &self,
        id: &ThreadId,
        metadata: &ThreadMetadata,
    ) -> Result<(), StoreError> {
        let mut threads = lock(&self.threads);
        let thread = threads
            .iter_mut()
            .find(|thread| &thread.id == id)
            .ok_or_else(|| StoreError::Backend(format!("thread `{}` does not exist", id.0)))?;
        thread.metadata = metadata.clone();
        thread.updated_at = Utc::now();
        self.metadata_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryParticipantStore {
    participants: Mutex<Vec<Participant>>,
    failing_users: Mutex<HashSet<UserId>>,
}

impl InMemoryParticipantStore {
    pub fn participants(&self) -> Vec<Participant> {
        lock(&self.participants).clone()
    }

    /// Makes every upsert for `user_id` fail with a backend error.
    pub fn fail_upserts_for(&self, user_id: UserId) {
        lock(&self.failing_users).insert(user_id);
    }
}

#[async_trait]
impl ParticipantStore for InMemoryParticipantStore {
    async fn find_active_participant(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, StoreError> {
        Ok(lock(&self.participants)
            .iter()
            .find(|row| &row.thread_id == thread_id && &row.user_id == user_id && row.is_active())
            .cloned())
    }

    async fn upsert_participant(
        &self,
        participant: &Participant,
    ) -> Result<Participant, StoreError> {
        if lock(&self.failing_users).contains(&participant.user_id) {
            return Err(StoreError::Backend(format!(
                "participant write rejected for `{}`",
                participant.user_id.0
            )));
        }

        let mut participants = lock(&self.participants);
        let existing = participants.iter_mut().find(|row| {
            row.thread_id == participant.thread_id && row.user_id == participant.user_id
        });
        match existing {
            Some(row) => {
                if !row.is_active() {
                    row.joined_at = participant.joined_at;
                }
                row.organization_id = participant.organization_id.clone();
                row.role = participant.role;
                row.identity = participant.identity.clone();
                row.external_role_id = participant.external_role_id.clone();
                row.left_at = None;
                row.updated_at = participant.updated_at;
                Ok(row.clone())
            }
            None => {
                participants.push(participant.clone());
                Ok(participant.clone())
            }
        }
    }

    async fn list_active_participants(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Vec<Participant>, StoreError> {
        Ok(lock(&self.participants)
            .iter()
            .filter(|row| &row.thread_id == thread_id && row.is_active())
            .cloned()
            .collect())
    }

    async fn mark_participant_left(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<bool, StoreError> {
        let mut participants = lock(&self.participants);
        let row = participants
            .iter_mut()
            .find(|row| &row.thread_id == thread_id && &row.user_id == user_id && row.is_active());
        match row {
            Some(row) => {
                let now = Utc::now();
                row.left_at = Some(now);
                row.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Fixed directory assembled with the `with_*` builders.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    quotes: Vec<QuoteContext>,
    organizations: BTreeMap<OrganizationId, OrganizationSummary>,
    users: BTreeMap<UserId, UserProfile>,
    memberships: Vec<OrganizationMembership>,
}

impl InMemoryDirectory {
    pub fn with_quote(mut self, quote: QuoteContext) -> Self {
        self.quotes.retain(|existing| existing.id != quote.id);
        self.quotes.push(quote);
        self
    }

    pub fn with_organization(mut self, organization: OrganizationSummary) -> Self {
        self.organizations.insert(organization.id.clone(), organization);
        self
    }

    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }

    pub fn with_membership(mut self, user_id: &str, organization_id: &str) -> Self {
        self.memberships.push(OrganizationMembership {
            user_id: UserId(user_id.to_string()),
            organization_id: OrganizationId(organization_id.to_string()),
            member_role: None,
        });
        self
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn find_quote(&self, id: &QuoteId) -> Result<Option<QuoteContext>, StoreError> {
        Ok(self.quotes.iter().find(|quote| &quote.id == id).cloned())
    }

    async fn find_organization(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<OrganizationSummary>, StoreError> {
        Ok(self.organizations.get(id).cloned())
    }

    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.get(id).cloned())
    }

    async fn is_member(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<bool, StoreError> {
        Ok(self.memberships.iter().any(|membership| {
            &membership.user_id == user_id && &membership.organization_id == organization_id
        }))
    }

    async fn list_memberships(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrganizationMembership>, StoreError> {
        Ok(self
            .memberships
            .iter()
            .filter(|membership| &membership.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_organization_members(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .memberships
            .iter()
            .filter(|membership| &membership.organization_id == organization_id)
            .map(|membership| membership.user_id.clone())
            .collect())
    }

    async fn list_open_quotes(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<QuoteContext>, StoreError> {
        Ok(self
            .quotes
            .iter()
            .filter(|quote| {
                &quote.owner_org_id == organization_id && quote.status == QuoteStatus::Open
            })
            .cloned()
            .collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderCall {
    CreateConversation { unique_name: String },
    FetchConversation { unique_name: String },
    UpdateAttributes { conversation_id: String },
    AddParticipant { conversation_id: String, identity: String, role_id: String },
}

#[derive(Debug, Default)]
struct ProviderState {
    conversations: Vec<ExternalConversation>,
    attributes: HashMap<String, Value>,
    members: HashMap<String, Vec<String>>,
    calls: Vec<ProviderCall>,
    failing_creates: HashSet<String>,
    failing_operations: HashSet<&'static str>,
}

/// Provider fake with create-by-unique-name conflict semantics, a call log
/// and injectable failures.
#[derive(Debug, Default)]
pub struct InMemoryMessagingProvider {
    state: Mutex<ProviderState>,
    latency: Duration,
}

impl InMemoryMessagingProvider {
    /// Every call sleeps for `latency` before touching shared state.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency, ..Self::default() }
    }

    /// Registers a conversation as if another process had created it.
    pub fn seed_conversation(&self, unique_name: &str) -> ExternalConversation {
        let mut state = lock(&self.state);
        let conversation = ExternalConversation {
            id: format!("CH{:04}", state.conversations.len() + 1),
            unique_name: unique_name.to_string(),
        };
        state.conversations.push(conversation.clone());
        conversation
    }

    pub fn fail_create_for(&self, unique_name: &str) {
        lock(&self.state).failing_creates.insert(unique_name.to_string());
    }

    /// Makes every call of the named port operation fail with a transport
    /// error, e.g. `"add_participant"`.
    pub fn fail_operation(&self, operation: &'static str) {
        lock(&self.state).failing_operations.insert(operation);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.state).calls.clone()
    }

    pub fn conversation_count(&self) -> usize {
        lock(&self.state).conversations.len()
    }

    pub fn attributes(&self, conversation_id: &str) -> Option<Value> {
        lock(&self.state).attributes.get(conversation_id).cloned()
    }

    pub fn members(&self, conversation_id: &str) -> Vec<String> {
        lock(&self.state).members.get(conversation_id).cloned().unwrap_or_default()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check_operation(state: &ProviderState, operation: &'static str) -> Result<(), ProviderError> {
        if state.failing_operations.contains(operation) {
            return Err(ProviderError::Transport(format!("{operation} is unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for InMemoryMessagingProvider {
    async fn create_conversation(
        &self,
        unique_name: &str,
        _friendly_name: &str,
        attributes: &Value,
    ) -> Result<ExternalConversation, ProviderError> {
        self.simulate_latency().await;
        let mut state = lock(&self.state);
        state
            .calls
            .push(ProviderCall::CreateConversation { unique_name: unique_name.to_string() });
        Self::check_operation(&state, "create_conversation")?;

        if state.failing_creates.contains(unique_name) {
            return Err(ProviderError::Rejected {
                status: 500,
                message: format!("create failed for `{unique_name}`"),
            });
        }
        if state.conversations.iter().any(|existing| existing.unique_name == unique_name) {
            return Err(ProviderError::Conflict { unique_name: unique_name.to_string() });
        }

        let conversation = ExternalConversation {
            id: format!("CH{:04}", state.conversations.len() + 1),
            unique_name: unique_name.to_string(),
        };
        state.attributes.insert(conversation.id.clone(), attributes.clone());
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn fetch_conversation(
        &self,
        unique_name: &str,
    ) -> Result<ExternalConversation, ProviderError> {
        self.simulate_latency().await;
        let mut state = lock(&self.state);
        state.calls.push(ProviderCall::FetchConversation { unique_name: unique_name.to_string() });
        Self::check_operation(&state, "fetch_conversation")?;

        state
            .conversations
            .iter()
            .find(|existing| existing.unique_name == unique_name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(unique_name.to_string()))
    }

    async fn update_conversation_attributes(
        &self,
        conversation_id: &str,
        attributes: &Value,
    ) -> Result<(), ProviderError> {
        self.simulate_latency().await;
        let mut state = lock(&self.state);
        state
            .calls
            .push(ProviderCall::UpdateAttributes { conversation_id: conversation_id.to_string() });
        Self::check_operation(&state, "update_conversation_attributes")?;

        state.attributes.insert(conversation_id.to_string(), attributes.clone());
        Ok(())
    }

    async fn add_participant(
        &self,
        conversation_id: &str,
        identity: &str,
        role_id: &str,
    ) -> Result<(), ProviderError> {
        self.simulate_latency().await;
        let mut state = lock(&self.state);
        state.calls.push(ProviderCall::AddParticipant {
            conversation_id: conversation_id.to_string(),
            identity: identity.to_string(),
            role_id: role_id.to_string(),
        });
        Self::check_operation(&state, "add_participant")?;

        if !state.conversations.iter().any(|existing| existing.id == conversation_id) {
            return Err(ProviderError::NotFound(conversation_id.to_string()));
        }
        let members = state.members.entry(conversation_id.to_string()).or_default();
        if !members.iter().any(|member| member == identity) {
            members.push(identity.to_string());
        }
        Ok(())
    }
}
