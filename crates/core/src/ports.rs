//! Narrow contracts the conversation engine drives: the relational store
//! (threads, participants and the read-only directory) and the external
//! real-time messaging provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::conversations::scope::ScopeFilter;
use crate::domain::metadata::ThreadMetadata;
use crate::domain::organization::{OrganizationId, OrganizationMembership, OrganizationSummary};
use crate::domain::participant::Participant;
use crate::domain::quote::{QuoteContext, QuoteId, ShipmentId};
use crate::domain::thread::{Thread, ThreadId, ThreadScope};
use crate::domain::user::{UserId, UserProfile};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// An insert lost a race against a concurrent writer for the same unique key.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("conversation `{unique_name}` already exists")]
    Conflict { unique_name: String },
    #[error("provider resource `{0}` was not found")]
    NotFound(String),
    #[error("provider rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("provider transport failure: {0}")]
    Transport(String),
    #[error("provider call `{operation}` timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },
}

/// Provider-side conversation as returned by create/fetch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalConversation {
    pub id: String,
    pub unique_name: String,
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn find_thread(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError>;

    /// Active thread for `quote_id` whose scope columns satisfy `filter`.
    async fn find_by_quote_scope(
        &self,
        quote_id: &QuoteId,
        filter: &ScopeFilter,
    ) -> Result<Option<Thread>, StoreError>;

    /// Active thread for `shipment_id` whose branch columns satisfy `filter`,
    /// regardless of which quote created it.
    async fn find_by_shipment_scope(
        &self,
        shipment_id: &ShipmentId,
        filter: &ScopeFilter,
    ) -> Result<Option<Thread>, StoreError>;

    /// Oldest active thread for the quote, scoped or not.
    async fn find_first_for_quote(&self, quote_id: &QuoteId)
        -> Result<Option<Thread>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when an active thread already
    /// holds the same unique name or scope.
    async fn insert_thread(&self, thread: &Thread) -> Result<(), StoreError>;

    async fn update_thread_scope(
        &self,
        id: &ThreadId,
        scope: &ThreadScope,
        metadata: &ThreadMetadata,
    ) -> Result<(), StoreError>;

    async fn update_thread_metadata(
        &self,
        id: &ThreadId,
        metadata: &ThreadMetadata,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ParticipantStore: Send + Sync {
    async fn find_active_participant(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, StoreError>;

    /// Insert or update in place, keyed on (thread, user). Re-activates a
    /// participant that had left.
    async fn upsert_participant(&self, participant: &Participant)
        -> Result<Participant, StoreError>;

    async fn list_active_participants(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Vec<Participant>, StoreError>;

    /// Soft removal. Returns `false` when no active row existed.
    async fn mark_participant_left(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<bool, StoreError>;
}

/// Read-only view over the quoting and identity subsystems.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_quote(&self, id: &QuoteId) -> Result<Option<QuoteContext>, StoreError>;

    async fn find_organization(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<OrganizationSummary>, StoreError>;

    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>, StoreError>;

    async fn is_member(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<bool, StoreError>;

    async fn list_memberships(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrganizationMembership>, StoreError>;

    async fn list_organization_members(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<UserId>, StoreError>;

    async fn list_open_quotes(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<QuoteContext>, StoreError>;
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Must report [`ProviderError::Conflict`] when `unique_name` is taken.
    async fn create_conversation(
        &self,
        unique_name: &str,
        friendly_name: &str,
        attributes: &Value,
    ) -> Result<ExternalConversation, ProviderError>;

    async fn fetch_conversation(
        &self,
        unique_name: &str,
    ) -> Result<ExternalConversation, ProviderError>;

    async fn update_conversation_attributes(
        &self,
        conversation_id: &str,
        attributes: &Value,
    ) -> Result<(), ProviderError>;

    async fn add_participant(
        &self,
        conversation_id: &str,
        identity: &str,
        role_id: &str,
    ) -> Result<(), ProviderError>;
}
