pub mod config;
pub mod conversations;
pub mod domain;
pub mod errors;
pub mod ports;

pub use conversations::{
    ConversationService, ConversationSettings, EnsuredParticipant, EnsuredThread,
    MetadataSyncOutcome, ParticipantOptions, ProviderSync, ProvisioningOptions,
    ProvisioningReport, ScopeField, ScopeOverrides, SkippedQuote,
};
pub use domain::metadata::{ParticipantSummary, ThreadMetadata};
pub use domain::organization::{OrganizationId, OrganizationSummary, OrganizationType};
pub use domain::participant::{Participant, ParticipantRole};
pub use domain::quote::{QuoteContext, QuoteId, QuoteStatus, ShipmentId};
pub use domain::thread::{Thread, ThreadId, ThreadScope};
pub use domain::user::{UserId, UserProfile};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ports::{
    DirectoryStore, ExternalConversation, MessagingProvider, ParticipantStore, ProviderError,
    StoreError, ThreadStore,
};
