use thiserror::Error;

use crate::ports::{ProviderError, StoreError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("user `{user_id}` is not a member of organization `{organization_id}`")]
    Forbidden { user_id: String, organization_id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<ProviderError> for ApplicationError {
    fn from(value: ProviderError) -> Self {
        Self::Integration(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested conversation resource does not exist.",
            Self::Forbidden { .. } => "You are not allowed to join this conversation.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            error @ ApplicationError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id: unassigned() }
            }
            error @ ApplicationError::Forbidden { .. } => {
                Self::Forbidden { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Domain(DomainError::InvariantViolation(message))
            | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::ports::{ProviderError, StoreError};

    #[test]
    fn not_found_maps_to_not_found_interface_error() {
        let interface = ApplicationError::not_found("quote", "Q-404").into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::NotFound { ref message, ref correlation_id }
                if correlation_id == "req-1" && message.contains("Q-404")
        ));
    }

    #[test]
    fn forbidden_has_user_safe_message() {
        let interface = ApplicationError::Forbidden {
            user_id: "u-1".to_owned(),
            organization_id: "org-9".to_owned(),
        }
        .into_interface("req-2");

        assert_eq!(interface.user_message(), "You are not allowed to join this conversation.");
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn store_and_provider_failures_map_to_service_unavailable() {
        let persistence = ApplicationError::from(StoreError::Backend("database is locked".into()))
            .into_interface("req-3");
        let integration =
            ApplicationError::from(ProviderError::Transport("connection reset".into()))
                .into_interface("req-4");

        assert!(matches!(persistence, InterfaceError::ServiceUnavailable { .. }));
        assert!(matches!(integration, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            persistence.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_and_invariant_errors_map_to_internal() {
        let configuration = ApplicationError::Configuration("missing provider role id".to_owned())
            .into_interface("req-5");
        let invariant = ApplicationError::from(DomainError::InvariantViolation(
            "thread row vanished after unique violation".to_owned(),
        ))
        .into_interface("req-6");

        assert!(matches!(configuration, InterfaceError::Internal { .. }));
        assert!(matches!(invariant, InterfaceError::Internal { .. }));
        assert_eq!(configuration.user_message(), "An unexpected internal error occurred.");
    }
}
