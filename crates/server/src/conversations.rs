//! JSON routes over the conversation engine.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use tradelane_core::{
    ApplicationError, ConversationService, EnsuredParticipant, EnsuredThread, InterfaceError,
    MetadataSyncOutcome, OrganizationId, Participant, ParticipantOptions, ParticipantRole,
    ProviderSync, ProvisioningOptions, ProvisioningReport, QuoteId, ScopeField, ScopeOverrides,
    ShipmentId, Thread, ThreadId, UserId,
};

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ConversationApiState {
    service: ConversationService,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureThreadRequest {
    pub initiator_user_id: UserId,
    #[serde(default)]
    pub shipment_id: ScopeField<ShipmentId>,
    #[serde(default)]
    pub provider_branch_org_id: ScopeField<OrganizationId>,
    #[serde(default)]
    pub requester_branch_org_id: ScopeField<OrganizationId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    #[serde(default)]
    pub organization_ids: Vec<OrganizationId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    pub id: String,
    pub quote_id: String,
    pub organization_id: String,
    pub shipment_id: Option<String>,
    pub requester_branch_org_id: Option<String>,
    pub provider_branch_org_id: Option<String>,
    pub external_conversation_id: String,
    pub external_unique_name: String,
    pub status: &'static str,
    pub metadata: Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Thread> for ThreadView {
    fn from(thread: Thread) -> Self {
        Self {
            metadata: thread.metadata.to_json(),
            status: thread.status.as_str(),
            id: thread.id.0,
            quote_id: thread.quote_id.0,
            organization_id: thread.organization_id.0,
            shipment_id: thread.scope.shipment_id.map(|id| id.0),
            requester_branch_org_id: thread.scope.requester_branch_org_id.map(|id| id.0),
            provider_branch_org_id: thread.scope.provider_branch_org_id.map(|id| id.0),
            external_conversation_id: thread.external_conversation_id,
            external_unique_name: thread.external_unique_name,
            created_by: thread.created_by.0,
            created_at: thread.created_at,
            updated_at: thread.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureThreadResponse {
    pub thread: ThreadView,
    pub quote_title: String,
    pub created: bool,
}

impl From<EnsuredThread> for EnsureThreadResponse {
    fn from(ensured: EnsuredThread) -> Self {
        Self {
            quote_title: ensured.quote.friendly_name(),
            thread: ThreadView::from(ensured.thread),
            created: ensured.created,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub organization_id: String,
    pub role: ParticipantRole,
    pub identity: String,
    pub joined_at: DateTime<Utc>,
}

impl From<Participant> for ParticipantView {
    fn from(participant: Participant) -> Self {
        Self {
            id: participant.id.0,
            thread_id: participant.thread_id.0,
            user_id: participant.user_id.0,
            organization_id: participant.organization_id.0,
            role: participant.role,
            identity: participant.identity,
            joined_at: participant.joined_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantResponse {
    pub participant: ParticipantView,
    pub created: bool,
    pub provider: Option<ProviderSync>,
    pub metadata: MetadataSyncOutcome,
}

impl From<EnsuredParticipant> for AddParticipantResponse {
    fn from(ensured: EnsuredParticipant) -> Self {
        Self {
            participant: ParticipantView::from(ensured.participant),
            created: ensured.created,
            provider: ensured.provider,
            metadata: ensured.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ParticipantListResponse {
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, Some(message.clone()))
            }
            InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, Some(message.clone())),
            InterfaceError::Forbidden { message, .. } => (StatusCode::FORBIDDEN, Some(message.clone())),
            InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, None),
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            detail,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(service: ConversationService) -> Router {
    Router::new()
        .route("/quotes/{quote_id}/thread", post(ensure_thread))
        .route("/threads/{thread_id}/participants", post(add_participant).get(list_participants))
        .route("/threads/{thread_id}/participants/{user_id}", delete(remove_participant))
        .route("/users/{user_id}/conversations/provision", post(provision_user))
        .with_state(ConversationApiState { service })
}

async fn ensure_thread(
    State(state): State<ConversationApiState>,
    Path(quote_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<EnsureThreadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnsureThreadResponse>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let Json(request) = payload.map_err(|rejection| bad_request(&correlation_id, rejection))?;
    if request.initiator_user_id.0.trim().is_empty() {
        return Err(ApiError(InterfaceError::BadRequest {
            message: "initiatorUserId must not be empty".to_string(),
            correlation_id,
        }));
    }

    let overrides = ScopeOverrides {
        shipment_id: request.shipment_id,
        provider_branch_org_id: request.provider_branch_org_id,
        requester_branch_org_id: request.requester_branch_org_id,
    };
    let ensured = state
        .service
        .ensure_thread_for_quote(&QuoteId(quote_id), &request.initiator_user_id, overrides)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;

    info!(
        event_name = "server.conversations.thread_ensured",
        correlation_id = %correlation_id,
        quote_id = %ensured.thread.quote_id.0,
        thread_id = %ensured.thread.id.0,
        created = ensured.created,
        "thread ensured"
    );
    let status = if ensured.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(EnsureThreadResponse::from(ensured))))
}

async fn add_participant(
    State(state): State<ConversationApiState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<AddParticipantRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AddParticipantResponse>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let Json(request) = payload.map_err(|rejection| bad_request(&correlation_id, rejection))?;

    let options =
        ParticipantOptions { organization_id: request.organization_id, role_override: request.role };
    let ensured = state
        .service
        .ensure_participant_in_thread(&ThreadId(thread_id), &request.user_id, options)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;

    let status = if ensured.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(AddParticipantResponse::from(ensured))))
}

async fn list_participants(
    State(state): State<ConversationApiState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ParticipantListResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let participants = state
        .service
        .list_participants(&ThreadId(thread_id))
        .await
        .map_err(|error| api_error(error, &correlation_id))?;

    Ok(Json(ParticipantListResponse {
        participants: participants.into_iter().map(ParticipantView::from).collect(),
    }))
}

async fn remove_participant(
    State(state): State<ConversationApiState>,
    Path((thread_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let correlation_id = correlation_id(&headers);
    state
        .service
        .remove_participant(&ThreadId(thread_id), &UserId(user_id))
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn provision_user(
    State(state): State<ConversationApiState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Result<Json<ProvisioningReport>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let Json(request) = payload.map_err(|rejection| bad_request(&correlation_id, rejection))?;

    let report = state
        .service
        .provision_user_conversations(
            &UserId(user_id),
            ProvisioningOptions { organization_ids: request.organization_ids },
        )
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(Json(report))
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn bad_request(correlation_id: &str, rejection: JsonRejection) -> ApiError {
    warn!(
        event_name = "server.conversations.bad_request",
        correlation_id = %correlation_id,
        error = %rejection.body_text(),
        "rejected malformed request body"
    );
    ApiError(InterfaceError::BadRequest {
        message: rejection.body_text(),
        correlation_id: correlation_id.to_string(),
    })
}

fn api_error(error: ApplicationError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    match &interface {
        InterfaceError::ServiceUnavailable { message, .. } | InterfaceError::Internal { message, .. } => {
            error!(
                event_name = "server.conversations.request_failed",
                correlation_id = %correlation_id,
                error = %message,
                "conversation request failed"
            );
        }
        other => {
            warn!(
                event_name = "server.conversations.request_rejected",
                correlation_id = %correlation_id,
                error = %other,
                "conversation request rejected"
            );
        }
    }
    ApiError(interface)
}
