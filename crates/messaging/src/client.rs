use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use tradelane_core::config::MessagingConfig;
use tradelane_core::ports::{ExternalConversation, MessagingProvider, ProviderError};

use crate::failure::{classify_status, classify_transport};

#[derive(Debug, Deserialize)]
struct ConversationResource {
    sid: String,
    #[serde(default)]
    unique_name: Option<String>,
}

/// [`MessagingProvider`] backed by the provider's REST API.
///
/// Every request is bounded by the configured timeout at the HTTP client
/// level as well; the engine applies its own bound on top.
pub struct HttpMessagingProvider {
    client: Client,
    base_url: Url,
    credentials: Option<(String, SecretString)>,
    timeout_ms: u64,
}

impl HttpMessagingProvider {
    pub fn from_config(config: &MessagingConfig) -> Result<Self, ProviderError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|error| {
            ProviderError::Transport(format!("invalid messaging base url: {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Transport(format!(
                "messaging base url `{}` cannot carry a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|error| ProviderError::Transport(format!("http client: {error}")))?;

        let credentials = match (&config.account_id, &config.auth_token) {
            (Some(account_id), Some(token)) => Some((account_id.clone(), token.clone())),
            _ => None,
        };

        Ok(Self { client, base_url, credentials, timeout_ms: config.request_timeout_ms })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((account_id, token)) => request.basic_auth(account_id, Some(token.expose_secret())),
            None => request,
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<Response, ProviderError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|error| classify_transport(operation, self.timeout_ms, &error))?;

        let status = response.status();
        debug!(
            event_name = "messaging.http.response",
            operation,
            resource,
            status = status.as_u16(),
            "provider responded"
        );
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, resource))
    }

    async fn conversation_from(
        &self,
        operation: &'static str,
        response: Response,
        requested_name: &str,
    ) -> Result<ExternalConversation, ProviderError> {
        let resource: ConversationResource = response
            .json()
            .await
            .map_err(|error| classify_transport(operation, self.timeout_ms, &error))?;
        Ok(ExternalConversation {
            id: resource.sid,
            unique_name: resource.unique_name.unwrap_or_else(|| requested_name.to_string()),
        })
    }
}

#[async_trait]
impl MessagingProvider for HttpMessagingProvider {
    async fn create_conversation(
        &self,
        unique_name: &str,
        friendly_name: &str,
        attributes: &Value,
    ) -> Result<ExternalConversation, ProviderError> {
        let attributes = attributes.to_string();
        let request = self.client.post(self.endpoint(&["Conversations"])).form(&[
            ("UniqueName", unique_name),
            ("FriendlyName", friendly_name),
            ("Attributes", attributes.as_str()),
        ]);
        let response = self.send("create_conversation", unique_name, request).await?;
        self.conversation_from("create_conversation", response, unique_name).await
    }

    async fn fetch_conversation(
        &self,
        unique_name: &str,
    ) -> Result<ExternalConversation, ProviderError> {
        let request = self.client.get(self.endpoint(&["Conversations", unique_name]));
        let response = self.send("fetch_conversation", unique_name, request).await?;
        self.conversation_from("fetch_conversation", response, unique_name).await
    }

    async fn update_conversation_attributes(
        &self,
        conversation_id: &str,
        attributes: &Value,
    ) -> Result<(), ProviderError> {
        let attributes = attributes.to_string();
        let request = self
            .client
            .post(self.endpoint(&["Conversations", conversation_id]))
            .form(&[("Attributes", attributes.as_str())]);
        self.send("update_conversation_attributes", conversation_id, request).await?;
        Ok(())
    }

    /// An identity that is already a member is reported by the provider as a
    /// conflict and treated as success.
    async fn add_participant(
        &self,
        conversation_id: &str,
        identity: &str,
        role_id: &str,
    ) -> Result<(), ProviderError> {
        let request = self
            .client
            .post(self.endpoint(&["Conversations", conversation_id, "Participants"]))
            .form(&[("Identity", identity), ("RoleSid", role_id)]);
        match self.send("add_participant", conversation_id, request).await {
            Ok(_) | Err(ProviderError::Conflict { .. }) => Ok(()),
            Err(error) => Err(error),
        }
    }
}
