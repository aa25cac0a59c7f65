//! Cloud connector HTTP client
//!
//! Implements the `BrokerClient` port against the cloud connector v2 API:
//! `POST v2/connections/{recipient}/message` and
//! `GET v2/connections/{recipient}/status`.

use std::time::Duration;

use async_trait::async_trait;
use dispatcher_server_domain::{
    BrokerClient, BrokerEnvelope, BrokerOutcome, ConnectionStatus, DomainError, Metadata,
    RecipientId, RequestContext, Result,
};
use dispatcher_shared::config::CloudConnectorConfig;
use dispatcher_shared::event_topics::headers;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    directive: &'a str,
    metadata: &'a Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: ConnectionStatus,
}

#[derive(Debug, Clone)]
pub struct CloudConnectorClient {
    client: Client,
    base_url: String,
    client_id: String,
    psk: String,
    timeout: Duration,
}

impl CloudConnectorClient {
    pub fn new(config: &CloudConnectorConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| DomainError::BrokerTransport {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self::with_base_url(client, config, config.base_url()))
    }

    /// Client against an explicit base url (must end with `/`)
    pub fn with_base_url(client: Client, config: &CloudConnectorConfig, base_url: String) -> Self {
        Self {
            client,
            base_url,
            client_id: config.client_id.clone(),
            psk: config.psk.clone(),
            timeout: config.timeout(),
        }
    }

    fn connection_url(&self, recipient: &RecipientId, action: &str) -> String {
        format!("{}v2/connections/{}/{}", self.base_url, recipient, action)
    }

    /// Shared headers plus a timeout that never outlives the request deadline
    fn decorate(&self, request: RequestBuilder, ctx: &RequestContext, org_id: &str) -> RequestBuilder {
        let timeout = ctx
            .remaining()
            .map_or(self.timeout, |remaining| remaining.min(self.timeout));

        request
            .timeout(timeout)
            .header(headers::REQUEST_ID, ctx.request_id())
            .header(headers::CLOUD_CONNECTOR_CLIENT_ID, &self.client_id)
            .header(headers::CLOUD_CONNECTOR_PSK, &self.psk)
            .header(headers::CLOUD_CONNECTOR_ORG_ID, org_id)
    }
}

fn transport_error(e: reqwest::Error) -> DomainError {
    DomainError::BrokerTransport {
        message: e.to_string(),
    }
}

#[async_trait]
impl BrokerClient for CloudConnectorClient {
    #[instrument(skip(self, ctx, envelope), fields(recipient = %envelope.recipient, directive = %envelope.directive))]
    async fn send(&self, ctx: &RequestContext, envelope: &BrokerEnvelope) -> Result<BrokerOutcome> {
        debug!(metadata = ?envelope.metadata, payload = ?envelope.payload, "Sending cloud connector message");

        let body = MessageRequest {
            directive: &envelope.directive,
            metadata: &envelope.metadata,
            payload: envelope.payload.as_deref(),
        };

        let request = self
            .client
            .post(self.connection_url(&envelope.recipient, "message"))
            .json(&body);

        let response = self
            .decorate(request, ctx, &envelope.org_id)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(BrokerOutcome::RecipientNotFound);
        }
        if !status.is_success() {
            return Err(DomainError::UnexpectedBrokerResponse {
                status: status.as_u16(),
            });
        }

        let parsed: MessageResponse =
            response
                .json()
                .await
                .map_err(|_| DomainError::UnexpectedBrokerResponse {
                    status: status.as_u16(),
                })?;

        match parsed.id {
            Some(message_id) => Ok(BrokerOutcome::Accepted { message_id }),
            None => Err(DomainError::UnexpectedBrokerResponse {
                status: status.as_u16(),
            }),
        }
    }

    #[instrument(skip(self, ctx), fields(recipient = %recipient))]
    async fn connection_status(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        recipient: &RecipientId,
    ) -> Result<ConnectionStatus> {
        debug!(org_id, "Sending cloud connector status request");

        let request = self.client.get(self.connection_url(recipient, "status"));
        let response = self
            .decorate(request, ctx, org_id)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::UnexpectedBrokerResponse {
                status: status.as_u16(),
            });
        }

        let parsed: StatusResponse =
            response
                .json()
                .await
                .map_err(|_| DomainError::UnexpectedBrokerResponse {
                    status: status.as_u16(),
                })?;

        Ok(parsed.status)
    }
}
