//! Execution broker port (cloud connector)

use async_trait::async_trait;

use crate::protocol::Metadata;
use crate::request_context::RequestContext;
use crate::shared_kernel::{ConnectionStatus, RecipientId, Result};

/// Directive + metadata + payload sent to one recipient
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEnvelope {
    pub recipient: RecipientId,
    pub org_id: String,
    pub directive: String,
    pub metadata: Metadata,
    /// Playbook url; cancel signals carry none
    pub payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOutcome {
    Accepted { message_id: String },
    RecipientNotFound,
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Transport failures surface as `BrokerTransport`, unexpected statuses
    /// as `UnexpectedBrokerResponse`
    async fn send(&self, ctx: &RequestContext, envelope: &BrokerEnvelope) -> Result<BrokerOutcome>;

    async fn connection_status(
        &self,
        ctx: &RequestContext,
        org_id: &str,
        recipient: &RecipientId,
    ) -> Result<ConnectionStatus>;
}
