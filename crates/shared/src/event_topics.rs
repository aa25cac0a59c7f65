//! Centralized topic and header constants for the message bus
//!
//! Topics are NATS JetStream subjects. Keeping them in one place prevents
//! mismatches between producers and consumers.
//!
//! ## Usage
//! ```rust
//! use dispatcher_shared::event_topics::topics;
//!
//! assert_eq!(topics::VALIDATION_REQUEST, "platform.upload.announce");
//! ```

/// Default topic names (overridable through configuration)
pub mod topics {
    /// Normalized run updates produced by the validator
    pub const RUNNER_UPDATES: &str = "platform.playbook-dispatcher.runner-updates";
    /// "Artifact announced" notifications from the upload pipeline
    pub const VALIDATION_REQUEST: &str = "platform.upload.announce";
    /// Validation acknowledgments back to the upload pipeline
    pub const VALIDATION_RESPONSE: &str = "platform.upload.validation";
}

/// JetStream streams backing the topics above
pub mod streams {
    pub const UPLOAD_STREAM_NAME: &str = "PLATFORM_UPLOAD";
    pub const UPLOAD_SUBJECTS: &str = "platform.upload.>";
    pub const DISPATCHER_STREAM_NAME: &str = "PLAYBOOK_DISPATCHER";
    pub const DISPATCHER_SUBJECTS: &str = "platform.playbook-dispatcher.>";
}

/// Header names shared by producers and consumers
pub mod headers {
    pub const REQUEST_ID: &str = "x-rh-insights-request-id";
    pub const CORRELATION_ID: &str = "x-rh-insights-playbook-dispatcher-correlation-id";
    /// Flavor of the run update (`playbook` or `playbook-sat`)
    pub const REQUEST_TYPE: &str = "service";
    /// Partitioning key of a message
    pub const MESSAGE_KEY: &str = "x-message-key";

    pub const CLOUD_CONNECTOR_CLIENT_ID: &str = "x-rh-cloud-connector-client-id";
    pub const CLOUD_CONNECTOR_PSK: &str = "x-rh-cloud-connector-psk";
    pub const CLOUD_CONNECTOR_ORG_ID: &str = "x-rh-cloud-connector-org-id";
}

/// Values of the `service` header / upload service field
pub mod request_types {
    pub const RUNNER: &str = "playbook";
    pub const SATELLITE: &str = "playbook-sat";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_are_covered_by_streams() {
        assert!(topics::VALIDATION_REQUEST.starts_with("platform.upload."));
        assert!(topics::VALIDATION_RESPONSE.starts_with("platform.upload."));
        assert!(topics::RUNNER_UPDATES.starts_with("platform.playbook-dispatcher."));
    }
}
