//! Outbound HTTP connectors

pub mod cloud_connector;

pub use cloud_connector::CloudConnectorClient;
