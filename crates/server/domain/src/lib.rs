// Playbook Dispatcher - Domain Layer
// - shared_kernel: ids, statuses and errors
// - runs: Run aggregate and its repository port
// - protocol: metadata vocabularies of the remote worker families
// - telemetry: event streams and status inference
// - broker / messaging / storage: ports implemented by infrastructure

pub mod broker;
pub mod messages;
pub mod messaging;
pub mod protocol;
pub mod request_context;
pub mod runs;
pub mod shared_kernel;
pub mod storage;
pub mod telemetry;

pub use broker::*;
pub use messages::*;
pub use messaging::*;
pub use protocol::*;
pub use request_context::*;
pub use runs::*;
pub use shared_kernel::*;
pub use storage::*;
pub use telemetry::{
    RequestFlavor, RunnerEvent, RunnerEventData, SatEvent, SatHostInfo, TelemetryBatch,
};
