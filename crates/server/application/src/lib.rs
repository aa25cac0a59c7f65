// Playbook Dispatcher - Application Layer
// Casos de uso: dispatch, validación de telemetría, consumo de respuestas

pub mod dispatch;
pub mod responses;
pub mod timeouts;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use dispatch::{DispatchManager, DispatchManagerConfig, DispatchResult};
pub use responses::{ResponseConsumer, ResponseConsumerMetrics};
pub use timeouts::{TimeoutSweepConfig, TimeoutSweeper};
pub use validator::{Validator, ValidatorConfig, ValidatorStats};
