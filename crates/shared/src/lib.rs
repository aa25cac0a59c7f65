pub mod config;
pub mod error;
pub mod event_topics;
pub mod ids;
pub mod states;

pub use error::*;
pub use event_topics::*;
pub use ids::*;
pub use states::*;
