pub mod sweeper;

pub use sweeper::{sweep, SweepReport, TimeoutSweepConfig, TimeoutSweeper};
