//! Runs bounded context

pub mod aggregate;
pub mod repository;

pub use aggregate::*;
pub use repository::*;
