//! Optimus Core: domain models, error types and repository traits for
//! the resource reconciliation and backup subsystem.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{ErrorKind, MultiError, OptimusError, OptimusResult, add_error_context};
