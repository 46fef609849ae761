//! Optimus Store: the backend-facing half of resource reconciliation.
//!
//! [`DataStore`] is the contract the resource manager dispatches to. The
//! BigQuery backend implements it on top of per-kind handles obtained from
//! a tenant-scoped [`bigquery::Client`].

pub mod bigquery;
pub mod runner;
mod store;

pub use runner::ParallelRunner;
pub use store::DataStore;
