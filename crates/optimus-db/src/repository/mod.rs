//! SurrealDB repository implementations.

mod backup;
mod resource;

pub use backup::SurrealBackupRepository;
pub use resource::SurrealResourceRepository;
