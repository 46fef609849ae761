//! Optimus Resource: the resource manager, the deploy pipeline that drives
//! a batch of resource specs to a terminal state, and the backup service.

pub mod backup;
pub mod deploy;
pub mod manager;
mod metrics;
pub mod service;

pub use backup::{BackupOutcome, BackupService};
pub use deploy::{DeployLog, DeployRequest, LogLevel, LogStatus, ResourceSpec};
pub use manager::ResourceManager;
pub use metrics::DeployMetrics;
pub use service::ResourceService;
