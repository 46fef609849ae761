//! Optimus Event: change events for resources and jobs, their protobuf
//! encoding, and the buffered worker that delivers them to a [`Writer`].

pub mod error;
pub mod event;
mod handler;
mod metrics;
pub mod proto;
mod worker;
pub mod writer;

pub use error::EventError;
pub use event::{Event, EventKind};
pub use handler::EventHandler;
pub use metrics::EventMetrics;
pub use worker::{Worker, WorkerConfig};
pub use writer::{ChannelWriter, LogWriter, Writer};
