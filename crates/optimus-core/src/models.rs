//! Domain models shared by every Optimus crate.

pub mod backup;
pub mod resource;
pub mod tenant;
