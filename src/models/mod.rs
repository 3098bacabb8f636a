//! Data models for tracked entities and crawl output.

mod entity;
mod profile;
mod run;

pub use entity::{ConnectionStatus, Entity, Outcome, ProcessingResult};
pub use profile::DiscoveredProfile;
pub use run::{RunSummary, StopReason};
