//! Pacing, camouflage and the batch scheduler.

mod batch;
mod camouflage;
mod pacing;

pub use batch::{BatchScheduler, EntityReport, SchedulerEvent, SchedulerSettings};
pub use camouflage::{Camouflage, CamouflageAction, FeedComments, MessagesConversation};
pub use pacing::DelayRange;
