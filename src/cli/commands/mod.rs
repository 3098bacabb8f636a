//! Command implementations.

mod crawl;
mod load;
mod remove;
mod status;

pub use crawl::cmd_crawl;
pub use load::cmd_load;
pub use remove::cmd_remove;
pub use status::cmd_status;
