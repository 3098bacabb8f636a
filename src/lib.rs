//! netprune - resumable connection cleanup and search crawling.
//!
//! A workflow engine between a browser page and a durable entity store:
//! crawl paginated search results into deduplicated profiles, and process a
//! queue of profiles through the connection-removal flow with paced,
//! resumable batches.

pub mod automation;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod export;
pub mod models;
pub mod relationship;
pub mod repository;
pub mod retry;
pub mod scheduler;
pub mod session;
