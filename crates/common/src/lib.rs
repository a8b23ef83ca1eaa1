//! reelcap common utilities
//!
//! Shared infrastructure for all reelcap crates:
//! - Error taxonomy and result alias
//! - Frame clock used by the export capture loop
//! - Tracing/logging initialization
//! - Configuration loading
//! - Isolated worker threads and cancellation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod worker;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use worker::{CancelHandle, Worker, WorkerContext};
