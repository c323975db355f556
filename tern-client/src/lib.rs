//! Tern HTTP clients
//!
//! Production adapters for the two external services the controller talks
//! to: a Gerrit-compatible review system and a prow-style job scheduler.
//!
//! Each adapter sits behind a narrow capability trait ([`ReviewApi`],
//! [`JobCreator`]) so the sync pipeline can run against deterministic
//! in-memory fakes in tests. The adapters own no retry or deadline policy;
//! configure the underlying reqwest client for that.

pub mod error;
mod review;
mod scheduler;

pub use error::{ClientError, Result};
pub use review::{HttpReviewClient, ReviewApi};
pub use scheduler::{HttpSchedulerClient, JobCreator};
