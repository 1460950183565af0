//! # closeout-core
//!
//! Shared primitives for the closeout lifecycle pipeline:
//!
//! - **Error Types**: Shared error definitions and result types
//! - **Object Store**: Abstract durable-storage interface for archive artifacts
//! - **Run Lock**: Object-store-backed mutual exclusion for pipeline invocations
//! - **Observability**: Logging initialization and span constructors
//!
//! The pipeline itself lives in `closeout-pipeline`; this crate holds the
//! pieces that are independent of any particular record kind.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod lock;
pub mod observability;
pub mod storage;

pub use error::{Error, Result};
pub use lock::{RunLock, RunLockGuard, DEFAULT_LOCK_TTL};
pub use storage::{MemoryObjectStore, ObjectStore};
