//! # closeout-pipeline
//!
//! The ended-record lifecycle pipeline for a competitive game backend.
//!
//! Time-boxed records (events, event rounds, tournament occurrences) whose
//! active period has closed are handled one of two ways:
//!
//! - **Outbound delivery**: the record's final ranked leaderboard is POSTed
//!   to a third-party consumer, gated by an outbox-style sent flag set inside
//!   the same database transaction. Delivery is at-least-once; the consumer
//!   dedupes on the identifying key.
//! - **Archival export**: expired rows are encoded to compressed CSV, written
//!   durably to an object store, and purged from the live store in contiguous
//!   id-range batches. The artifact write happens before the delete, and a
//!   failed delete compensates by removing the just-written artifact.
//!
//! Both paths page over their candidate sets with a bounded batch size and
//! isolate failures per candidate/batch: one bad unit never aborts its
//! siblings.
//!
//! ## Guarantees
//!
//! - A sent/archived flag transitions unset -> set exactly once; the
//!   zero-rows-affected guard makes concurrent runs skip instead of
//!   double-sending.
//! - Artifact keys are a pure function of the id range, so a crashed batch
//!   regenerates the identical key and overwrites safely.
//! - A crash at any point leaves every candidate in a committed or
//!   rolled-back state; no partial mutation is visible.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use closeout_core::MemoryObjectStore;
//! use closeout_pipeline::client::HttpDelivery;
//! use closeout_pipeline::pipeline::{Pipeline, PipelineConfig};
//! use closeout_pipeline::store::memory::MemoryLiveStore;
//!
//! # async fn run() -> closeout_pipeline::error::Result<()> {
//! let config = PipelineConfig::default();
//! let delivery = HttpDelivery::new(
//!     "https://results.example.com/ingest",
//!     "x-api-key",
//!     "secret",
//! )?;
//!
//! let pipeline = Pipeline::new(
//!     Arc::new(MemoryLiveStore::new()),
//!     Arc::new(MemoryObjectStore::new()),
//!     Arc::new(delivery),
//!     config,
//! );
//! let summary = pipeline.run().await?;
//! println!("delivered {} candidates", summary.delivered());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod archive;
pub mod client;
pub mod delivery;
pub mod encode;
pub mod error;
pub mod interval;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod paths;
pub mod payload;
pub mod pipeline;
pub mod scanner;
pub mod store;
