//! `backfill-recon`: legacy import engine.
//!
//! Turns healed CSV rows into resolved records, reconciles them against the
//! durable remap file, and writes them to the store and the search index.
//! Collaborators are reached only through the `Store` and `SearchIndex`
//! traits; no CLI dependencies.

pub mod config;
pub mod error;
pub mod fields;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod remap;
pub mod resolve;
pub mod run;
pub mod sink;

pub use config::ImportConfig;
pub use error::ImportError;
pub use reconcile::{Disposition, IdBlock, Plan, SkipReason, Skipped};
pub use remap::RemapStore;
pub use run::{run, RunOptions, RunSummary};
pub use sink::SinkReport;
