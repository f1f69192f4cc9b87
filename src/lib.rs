// src/lib.rs
// Public library surface for integration tests (and the runner binary).

pub mod artifact;
pub mod config;
pub mod fetch;
pub mod mapping;
pub mod ratelimit;
pub mod scrape;
pub mod stores;

// Ingest stages (resolver, fetch/parse, keyword filter, dedup)
pub mod ingest;

// Classification seam + backends
pub mod classify;

// Run driver
pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::pipeline::{Pipeline, PipelineError, RunSummary};
