//! tutor core library: incremental structural analysis of source trees.
//!
//! The crate parses files through a registry of tree-sitter grammars,
//! extracts symbols and idiom patterns, scores teaching value, builds a
//! file-level dependency graph and keeps results in a three-tier cache and a
//! snapshot store so repeated analyses only touch changed files.
//!
//! [`engine::AnalysisEngine`] is the entry point; the `tutor` binary wraps it.

pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod indexer;
pub mod models;
pub mod store;
pub mod telemetry;

pub use cache::{CacheManager, CacheStats, RemoteStore};
pub use config::TutorConfig;
pub use engine::{AnalysisEngine, PerformanceMetrics, ScanOptions};
pub use errors::{TutorError, TutorResult};
pub use indexer::pipeline::CancellationToken;
pub use store::snapshots::PersistenceManager;
