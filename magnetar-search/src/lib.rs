//! Magnetar Search - Cascading magnet resolution
//!
//! Provides remote magnet search over an aggregation API with a two-pass
//! language cascade, deduplication and ranking strategies, and the cascade
//! orchestrator that ties local repositories, remote search and the adaptive
//! cache together.

pub mod cascade;
pub mod ranking;
pub mod remote;

// Re-export main types
pub use cascade::CascadeOrchestrator;
pub use ranking::{SelectionStrategy, dedupe, rank};
pub use remote::{RemoteSearch, RemoteSearchClient};

pub use magnetar_core::Result;
