//! Repository discovery
//!
//! - `strategy`: named queries and the two search modes
//! - `runner`: seeds + strategies, deduplication, batched resolution

pub mod runner;
pub mod strategy;

pub use runner::{CancelFlag, RunnerOptions, SearchStrategyRunner};
pub use strategy::{default_strategies, SearchMode, SearchPage, SearchStrategy};
