pub mod engine;
pub mod heuristics;

pub use engine::{CycleStats, DiscoveredService, DiscoveryEngine};
