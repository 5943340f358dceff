//! # Pipeline Module
//!
//! Separa le responsabilità dell'orchestrazione in sottomoduli:
//! - `stage`: Identificatori degli stage, report e trait `StageRunner`
//! - `graph`: Task graph statico ed executor fan-out/join
//! - `runner`: Composition root che collega ogni stage al suo modulo
//! - `progress_tracker`: Reporting unificato (log + eventi JSON)

pub mod graph;
pub mod progress_tracker;
pub mod runner;
pub mod stage;

pub use graph::{run_composition, TaskGraph, TaskGraphBuilder};
pub use progress_tracker::Reporter;
pub use runner::Pipeline;
pub use stage::{StageId, StageReport, StageRunner};
