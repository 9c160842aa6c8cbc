//! equigrade: weighted, equity-audited final grades.
//!
//! Aggregates raw gradebook scores into final grades under a configurable
//! per-category policy, then compares the minoritized group's grades with the
//! rest of the class.

pub mod analysis;
pub mod categorize;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod roster;
pub mod stats;
pub mod types;

pub use analysis::{analyze, DisparityReport, Measure};
pub use engine::compute_final_grades;
pub use error::GradeError;
pub use pipeline::{evaluate, Evaluation};
