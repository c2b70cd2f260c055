//! `ethos-types` – shared data model of the Ethos decision pipeline.
//!
//! - [`Head`], [`HeadGroup`], [`Direction`] and [`Scores`]: the closed
//!   registry of scoring heads and the score map keyed by them.
//! - [`DecisionRecord`] and [`TransparencyEntry`]: what the pipeline remembers
//!   and what it exposes for audit.
//! - [`RecordLayout`]: the fixed vector widths of one pipeline instance.
//! - [`EthosError`]: the error type shared by every crate in the workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod head;
mod record;

pub use head::{Direction, Head, HeadGroup, Scores};
pub use record::{
    DecisionRecord, DerivedScores, RecordLayout, TransparencyEntry, check_finite, check_len,
};

/// Global error type spanning shape validation, gating and persistence.
///
/// A denied action is **not** an error; it is a normal outcome reported in
/// the gate result.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EthosError {
    #[error("Shape mismatch on {field}: expected {expected}, got {actual}")]
    ShapeMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Missing score for head '{0}'")]
    MissingScore(Head),

    #[error("Invalid value in {field}: {reason}")]
    InvalidType { field: String, reason: String },

    #[error("No scorer registered for head '{0}'")]
    MissingScorer(Head),

    #[error("Threshold {value} for head '{head}' is outside [0, 1]")]
    InvalidThreshold { head: Head, value: f32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Archive error: {0}")]
    Archive(String),
}
