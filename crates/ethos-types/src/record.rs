//! Decision records, audit entries and the fixed record layout.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EthosError, Head, Scores};

/// Fixed vector widths shared by every record of one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RecordLayout {
    pub sensor_dim: usize,
    /// Action dimensionality (joint torques).
    pub action_dim: usize,
    pub context_dim: usize,
    /// Width of the opaque prompt embedding.
    pub prompt_dim: usize,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            sensor_dim: 48,
            action_dim: 30,
            context_dim: 16,
            prompt_dim: 64,
        }
    }
}

impl RecordLayout {
    /// Flattened width of a [`DecisionRecord`]: sensor, action, reward,
    /// context, the five action-group scores and the four derived scores.
    pub fn record_width(&self) -> usize {
        self.sensor_dim + self.action_dim + 1 + self.context_dim + Head::ACTION_GROUP.len() + 4
    }
}

/// Fail with [`EthosError::ShapeMismatch`] unless `values.len() == expected`.
pub fn check_len(field: &str, expected: usize, values: &[f32]) -> Result<(), EthosError> {
    if values.len() != expected {
        return Err(EthosError::ShapeMismatch {
            field: field.to_string(),
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

/// Fail with [`EthosError::InvalidType`] when any element is NaN or infinite.
pub fn check_finite(field: &str, values: &[f32]) -> Result<(), EthosError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(EthosError::InvalidType {
            field: field.to_string(),
            reason: format!("element {index} is {}", values[index]),
        }),
        None => Ok(()),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Derived scores
// ────────────────────────────────────────────────────────────────────────────

/// Scores reported alongside the action-group scores: the ungated
/// introspection head and the three prompt-group heads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DerivedScores {
    pub introspection: f32,
    pub intent: f32,
    pub zealot: f32,
    pub war_risk: f32,
}

impl DerivedScores {
    /// Extract the derived heads from a full score map.
    pub fn from_scores(scores: &Scores) -> Result<Self, EthosError> {
        Ok(Self {
            introspection: scores.require(Head::Introspection)?,
            intent: scores.require(Head::Intent)?,
            zealot: scores.require(Head::Zealot)?,
            war_risk: scores.require(Head::WarRisk)?,
        })
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.introspection, self.intent, self.zealot, self.war_risk]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DecisionRecord
// ────────────────────────────────────────────────────────────────────────────

/// One remembered decision.  Field order is the serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionRecord {
    pub sensor_state: Vec<f32>,
    /// The action that was emitted (all zeros when the gate denied it).
    pub action: Vec<f32>,
    pub reward: f32,
    pub context: Vec<f32>,
    /// The five action-group scores.
    pub scores: Scores,
    pub derived_scores: DerivedScores,
}

impl DecisionRecord {
    /// Flattened width of this record.
    pub fn width(&self) -> usize {
        self.sensor_state.len() + self.action.len() + 1 + self.context.len() + self.scores.len() + 4
    }

    /// Check every sub-vector against `layout` and that `scores` holds
    /// exactly the action-group heads.
    pub fn check_layout(&self, layout: &RecordLayout) -> Result<(), EthosError> {
        check_len("sensor_state", layout.sensor_dim, &self.sensor_state)?;
        check_len("action", layout.action_dim, &self.action)?;
        check_len("context", layout.context_dim, &self.context)?;
        if self.scores.len() != Head::ACTION_GROUP.len() {
            return Err(EthosError::ShapeMismatch {
                field: "scores".to_string(),
                expected: Head::ACTION_GROUP.len(),
                actual: self.scores.len(),
            });
        }
        for head in Head::ACTION_GROUP {
            self.scores.require(head)?;
        }
        Ok(())
    }

    /// All values in declared field order; scores in canonical head order.
    pub fn flatten(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.width());
        out.extend_from_slice(&self.sensor_state);
        out.extend_from_slice(&self.action);
        out.push(self.reward);
        out.extend_from_slice(&self.context);
        out.extend(self.scores.iter().map(|(_, s)| s));
        out.extend(self.derived_scores.to_array());
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TransparencyEntry
// ────────────────────────────────────────────────────────────────────────────

/// Read-only audit snapshot of one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransparencyEntry {
    /// Monotonic decision counter of the owning pipeline.
    pub seq: u64,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub proposed_action: Vec<f32>,
    pub final_action: Vec<f32>,
    pub allowed: bool,
    /// Every gated head that failed, in canonical order.
    pub denied_by: Vec<Head>,
    /// All nine scores.
    pub scores: Scores,
    pub coherence: f32,
    /// Intrinsic state after this decision's update.
    pub intrinsic_state: f32,
}

impl TransparencyEntry {
    /// Flat numeric view: final action followed by every score in
    /// canonical order.
    pub fn flatten(&self) -> Vec<f32> {
        self.final_action
            .iter()
            .copied()
            .chain(self.scores.iter().map(|(_, s)| s))
            .collect()
    }
}

impl fmt::Display for TransparencyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ", self.seq)?;
        if self.allowed {
            f.write_str("ALLOWED")?;
        } else {
            let names: Vec<&str> = self.denied_by.iter().map(|h| h.name()).collect();
            write!(f, "DENIED by [{}]", names.join(", "))?;
        }
        for (head, score) in self.scores.iter() {
            write!(f, " {head}={score:.2}")?;
        }
        write!(
            f,
            " coherence={:.3} intrinsic={:.3}",
            self.coherence, self.intrinsic_state
        )
    }
}
