//! [`IntrinsicStateTracker`] – running summary of ethical alignment.
//!
//! Each decision folds the recall coherence and every score into one scalar:
//!
//! ```text
//! signal = coherence + ethical + introspection
//!        − misuse − surveillance − manipulation − hacking
//!        − intent − zealot − war_risk
//! state' = clamp(decay * state + rate * signal)
//! ```
//!
//! With the default [`IntrinsicPolicy`] (`rate = 0.1`, `decay = 1.0`, no
//! clamp) this is a plain additive accumulator with no bound; it drifts
//! without limit under a persistent bias.  Set `decay < 1` or a clamp range
//! to bound it.
//!
//! # Example
//!
//! ```
//! use ethos_kernel::{IntrinsicPolicy, IntrinsicStateTracker};
//! use ethos_types::{Head, Scores};
//!
//! let mut tracker = IntrinsicStateTracker::new(IntrinsicPolicy::default());
//! let scores: Scores = Head::ALL.into_iter().map(|h| (h, 0.0)).collect();
//!
//! let state = tracker.update(1.0, &scores).unwrap();
//! assert!((state - 0.1).abs() < 1e-6);
//! ```

use ethos_types::{EthosError, Head, Scores, check_finite};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Tunables of the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicPolicy {
    /// Weight of each decision's signal.
    #[serde(default = "default_rate")]
    pub rate: f32,
    /// Multiplier applied to the previous state before accumulation, in
    /// `[0, 1]`.  `1.0` disables decay.
    #[serde(default = "default_decay")]
    pub decay: f32,
    /// Lower bound of the state, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f32>,
    /// Upper bound of the state, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
}

fn default_rate() -> f32 {
    0.1
}
fn default_decay() -> f32 {
    1.0
}

impl Default for IntrinsicPolicy {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            decay: default_decay(),
            min: None,
            max: None,
        }
    }
}

impl IntrinsicPolicy {
    /// # Errors
    ///
    /// [`EthosError::InvalidConfig`] for a non-finite rate or clamp bound, a
    /// decay outside `[0, 1]` or an empty clamp range.
    pub fn validate(&self) -> Result<(), EthosError> {
        if !self.rate.is_finite() {
            return Err(EthosError::InvalidConfig(format!(
                "intrinsic rate must be finite, got {}",
                self.rate
            )));
        }
        for (name, bound) in [("min", self.min), ("max", self.max)] {
            if let Some(value) = bound
                && !value.is_finite()
            {
                return Err(EthosError::InvalidConfig(format!(
                    "intrinsic {name} must be finite, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.decay) {
            return Err(EthosError::InvalidConfig(format!(
                "intrinsic decay must be in [0, 1], got {}",
                self.decay
            )));
        }
        if let (Some(min), Some(max)) = (self.min, self.max)
            && min > max
        {
            return Err(EthosError::InvalidConfig(format!(
                "intrinsic clamp range is empty: [{min}, {max}]"
            )));
        }
        Ok(())
    }

    fn bound(&self, value: f32) -> f32 {
        let value = self.min.map_or(value, |min| value.max(min));
        self.max.map_or(value, |max| value.min(max))
    }
}

/// Sign with which a head's score enters the signal.
fn polarity(head: Head) -> f32 {
    match head {
        Head::Ethical | Head::Introspection => 1.0,
        _ => -1.0,
    }
}

/// Owns the intrinsic state of one pipeline.
#[derive(Debug, Clone)]
pub struct IntrinsicStateTracker {
    state: f32,
    policy: IntrinsicPolicy,
}

impl IntrinsicStateTracker {
    /// Start from a zero state.
    pub fn new(policy: IntrinsicPolicy) -> Self {
        Self::with_initial(0.0, policy)
    }

    pub fn with_initial(state: f32, policy: IntrinsicPolicy) -> Self {
        Self { state, policy }
    }

    /// The unweighted signal of one decision.
    ///
    /// # Errors
    ///
    /// [`EthosError::MissingScore`] when any of the nine heads is absent and
    /// [`EthosError::InvalidType`] for a non-finite coherence.
    pub fn signal(coherence: f32, scores: &Scores) -> Result<f32, EthosError> {
        check_finite("coherence", &[coherence])?;
        let mut signal = coherence;
        for head in Head::ALL {
            signal += polarity(head) * scores.require(head)?;
        }
        Ok(signal)
    }

    /// Fold one decision into the state and return the new state.  The state
    /// is left untouched on error.
    pub fn update(&mut self, coherence: f32, scores: &Scores) -> Result<f32, EthosError> {
        let next = self.preview(coherence, scores)?;
        trace!(previous = self.state, next, "intrinsic state updated");
        self.state = next;
        Ok(next)
    }

    /// Value [`update`](Self::update) would produce, without applying it.
    pub fn preview(&self, coherence: f32, scores: &Scores) -> Result<f32, EthosError> {
        let signal = Self::signal(coherence, scores)?;
        Ok(self
            .policy
            .bound(self.policy.decay * self.state + self.policy.rate * signal))
    }

    pub fn state(&self) -> f32 {
        self.state
    }

    pub fn policy(&self) -> &IntrinsicPolicy {
        &self.policy
    }
}
