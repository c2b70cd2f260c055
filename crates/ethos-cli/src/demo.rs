//! Synthetic feed and heuristic heads for `ethos demo`.
//!
//! Nothing here is learned.  The feed is a set of phase-shifted sine waves,
//! so a run is fully reproducible, and the heads are hand-written functions
//! of the vectors they receive:
//!
//! - `ethical` drops as the largest action component grows.
//! - `misuse` follows the mean magnitude of the context tail.
//! - `surveillance`, `manipulation` and `hacking` are weak logistic heads.
//! - `intent`, `zealot` and `war_risk` read the prompt embedding, which
//!   spikes every [`PROMPT_SPIKE_EVERY`] steps.
//! - `introspection` is a logistic head over the recall summary.

use ethos_kernel::{LinearScorer, Scorer, ScorerBank};
use ethos_memory::{OutcomeEncoder, RecordEncoder};
use ethos_runtime::DecisionInput;
use ethos_types::{EthosError, Head, RecordLayout};

/// The prompt embedding saturates on every step divisible by this.
pub const PROMPT_SPIKE_EVERY: u64 = 5;

/// Owned inputs of one synthetic decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub sensor_state: Vec<f32>,
    pub proposed_action: Vec<f32>,
    pub reward: f32,
    pub context: Vec<f32>,
    pub prompt_embedding: Vec<f32>,
}

impl Frame {
    pub fn as_input(&self) -> DecisionInput<'_> {
        DecisionInput {
            sensor_state: &self.sensor_state,
            proposed_action: &self.proposed_action,
            reward: self.reward,
            context: &self.context,
            prompt_embedding: &self.prompt_embedding,
        }
    }
}

/// Deterministic source of [`Frame`]s shaped by a [`RecordLayout`].
pub struct SyntheticFeed {
    layout: RecordLayout,
}

impl SyntheticFeed {
    pub fn new(layout: RecordLayout) -> Self {
        Self { layout }
    }

    /// Inputs for decision `step`.  Same step, same frame.
    pub fn frame(&self, step: u64) -> Frame {
        let t = step as f32;
        let amplitude = 0.6 + 0.4 * (0.9 * t).sin();
        let spike = step % PROMPT_SPIKE_EVERY == 0;
        Frame {
            sensor_state: wave(self.layout.sensor_dim, |i| (0.3 * t + 0.5 * i).sin()),
            proposed_action: wave(self.layout.action_dim, |i| amplitude * (t + i).sin()),
            reward: (0.2 * t).cos(),
            context: wave(self.layout.context_dim, |i| 0.4 * (0.3 * t + i).cos()),
            prompt_embedding: wave(self.layout.prompt_dim, |i| {
                if spike { 0.8 } else { 0.1 * (t + 0.7 * i).sin() }
            }),
        }
    }
}

fn wave(len: usize, f: impl Fn(f32) -> f32) -> Vec<f32> {
    (0..len).map(|i| f(i as f32)).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Heuristic heads
// ─────────────────────────────────────────────────────────────────────────────

fn max_abs(xs: &[f32]) -> f32 {
    xs.iter().fold(0.0, |m, x| m.max(x.abs()))
}

fn mean_abs(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().map(|x| x.abs()).sum::<f32>() / xs.len() as f32
}

fn mean_positive(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().map(|x| x.max(0.0)).sum::<f32>() / xs.len() as f32
}

/// A scorer bank with one hand-written head per [`Head`], sized for
/// `layout`.
pub fn heuristic_bank(layout: &RecordLayout) -> Result<ScorerBank, EthosError> {
    let action_dim = layout.action_dim;
    let context_dim = layout.context_dim;
    let summary_dim = OutcomeEncoder::new(layout).dim();
    let action_input_dim = action_dim + summary_dim + context_dim;

    ScorerBank::builder()
        .with_all(|head| -> Box<dyn Scorer> {
            match head {
                Head::Ethical => Box::new(move |x: &[f32]| {
                    1.0 - 0.3 * max_abs(&x[..action_dim.min(x.len())])
                }),
                Head::Misuse => Box::new(move |x: &[f32]| {
                    0.5 * mean_abs(&x[x.len().saturating_sub(context_dim)..])
                }),
                Head::Surveillance | Head::Manipulation | Head::Hacking => {
                    Box::new(LinearScorer::uniform(action_input_dim, 0.01, -3.0))
                }
                Head::Intent => Box::new(|x: &[f32]| 0.5 * mean_abs(x)),
                Head::Zealot => Box::new(mean_positive),
                Head::WarRisk => Box::new(|x: &[f32]| 0.25 * max_abs(x)),
                Head::Introspection => Box::new(LinearScorer::uniform(summary_dim, 0.05, 0.5)),
            }
        })
        .build()
}
