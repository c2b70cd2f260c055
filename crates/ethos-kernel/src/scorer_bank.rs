//! [`ScorerBank`] – one independent scoring capability per [`Head`].
//!
//! Each head maps an input vector to a score in `[0, 1]`.  How a scorer was
//! obtained (trained, hand-written, constant) is irrelevant to the bank: any
//! type implementing [`Scorer`] can be registered, including plain closures.
//!
//! Heads are evaluated independently; no scorer ever sees another head's
//! output.  The bank is immutable after [`ScorerBankBuilder::build`] and is
//! meant to be shared between pipelines behind an `Arc`.
//!
//! # Output hygiene
//!
//! Finite outputs are clamped to `[0, 1]`.  A NaN or infinite output fails
//! closed: it is replaced with the head's failing extreme (`0.0` for
//! `ethical`/`introspection`, `1.0` for every risk head) and a warning is
//! logged.
//!
//! # Example
//!
//! ```
//! use ethos_kernel::scorer_bank::{ConstantScorer, ScorerBank};
//! use ethos_types::{Head, HeadGroup};
//!
//! let bank = ScorerBank::builder()
//!     .with_all(|head| match head {
//!         Head::Ethical => Box::new(ConstantScorer(0.9)),
//!         _ => Box::new(ConstantScorer(0.1)),
//!     })
//!     .build()
//!     .unwrap();
//!
//! let scores = bank.evaluate_all(HeadGroup::Prompt, &[0.0; 4]);
//! assert_eq!(scores.len(), 3);
//! assert_eq!(bank.evaluate(Head::Ethical, &[]), 0.9);
//! ```

use std::collections::BTreeMap;

use ethos_types::{Direction, EthosError, Head, HeadGroup, Scores};
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// Scorer trait
// ────────────────────────────────────────────────────────────────────────────

/// A single pluggable scoring capability.
pub trait Scorer: Send + Sync {
    /// Score `input`.  Values outside `[0, 1]` are clamped by the bank.
    fn score(&self, input: &[f32]) -> f32;
}

impl<F> Scorer for F
where
    F: Fn(&[f32]) -> f32 + Send + Sync,
{
    fn score(&self, input: &[f32]) -> f32 {
        self(input)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in scorers
// ────────────────────────────────────────────────────────────────────────────

/// Always returns the same score.
#[derive(Debug, Clone, Copy)]
pub struct ConstantScorer(pub f32);

impl Scorer for ConstantScorer {
    fn score(&self, _input: &[f32]) -> f32 {
        self.0
    }
}

/// Logistic head: `σ(w · x + b)`.
///
/// Inputs longer than the weight vector are truncated; shorter ones are
/// treated as zero-padded.
#[derive(Debug, Clone)]
pub struct LinearScorer {
    weights: Vec<f32>,
    bias: f32,
}

impl LinearScorer {
    pub fn new(weights: Vec<f32>, bias: f32) -> Self {
        Self { weights, bias }
    }

    /// Every weight set to `weight`.
    pub fn uniform(dim: usize, weight: f32, bias: f32) -> Self {
        Self::new(vec![weight; dim], bias)
    }
}

impl Scorer for LinearScorer {
    fn score(&self, input: &[f32]) -> f32 {
        let z: f32 = self
            .weights
            .iter()
            .zip(input)
            .map(|(w, x)| w * x)
            .sum::<f32>()
            + self.bias;
        1.0 / (1.0 + (-z).exp())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ScorerBank
// ────────────────────────────────────────────────────────────────────────────

/// Holds exactly one [`Scorer`] per [`Head`].
pub struct ScorerBank {
    scorers: BTreeMap<Head, Box<dyn Scorer>>,
}

impl ScorerBank {
    pub fn builder() -> ScorerBankBuilder {
        ScorerBankBuilder::default()
    }

    /// Score `input` with the scorer registered for `head`.
    pub fn evaluate(&self, head: Head, input: &[f32]) -> f32 {
        // `build` guarantees every head is registered.
        let raw = self
            .scorers
            .get(&head)
            .map(|s| s.score(input))
            .unwrap_or(f32::NAN);
        sanitize(head, raw)
    }

    /// Score `input` with every head of `group`.
    pub fn evaluate_all(&self, group: HeadGroup, input: &[f32]) -> Scores {
        let scores: Scores = Head::in_group(group)
            .map(|head| (head, self.evaluate(head, input)))
            .collect();
        debug!(?group, ?scores, "scorer group evaluated");
        scores
    }
}

/// Clamp finite scores to `[0, 1]`; map non-finite ones to the failing
/// extreme of the head.
fn sanitize(head: Head, raw: f32) -> f32 {
    if raw.is_finite() {
        return raw.clamp(0.0, 1.0);
    }
    let fallback = head
        .default_rule()
        .map(|(_, direction)| direction.failing_extreme())
        .unwrap_or(Direction::PassAbove.failing_extreme());
    warn!(%head, raw, fallback, "scorer returned a non-finite value; failing closed");
    fallback
}

/// Incrementally registers scorers, then checks that every head is covered.
#[derive(Default)]
pub struct ScorerBankBuilder {
    scorers: BTreeMap<Head, Box<dyn Scorer>>,
}

impl ScorerBankBuilder {
    /// Register (or replace) the scorer for `head`.
    pub fn with(mut self, head: Head, scorer: impl Scorer + 'static) -> Self {
        self.scorers.insert(head, Box::new(scorer));
        self
    }

    /// Register a scorer for every head from a factory.
    pub fn with_all(mut self, mut factory: impl FnMut(Head) -> Box<dyn Scorer>) -> Self {
        for head in Head::ALL {
            self.scorers.insert(head, factory(head));
        }
        self
    }

    /// Finish the bank.
    ///
    /// # Errors
    ///
    /// [`EthosError::MissingScorer`] for the first head (in canonical order)
    /// that has no scorer.
    pub fn build(self) -> Result<ScorerBank, EthosError> {
        if let Some(head) = Head::ALL.into_iter().find(|h| !self.scorers.contains_key(h)) {
            return Err(EthosError::MissingScorer(head));
        }
        Ok(ScorerBank {
            scorers: self.scorers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn constant_bank(value: f32) -> ScorerBank {
        ScorerBank::builder()
            .with_all(|_| Box::new(ConstantScorer(value)))
            .build()
            .unwrap()
    }

    #[test]
    fn build_without_every_head_fails() {
        let result = ScorerBank::builder()
            .with(Head::Ethical, ConstantScorer(0.9))
            .build();
        assert!(matches!(result, Err(EthosError::MissingScorer(Head::Misuse))));
    }

    #[test]
    fn with_replaces_existing_scorer() {
        let bank = ScorerBank::builder()
            .with_all(|_| Box::new(ConstantScorer(0.1)))
            .with(Head::Zealot, ConstantScorer(0.7))
            .build()
            .unwrap();
        assert_eq!(bank.evaluate(Head::Zealot, &[]), 0.7);
        assert_eq!(bank.evaluate(Head::Intent, &[]), 0.1);
    }

    #[test]
    fn closures_are_scorers() {
        let bank = ScorerBank::builder()
            .with_all(|_| Box::new(ConstantScorer(0.0)))
            .with(Head::Hacking, |x: &[f32]| x.iter().sum::<f32>() / 10.0)
            .build()
            .unwrap();
        assert!((bank.evaluate(Head::Hacking, &[1.0, 2.0]) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        assert_eq!(constant_bank(3.5).evaluate(Head::Misuse, &[]), 1.0);
        assert_eq!(constant_bank(-2.0).evaluate(Head::Ethical, &[]), 0.0);
    }

    #[test]
    fn non_finite_scores_fail_closed() {
        let bank = constant_bank(f32::NAN);
        assert_eq!(bank.evaluate(Head::Ethical, &[]), 0.0);
        assert_eq!(bank.evaluate(Head::Introspection, &[]), 0.0);
        for head in &Head::GATED[1..] {
            assert_eq!(bank.evaluate(*head, &[]), 1.0);
        }
    }

    #[test]
    fn evaluate_all_covers_exactly_the_group() {
        let bank = constant_bank(0.2);
        let action = bank.evaluate_all(HeadGroup::Action, &[0.0; 3]);
        let heads: Vec<Head> = action.iter().map(|(h, _)| h).collect();
        assert_eq!(heads, Head::ACTION_GROUP);

        let memory = bank.evaluate_all(HeadGroup::Memory, &[0.0; 3]);
        assert_eq!(memory.iter().map(|(h, _)| h).collect::<Vec<_>>(), vec![Head::Introspection]);
    }

    #[test]
    fn heads_are_evaluated_independently() {
        // Each scorer sees only the input vector; counting calls proves every
        // head in the group is invoked exactly once per evaluation.
        let calls = Arc::new(AtomicUsize::new(0));
        let bank = ScorerBank::builder()
            .with_all(|_| {
                let calls = Arc::clone(&calls);
                Box::new(move |_: &[f32]| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    0.5
                })
            })
            .build()
            .unwrap();
        bank.evaluate_all(HeadGroup::Prompt, &[1.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn linear_scorer_is_logistic() {
        let zero = LinearScorer::uniform(4, 0.0, 0.0);
        assert!((zero.score(&[1.0, 2.0, 3.0, 4.0]) - 0.5).abs() < 1e-6);

        let steep = LinearScorer::new(vec![10.0, -10.0], 0.0);
        assert!(steep.score(&[1.0, 0.0]) > 0.99);
        assert!(steep.score(&[0.0, 1.0]) < 0.01);
    }

    #[test]
    fn linear_scorer_tolerates_width_mismatch() {
        let s = LinearScorer::new(vec![1.0, 1.0], 0.0);
        assert_eq!(s.score(&[0.0]), 0.5);
        assert_eq!(s.score(&[0.0, 0.0, 100.0]), 0.5);
    }
}
