//! Decision Memory Bank.
//!
//! A fixed-capacity FIFO of [`DecisionRecord`]s with attention-style recall.
//! Inserting past capacity evicts the single oldest record.
//!
//! # Recall
//!
//! Given a query in sensor space, every stored record receives an attention
//! weight from the scaled dot product with its sensor state:
//!
//! ```text
//! w_i = softmax_i( q · s_i / sqrt(sensor_dim) )
//! summary = Σ w_i * encode(record_i)
//! ```
//!
//! `coherence` is the mean cosine similarity between the query and the most
//! recent `recall_window` sensor states.  An empty bank recalls a zero summary
//! with coherence `0`.
//!
//! # Example
//!
//! ```rust
//! use ethos_memory::bank::MemoryBank;
//! use ethos_types::{DecisionRecord, DerivedScores, Head, RecordLayout};
//!
//! let layout = RecordLayout { sensor_dim: 2, action_dim: 1, context_dim: 1, prompt_dim: 1 };
//! let mut bank = MemoryBank::new(layout, 2);
//!
//! let record = DecisionRecord {
//!     sensor_state: vec![1.0, 0.0],
//!     action: vec![0.5],
//!     reward: 1.0,
//!     context: vec![0.0],
//!     scores: Head::ACTION_GROUP.into_iter().map(|h| (h, 0.1)).collect(),
//!     derived_scores: DerivedScores::default(),
//! };
//! bank.insert(record).unwrap();
//!
//! let recall = bank.recall(&[1.0, 0.0]).unwrap();
//! assert!((recall.coherence - 1.0).abs() < 1e-6);
//! assert_eq!(recall.summary.len(), bank.summary_dim());
//! ```

use std::collections::VecDeque;

use ethos_types::{DecisionRecord, EthosError, Head, RecordLayout, check_finite, check_len};
use tracing::trace;

/// Number of most recent sensor states compared against the query when
/// computing coherence.
pub const DEFAULT_RECALL_WINDOW: usize = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Similarity
// ─────────────────────────────────────────────────────────────────────────────

/// Dot product accumulated in `f64`, so finite `f32` inputs never overflow.
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

fn norm(a: &[f32]) -> f64 {
    a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt()
}

/// Compute the cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector has zero norm.
/// Any finite input yields a finite result.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (norm_a, norm_b) = (norm(a), norm(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = dot(a, b) / norm_a / norm_b;
    cos.clamp(-1.0, 1.0) as f32
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordEncoder
// ─────────────────────────────────────────────────────────────────────────────

/// Embeds a stored record into the vector space the recall summary lives in.
///
/// Implement this to plug in a learned projection; the bank only requires
/// that every call returns exactly [`dim`](RecordEncoder::dim) values.
pub trait RecordEncoder: Send + Sync {
    fn dim(&self) -> usize;

    fn encode(&self, record: &DecisionRecord) -> Vec<f32>;
}

/// Default encoder: what was done and how it went.
///
/// `concat(action, [reward], action-group scores, derived scores)`, so the
/// summary width is `action_dim + 10`.
#[derive(Debug, Clone)]
pub struct OutcomeEncoder {
    action_dim: usize,
}

impl OutcomeEncoder {
    pub fn new(layout: &RecordLayout) -> Self {
        Self {
            action_dim: layout.action_dim,
        }
    }
}

impl RecordEncoder for OutcomeEncoder {
    fn dim(&self) -> usize {
        self.action_dim + 1 + Head::ACTION_GROUP.len() + 4
    }

    fn encode(&self, record: &DecisionRecord) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dim());
        out.extend_from_slice(&record.action);
        out.push(record.reward);
        out.extend(record.scores.iter().map(|(_, s)| s));
        out.extend(record.derived_scores.to_array());
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryBank
// ─────────────────────────────────────────────────────────────────────────────

/// Output of [`MemoryBank::recall`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recall {
    /// Attention-weighted average of the encoded records.
    pub summary: Vec<f32>,
    /// Mean cosine similarity of the query to the recent window.
    pub coherence: f32,
}

/// Fixed-capacity FIFO store of [`DecisionRecord`]s.
pub struct MemoryBank {
    layout: RecordLayout,
    capacity: usize,
    recall_window: usize,
    encoder: Box<dyn RecordEncoder>,
    records: VecDeque<DecisionRecord>,
}

impl MemoryBank {
    /// A bank using [`OutcomeEncoder`] and [`DEFAULT_RECALL_WINDOW`].
    pub fn new(layout: RecordLayout, capacity: usize) -> Self {
        let encoder = Box::new(OutcomeEncoder::new(&layout));
        Self::with_encoder(layout, capacity, DEFAULT_RECALL_WINDOW, encoder)
    }

    pub fn with_encoder(
        layout: RecordLayout,
        capacity: usize,
        recall_window: usize,
        encoder: Box<dyn RecordEncoder>,
    ) -> Self {
        Self {
            layout,
            capacity,
            recall_window,
            encoder,
            records: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `record`, evicting the oldest one when over capacity.
    ///
    /// Returns [`EthosError::ShapeMismatch`] (and leaves the bank untouched)
    /// when the record does not fit the layout.
    pub fn insert(&mut self, record: DecisionRecord) -> Result<(), EthosError> {
        record.check_layout(&self.layout)?;
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
            trace!(capacity = self.capacity, "memory bank evicted oldest record");
        }
        Ok(())
    }

    /// Attention-weighted recall.  Read-only and deterministic.
    pub fn recall(&self, query: &[f32]) -> Result<Recall, EthosError> {
        check_len("query", self.layout.sensor_dim, query)?;
        check_finite("query", query)?;

        let dim = self.encoder.dim();
        if self.records.is_empty() {
            return Ok(Recall {
                summary: vec![0.0; dim],
                coherence: 0.0,
            });
        }

        let scale = (self.layout.sensor_dim as f64).sqrt().max(1.0);
        let logits: Vec<f64> = self
            .records
            .iter()
            .map(|r| dot(query, &r.sensor_state) / scale)
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        // The maximum logit contributes exp(0) = 1, so the total is >= 1.
        let total: f64 = exps.iter().sum();

        // A convex combination of finite f32 values stays within f32 range.
        let mut acc = vec![0.0f64; dim];
        for (record, weight) in self.records.iter().zip(&exps) {
            let weight = weight / total;
            for (slot, value) in acc.iter_mut().zip(self.encoder.encode(record)) {
                *slot += weight * f64::from(value);
            }
        }
        let summary: Vec<f32> = acc.into_iter().map(|v| v as f32).collect();

        let window: Vec<&DecisionRecord> = self.recent(self.recall_window).collect();
        let coherence = window
            .iter()
            .map(|r| cosine_similarity(query, &r.sensor_state))
            .sum::<f32>()
            / window.len().max(1) as f32;

        trace!(records = self.records.len(), window = window.len(), coherence, "memory recall");
        Ok(Recall { summary, coherence })
    }

    /// The `k` most recent records, oldest first.
    pub fn recent(&self, k: usize) -> impl Iterator<Item = &DecisionRecord> {
        self.records.iter().skip(self.records.len().saturating_sub(k))
    }

    /// All records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Width of the recall summary.
    pub fn summary_dim(&self) -> usize {
        self.encoder.dim()
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
