//! [`DecisionPipeline`] – the per-action orchestrator.
//!
//! One call to [`DecisionPipeline::decide_and_record`] runs a full cycle:
//!
//! 1. **Validate** – every input vector is checked against the
//!    [`RecordLayout`] and for NaN/±inf before any state is touched.
//! 2. **Recall** – the [`MemoryBank`] is queried with
//!    [`derive_query`]`(sensor_state)` for a summary and a coherence value.
//! 3. **Score** – the action group sees `concat(proposed_action, summary,
//!    context)`, the prompt group sees the prompt embedding and the
//!    introspection head sees the recall summary.
//! 4. **Gate** – [`GatingPolicy::decide`] over all scores.  A denied action
//!    is replaced with zeros of the same width.
//! 5. **Integrate** – the [`IntrinsicStateTracker`] folds in coherence and
//!    all scores.
//! 6. **Record** – a [`DecisionRecord`] goes into memory and a
//!    [`TransparencyEntry`] into the log, whether the action was allowed or
//!    not.  When a [`DecisionArchive`] is attached both are written to it in
//!    one transaction first.
//!
//! Every fallible step of the cycle, archive write included, runs before the
//! first in-memory mutation, so an error leaves memory, log, intrinsic state
//! and numbering exactly as they were.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use ethos_kernel::{ConstantScorer, ScorerBank};
//! use ethos_runtime::{DecisionInput, DecisionPipeline, PipelineConfig};
//! use ethos_types::{Head, RecordLayout};
//!
//! let config = PipelineConfig {
//!     layout: RecordLayout { sensor_dim: 4, action_dim: 2, context_dim: 1, prompt_dim: 3 },
//!     memory_size: 8,
//!     ..PipelineConfig::default()
//! };
//! let scorers = ScorerBank::builder()
//!     .with_all(|head| match head {
//!         Head::Ethical | Head::Introspection => Box::new(ConstantScorer(0.9)),
//!         _ => Box::new(ConstantScorer(0.1)),
//!     })
//!     .build()
//!     .unwrap();
//! let mut pipeline = DecisionPipeline::new(&config, Arc::new(scorers)).unwrap();
//!
//! let decision = pipeline
//!     .decide_and_record(&DecisionInput {
//!         sensor_state: &[1.0, 0.0, 0.0, 0.0],
//!         proposed_action: &[0.5, -0.5],
//!         reward: 1.0,
//!         context: &[0.0],
//!         prompt_embedding: &[0.0; 3],
//!     })
//!     .unwrap();
//!
//! assert!(decision.allowed());
//! assert_eq!(decision.final_action, vec![0.5, -0.5]);
//! assert_eq!(pipeline.memory().len(), 1);
//! assert_eq!(pipeline.transparency().len(), 1);
//! ```

use std::sync::Arc;

use chrono::Utc;
use ethos_kernel::{GateResult, GatingPolicy, IntrinsicStateTracker, ScorerBank};
use ethos_memory::{DecisionArchive, MemoryBank, OutcomeEncoder, TransparencyLog};
use ethos_types::{
    DecisionRecord, DerivedScores, EthosError, HeadGroup, RecordLayout, Scores,
    TransparencyEntry, check_finite, check_len,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Inputs and outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Borrowed inputs of one decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub sensor_state: &'a [f32],
    pub proposed_action: &'a [f32],
    /// Recorded only; never used for scoring.
    pub reward: f32,
    pub context: &'a [f32],
    pub prompt_embedding: &'a [f32],
}

/// Outcome of [`DecisionPipeline::decide_and_record`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Decision number assigned by the pipeline, starting at 1.
    pub seq: u64,
    /// The proposed action when allowed, zeros otherwise.
    pub final_action: Vec<f32>,
    /// The five action-group scores.
    pub action_scores: Scores,
    pub derived_scores: DerivedScores,
    /// Full gate outcome, including all nine scores.
    pub gate: GateResult,
    pub coherence: f32,
    /// Intrinsic state after this decision.
    pub intrinsic_state: f32,
}

impl Decision {
    pub fn allowed(&self) -> bool {
        self.gate.allowed
    }

    /// `(final_action, action_scores, derived_scores)`.
    pub fn into_parts(self) -> (Vec<f32>, Scores, DerivedScores) {
        (self.final_action, self.action_scores, self.derived_scores)
    }
}

/// Recall query for a sensor state.  The identity: the bank attends in
/// sensor space.
pub fn derive_query(sensor_state: &[f32]) -> &[f32] {
    sensor_state
}

// ─────────────────────────────────────────────────────────────────────────────
// DecisionPipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Owns one agent's memory, audit log and intrinsic state; shares the
/// immutable scorer bank and gating policy.
pub struct DecisionPipeline {
    layout: RecordLayout,
    scorers: Arc<ScorerBank>,
    gating: Arc<GatingPolicy>,
    memory: MemoryBank,
    transparency: TransparencyLog,
    intrinsic: IntrinsicStateTracker,
    archive: Option<DecisionArchive>,
    seq: u64,
}

impl DecisionPipeline {
    /// Build a pipeline whose gating policy is the default one with
    /// `config.thresholds` applied.
    ///
    /// When `config.archive_path` is set the SQLite archive at that path is
    /// opened (or created) and decision numbering continues after its
    /// highest stored entry.
    ///
    /// # Errors
    ///
    /// - [`EthosError::InvalidConfig`] / [`EthosError::InvalidThreshold`] when
    ///   the configuration does not validate.
    /// - [`EthosError::Archive`] when the archive cannot be opened.
    pub fn new(config: &PipelineConfig, scorers: Arc<ScorerBank>) -> Result<Self, EthosError> {
        let gating = Arc::new(config.gating_policy()?);
        Self::with_policy(config, scorers, gating)
    }

    /// Like [`new`](Self::new) but with an explicit, possibly shared, gating
    /// policy.  `config.thresholds` is still validated but not applied.
    pub fn with_policy(
        config: &PipelineConfig,
        scorers: Arc<ScorerBank>,
        gating: Arc<GatingPolicy>,
    ) -> Result<Self, EthosError> {
        config.validate()?;
        let layout = config.layout;
        let memory = MemoryBank::with_encoder(
            layout,
            config.memory_size,
            config.recall_window,
            Box::new(OutcomeEncoder::new(&layout)),
        );

        let mut pipeline = Self {
            layout,
            scorers,
            gating,
            memory,
            transparency: TransparencyLog::new(config.transparency_capacity),
            intrinsic: IntrinsicStateTracker::new(config.intrinsic),
            archive: None,
            seq: 0,
        };

        if let Some(path) = &config.archive_path {
            info!("opening decision archive at: {}", path);
            let archive = DecisionArchive::open(path).map_err(EthosError::from)?;
            pipeline.attach_archive(archive)?;
        }
        Ok(pipeline)
    }

    /// Mirror every subsequent decision to `archive`.  Numbering continues
    /// after the archive's highest stored decision.
    pub fn attach_archive(&mut self, archive: DecisionArchive) -> Result<(), EthosError> {
        if let Some(last) = archive.last_seq().map_err(EthosError::from)? {
            self.seq = self.seq.max(last);
        }
        self.archive = Some(archive);
        Ok(())
    }

    /// Detach and return the archive, if any.
    pub fn detach_archive(&mut self) -> Option<DecisionArchive> {
        self.archive.take()
    }

    /// Run one full decision cycle.
    ///
    /// Denied actions are **not** errors: they are returned with
    /// `allowed() == false` and a zeroed `final_action`, and are recorded
    /// like any other decision.
    ///
    /// # Errors
    ///
    /// - [`EthosError::ShapeMismatch`] when an input vector has the wrong
    ///   width.
    /// - [`EthosError::InvalidType`] when an input holds NaN or ±inf.
    /// - [`EthosError::Archive`] when writing to an attached archive fails.
    ///
    /// No state changes on any error, so the call can simply be retried.
    #[instrument(skip_all, fields(seq = self.seq + 1))]
    pub fn decide_and_record(&mut self, input: &DecisionInput<'_>) -> Result<Decision, EthosError> {
        self.validate(input)?;

        let recall = self.memory.recall(derive_query(input.sensor_state))?;
        debug!(coherence = recall.coherence, "memory recalled");

        let action_input: Vec<f32> = input
            .proposed_action
            .iter()
            .chain(&recall.summary)
            .chain(input.context)
            .copied()
            .collect();
        let action_scores = self.scorers.evaluate_all(HeadGroup::Action, &action_input);
        let mut scores = action_scores.clone();
        scores.merge(&self.scorers.evaluate_all(HeadGroup::Prompt, input.prompt_embedding));
        scores.merge(&self.scorers.evaluate_all(HeadGroup::Memory, &recall.summary));

        let gate = self.gating.decide(&scores)?;
        let derived_scores = DerivedScores::from_scores(&scores)?;
        let final_action = if gate.allowed {
            input.proposed_action.to_vec()
        } else {
            warn!(denied_by = ?gate.denied_by, "action denied; emitting zero action");
            vec![0.0; input.proposed_action.len()]
        };

        let record = DecisionRecord {
            sensor_state: input.sensor_state.to_vec(),
            action: final_action.clone(),
            reward: input.reward,
            context: input.context.to_vec(),
            scores: action_scores.clone(),
            derived_scores,
        };
        record.check_layout(&self.layout)?;
        let intrinsic_state = self.intrinsic.preview(recall.coherence, &scores)?;

        let seq = self.seq + 1;
        let entry = TransparencyEntry {
            seq,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            proposed_action: input.proposed_action.to_vec(),
            final_action: final_action.clone(),
            allowed: gate.allowed,
            denied_by: gate.denied_by.clone(),
            scores: scores.clone(),
            coherence: recall.coherence,
            intrinsic_state,
        };
        if let Some(archive) = &self.archive {
            archive
                .store_decision(&record, &entry, self.transparency.capacity())
                .map_err(EthosError::from)?;
        }

        // Nothing below can fail.
        self.intrinsic.update(recall.coherence, &scores)?;
        self.memory.insert(record)?;
        self.seq = seq;
        info!(
            seq,
            allowed = gate.allowed,
            coherence = recall.coherence,
            intrinsic_state,
            "decision recorded"
        );
        self.transparency.append(entry);

        Ok(Decision {
            seq: self.seq,
            final_action,
            action_scores,
            derived_scores,
            gate,
            coherence: recall.coherence,
            intrinsic_state,
        })
    }

    fn validate(&self, input: &DecisionInput<'_>) -> Result<(), EthosError> {
        let layout = &self.layout;
        for (field, expected, values) in [
            ("sensor_state", layout.sensor_dim, input.sensor_state),
            ("proposed_action", layout.action_dim, input.proposed_action),
            ("context", layout.context_dim, input.context),
            ("prompt_embedding", layout.prompt_dim, input.prompt_embedding),
        ] {
            check_len(field, expected, values)?;
            check_finite(field, values)?;
        }
        check_finite("reward", &[input.reward])
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn memory(&self) -> &MemoryBank {
        &self.memory
    }

    pub fn transparency(&self) -> &TransparencyLog {
        &self.transparency
    }

    pub fn intrinsic_state(&self) -> f32 {
        self.intrinsic.state()
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    pub fn scorers(&self) -> &Arc<ScorerBank> {
        &self.scorers
    }

    pub fn gating(&self) -> &Arc<GatingPolicy> {
        &self.gating
    }

    pub fn archive(&self) -> Option<&DecisionArchive> {
        self.archive.as_ref()
    }

    /// Number of the most recent decision (0 before the first one).
    pub fn last_seq(&self) -> u64 {
        self.seq
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
