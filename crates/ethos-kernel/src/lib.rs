//! `ethos-kernel` – Safety Gate
//!
//! The part of Ethos that judges.  It does not remember and it does not act;
//! it scores, decides and integrates.
//!
//! # Modules
//!
//! - [`scorer_bank`] – [`ScorerBank`][scorer_bank::ScorerBank]: one pluggable
//!   [`Scorer`][scorer_bank::Scorer] per [`Head`][ethos_types::Head],
//!   evaluated independently and clamped to `[0, 1]`.
//! - [`gating`] – [`GatingPolicy`][gating::GatingPolicy]: per-head thresholds
//!   and directions folded into an all-or-nothing
//!   [`GateResult`][gating::GateResult] that names every failing head.
//! - [`intrinsic`] – [`IntrinsicStateTracker`][intrinsic::IntrinsicStateTracker]:
//!   integrates recall coherence and all scores into one running scalar,
//!   with optional decay and clamping.
//!
//! [`ScorerBank`] and [`GatingPolicy`] are immutable after construction and
//! can be shared across pipelines behind an `Arc`.

pub mod gating;
pub mod intrinsic;
pub mod scorer_bank;

pub use gating::{GateResult, GateRule, GatingPolicy};
pub use intrinsic::{IntrinsicPolicy, IntrinsicStateTracker};
pub use scorer_bank::{ConstantScorer, LinearScorer, Scorer, ScorerBank, ScorerBankBuilder};
