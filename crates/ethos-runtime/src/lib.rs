//! `ethos-runtime` – the decision pipeline.
//!
//! Wires memory, scoring, gating and the intrinsic accumulator into a single
//! synchronous call per proposed action.
//!
//! # Modules
//!
//! - [`pipeline`] – [`DecisionPipeline`][pipeline::DecisionPipeline]:
//!   validate, recall, score, gate, integrate and record.  Owns one agent's
//!   [`MemoryBank`][ethos_memory::MemoryBank],
//!   [`TransparencyLog`][ethos_memory::TransparencyLog] and intrinsic state,
//!   and shares the immutable [`ScorerBank`][ethos_kernel::ScorerBank] and
//!   [`GatingPolicy`][ethos_kernel::GatingPolicy] through `Arc`.
//! - [`config`] – [`PipelineConfig`][config::PipelineConfig]: capacities,
//!   layout, intrinsic policy, threshold overrides and the optional archive
//!   path.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.
//!
//! # Concurrency
//!
//! [`DecisionPipeline::decide_and_record`] takes `&mut self`; callers sharing
//! one pipeline across threads wrap it in a `Mutex`.  Independent pipelines
//! can share one scorer bank and one gating policy.

pub mod config;
pub mod pipeline;
pub mod telemetry;

pub use config::PipelineConfig;
pub use pipeline::{Decision, DecisionInput, DecisionPipeline, derive_query};
pub use telemetry::{LogFormat, TelemetryGuard, init_tracing};
