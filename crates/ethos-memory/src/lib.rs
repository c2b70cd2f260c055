//! `ethos-memory` – bounded decision history.
//!
//! Gives the pipeline its recall capability and its audit trail, plus an
//! optional SQLite mirror of both.
//!
//! # Modules
//!
//! - [`bank`] – [`MemoryBank`][bank::MemoryBank]: a fixed-capacity FIFO of
//!   [`DecisionRecord`][ethos_types::DecisionRecord]s with attention-weighted
//!   recall and a coherence signal over the most recent window.  The record
//!   embedding used for the recall summary is pluggable through
//!   [`RecordEncoder`][bank::RecordEncoder].
//! - [`transparency`] – [`TransparencyLog`][transparency::TransparencyLog]:
//!   a fixed-capacity FIFO of
//!   [`TransparencyEntry`][ethos_types::TransparencyEntry] values with
//!   restartable iteration and copy-on-read snapshots.
//! - [`archive`] – [`DecisionArchive`][archive::DecisionArchive]: persists
//!   decision records and transparency entries to a local SQLite database.

pub mod archive;
pub mod bank;
pub mod transparency;

pub use archive::{ArchiveError, DecisionArchive};
pub use bank::{
    DEFAULT_RECALL_WINDOW, MemoryBank, OutcomeEncoder, Recall, RecordEncoder, cosine_similarity,
};
pub use transparency::{DEFAULT_TRANSPARENCY_CAPACITY, TransparencyLog, TransparencySnapshot};
