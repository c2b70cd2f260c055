//! [`PipelineConfig`] – construction parameters of a
//! [`DecisionPipeline`](crate::pipeline::DecisionPipeline).
//!
//! Every field has a serde default so a partial TOML/JSON document is a valid
//! configuration.  Call [`PipelineConfig::validate`] (done automatically by
//! [`DecisionPipeline::new`](crate::pipeline::DecisionPipeline::new)) before
//! use.

use std::collections::BTreeMap;

use ethos_kernel::{GatingPolicy, IntrinsicPolicy};
use ethos_memory::{DEFAULT_RECALL_WINDOW, DEFAULT_TRANSPARENCY_CAPACITY};
use ethos_types::{EthosError, Head, RecordLayout};
use serde::{Deserialize, Serialize};

/// Configuration bundle for [`DecisionPipeline`](crate::pipeline::DecisionPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of the decision memory bank.
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,

    /// Capacity of the transparency log.
    #[serde(default = "default_transparency_capacity")]
    pub transparency_capacity: usize,

    /// Number of recent sensor states used for coherence.
    #[serde(default = "default_recall_window")]
    pub recall_window: usize,

    /// Optional path to a SQLite decision archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,

    /// Fixed vector widths.
    #[serde(default)]
    pub layout: RecordLayout,

    /// Accumulator rate, decay and clamp.
    #[serde(default)]
    pub intrinsic: IntrinsicPolicy,

    /// Per-head threshold overrides keyed by head name (e.g. `zealot = 0.25`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, f32>,
}

fn default_memory_size() -> usize {
    256
}
fn default_transparency_capacity() -> usize {
    DEFAULT_TRANSPARENCY_CAPACITY
}
fn default_recall_window() -> usize {
    DEFAULT_RECALL_WINDOW
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            memory_size: default_memory_size(),
            transparency_capacity: default_transparency_capacity(),
            recall_window: default_recall_window(),
            archive_path: None,
            layout: RecordLayout::default(),
            intrinsic: IntrinsicPolicy::default(),
            thresholds: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Check capacities, layout, intrinsic policy and threshold overrides.
    pub fn validate(&self) -> Result<(), EthosError> {
        for (name, value) in [
            ("memory_size", self.memory_size),
            ("transparency_capacity", self.transparency_capacity),
            ("recall_window", self.recall_window),
            ("layout.sensor_dim", self.layout.sensor_dim),
            ("layout.action_dim", self.layout.action_dim),
            ("layout.prompt_dim", self.layout.prompt_dim),
        ] {
            if value == 0 {
                return Err(EthosError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }
        self.intrinsic.validate()?;
        self.gating_policy()?;
        Ok(())
    }

    /// Threshold overrides parsed into [`Head`] keys.
    pub fn threshold_overrides(&self) -> Result<BTreeMap<Head, f32>, EthosError> {
        self.thresholds
            .iter()
            .map(|(name, value)| Ok((name.parse::<Head>()?, *value)))
            .collect()
    }

    /// The default gating policy with this config's overrides applied.
    pub fn gating_policy(&self) -> Result<GatingPolicy, EthosError> {
        GatingPolicy::with_thresholds(&self.threshold_overrides()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.transparency_capacity, 1000);
        assert_eq!(cfg.recall_window, 10);
    }

    #[test]
    fn zero_memory_size_is_rejected() {
        let cfg = PipelineConfig {
            memory_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EthosError::InvalidConfig(msg)) if msg.contains("memory_size")));
    }

    #[test]
    fn unknown_threshold_head_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.thresholds.insert("telepathy".to_string(), 0.5);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.thresholds.insert("misuse".to_string(), 2.0);
        assert!(matches!(
            cfg.validate(),
            Err(EthosError::InvalidThreshold { head: Head::Misuse, .. })
        ));
    }

    #[test]
    fn overrides_reach_the_gating_policy() {
        let mut cfg = PipelineConfig::default();
        cfg.thresholds.insert("war_risk".to_string(), 0.6);
        let policy = cfg.gating_policy().unwrap();
        assert_eq!(policy.rule(Head::WarRisk).unwrap().threshold, 0.6);
        assert_eq!(policy.rule(Head::Zealot).unwrap().threshold, 0.3);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"memory_size": 8}"#).unwrap();
        assert_eq!(cfg.memory_size, 8);
        assert_eq!(cfg.layout, RecordLayout::default());
        assert_eq!(cfg.intrinsic, IntrinsicPolicy::default());
    }
}
