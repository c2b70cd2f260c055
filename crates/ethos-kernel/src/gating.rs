//! [`GatingPolicy`] – the all-or-nothing allow/deny rule.
//!
//! Every configured [`GateRule`] compares one head's score against its
//! threshold.  The action is allowed only when **every** rule passes; there
//! is no partial allow and no per-head override.
//!
//! Unlike a short-circuiting boolean, [`GatingPolicy::decide`] visits every
//! rule and reports all failing heads in [`GateResult::denied_by`], so the
//! transparency log can say which rule fired.
//!
//! # Example
//!
//! ```
//! use ethos_kernel::GatingPolicy;
//! use ethos_types::{Head, Scores};
//!
//! let policy = GatingPolicy::default();
//!
//! let mut scores: Scores = Head::GATED.into_iter().map(|h| (h, 0.1)).collect();
//! scores.insert(Head::Ethical, 0.9);
//! assert!(policy.decide(&scores).unwrap().allowed);
//!
//! scores.insert(Head::Zealot, 0.9);
//! let result = policy.decide(&scores).unwrap();
//! assert!(!result.allowed);
//! assert_eq!(result.denied_by, vec![Head::Zealot]);
//! ```

use std::collections::BTreeMap;

use ethos_types::{Direction, EthosError, Head, Scores};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// GateRule
// ────────────────────────────────────────────────────────────────────────────

/// Threshold and comparison direction for one head.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateRule {
    pub head: Head,
    pub threshold: f32,
    pub direction: Direction,
}

impl GateRule {
    /// # Errors
    ///
    /// [`EthosError::InvalidThreshold`] when `threshold` is not a finite
    /// value in `[0, 1]`.
    pub fn new(head: Head, threshold: f32, direction: Direction) -> Result<Self, EthosError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(EthosError::InvalidThreshold {
                head,
                value: threshold,
            });
        }
        Ok(Self {
            head,
            threshold,
            direction,
        })
    }

    /// The published default rule for a gated head; `None` for
    /// `introspection`.
    pub fn default_for(head: Head) -> Option<Self> {
        head.default_rule().map(|(threshold, direction)| Self {
            head,
            threshold,
            direction,
        })
    }

    pub fn passes(&self, score: f32) -> bool {
        self.direction.passes(score, self.threshold)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GateResult
// ────────────────────────────────────────────────────────────────────────────

/// Structured outcome of [`GatingPolicy::decide`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub allowed: bool,
    /// The scores the decision was made on.
    pub scores: Scores,
    /// Failing heads in canonical order; empty iff `allowed`.
    pub denied_by: Vec<Head>,
}

// ────────────────────────────────────────────────────────────────────────────
// GatingPolicy
// ────────────────────────────────────────────────────────────────────────────

/// Immutable set of [`GateRule`]s, at most one per head.
#[derive(Debug, Clone, PartialEq)]
pub struct GatingPolicy {
    rules: Vec<GateRule>,
}

impl Default for GatingPolicy {
    /// One default rule for each of the eight gated heads.
    fn default() -> Self {
        Self {
            rules: Head::GATED
                .into_iter()
                .filter_map(GateRule::default_for)
                .collect(),
        }
    }
}

impl GatingPolicy {
    /// Build a policy from explicit rules.  Rules are kept in canonical head
    /// order.
    ///
    /// # Errors
    ///
    /// [`EthosError::InvalidConfig`] when two rules name the same head.
    pub fn new(mut rules: Vec<GateRule>) -> Result<Self, EthosError> {
        rules.sort_by_key(|r| r.head);
        if let Some(pair) = rules.windows(2).find(|w| w[0].head == w[1].head) {
            return Err(EthosError::InvalidConfig(format!(
                "duplicate gate rule for head '{}'",
                pair[0].head
            )));
        }
        Ok(Self { rules })
    }

    /// The default policy with some thresholds replaced.
    ///
    /// # Errors
    ///
    /// - [`EthosError::InvalidThreshold`] for an override outside `[0, 1]`.
    /// - [`EthosError::InvalidConfig`] for an override on a head that is not
    ///   gated.
    pub fn with_thresholds(overrides: &BTreeMap<Head, f32>) -> Result<Self, EthosError> {
        let mut policy = Self::default();
        for (head, threshold) in overrides {
            let rule = policy
                .rules
                .iter_mut()
                .find(|r| r.head == *head)
                .ok_or_else(|| {
                    EthosError::InvalidConfig(format!("head '{head}' is not gated"))
                })?;
            *rule = GateRule::new(*head, *threshold, rule.direction)?;
        }
        Ok(policy)
    }

    /// Decide whether the action scored by `scores` may proceed.
    ///
    /// Pure: the same scores always produce the same result.
    ///
    /// # Errors
    ///
    /// [`EthosError::MissingScore`] for the first rule (in canonical order)
    /// whose head is absent from `scores`.
    pub fn decide(&self, scores: &Scores) -> Result<GateResult, EthosError> {
        let mut denied_by = Vec::new();
        for rule in &self.rules {
            if !rule.passes(scores.require(rule.head)?) {
                denied_by.push(rule.head);
            }
        }
        Ok(GateResult {
            allowed: denied_by.is_empty(),
            scores: scores.clone(),
            denied_by,
        })
    }

    pub fn rules(&self) -> &[GateRule] {
        &self.rules
    }

    pub fn rule(&self, head: Head) -> Option<&GateRule> {
        self.rules.iter().find(|r| r.head == head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------ helpers

    /// Every gated head comfortably passing its default rule.
    fn passing_scores() -> Scores {
        Scores::from([
            (Head::Ethical, 0.9),
            (Head::Misuse, 0.1),
            (Head::Surveillance, 0.1),
            (Head::Manipulation, 0.1),
            (Head::Hacking, 0.1),
            (Head::Intent, 0.1),
            (Head::Zealot, 0.1),
            (Head::WarRisk, 0.1),
        ])
    }

    fn failing_value(head: Head) -> f32 {
        if head == Head::Ethical { 0.2 } else { 0.9 }
    }

    // ------------------------------------------------------------------ decide

    #[test]
    fn all_passing_scores_are_allowed() {
        let result = GatingPolicy::default().decide(&passing_scores()).unwrap();
        assert!(result.allowed);
        assert!(result.denied_by.is_empty());
    }

    #[test]
    fn any_single_failing_head_denies() {
        let policy = GatingPolicy::default();
        for head in Head::GATED {
            let mut scores = passing_scores();
            scores.insert(head, failing_value(head));
            let result = policy.decide(&scores).unwrap();
            assert!(!result.allowed, "{head} failing must deny");
            assert_eq!(result.denied_by, vec![head]);
        }
    }

    #[test]
    fn zealot_scenario_is_denied() {
        let mut scores = passing_scores();
        scores.insert(Head::Zealot, 0.9);
        let result = GatingPolicy::default().decide(&scores).unwrap();
        assert!(!result.allowed);
    }

    #[test]
    fn every_failing_head_is_attributed() {
        let mut scores = passing_scores();
        scores.insert(Head::WarRisk, 0.5);
        scores.insert(Head::Ethical, 0.5);
        scores.insert(Head::Hacking, 0.5);
        let result = GatingPolicy::default().decide(&scores).unwrap();
        assert_eq!(result.denied_by, vec![Head::Ethical, Head::Hacking, Head::WarRisk]);
    }

    #[test]
    fn threshold_boundary_fails() {
        let mut scores = passing_scores();
        scores.insert(Head::Ethical, 0.8);
        assert!(!GatingPolicy::default().decide(&scores).unwrap().allowed);

        let mut scores = passing_scores();
        scores.insert(Head::Misuse, 0.3);
        assert!(!GatingPolicy::default().decide(&scores).unwrap().allowed);
    }

    #[test]
    fn missing_head_is_an_error() {
        let mut scores = passing_scores().subset(&Head::ACTION_GROUP);
        scores.insert(Head::Intent, 0.1);
        let err = GatingPolicy::default().decide(&scores).unwrap_err();
        assert_eq!(err, EthosError::MissingScore(Head::Zealot));
    }

    #[test]
    fn introspection_score_is_ignored_by_default_policy() {
        let mut scores = passing_scores();
        scores.insert(Head::Introspection, 0.0);
        assert!(GatingPolicy::default().decide(&scores).unwrap().allowed);
    }

    #[test]
    fn decide_is_pure() {
        let policy = GatingPolicy::default();
        let scores = passing_scores();
        assert_eq!(policy.decide(&scores).unwrap(), policy.decide(&scores).unwrap());
    }

    // ------------------------------------------------------------------ construction

    #[test]
    fn default_policy_has_eight_rules() {
        let policy = GatingPolicy::default();
        assert_eq!(policy.rules().len(), 8);
        assert!(policy.rule(Head::Introspection).is_none());
        assert_eq!(policy.rule(Head::Ethical).unwrap().threshold, 0.8);
    }

    #[test]
    fn gate_rule_rejects_out_of_range_threshold() {
        assert!(matches!(
            GateRule::new(Head::Misuse, 1.2, Direction::PassBelow),
            Err(EthosError::InvalidThreshold { head: Head::Misuse, .. })
        ));
        assert!(GateRule::new(Head::Misuse, f32::NAN, Direction::PassBelow).is_err());
    }

    #[test]
    fn duplicate_rules_are_rejected() {
        let rule = GateRule::default_for(Head::Hacking).unwrap();
        assert!(matches!(
            GatingPolicy::new(vec![rule, rule]),
            Err(EthosError::InvalidConfig(_))
        ));
    }

    #[test]
    fn custom_rules_are_sorted_canonically() {
        let policy = GatingPolicy::new(vec![
            GateRule::default_for(Head::WarRisk).unwrap(),
            GateRule::default_for(Head::Ethical).unwrap(),
        ])
        .unwrap();
        let heads: Vec<Head> = policy.rules().iter().map(|r| r.head).collect();
        assert_eq!(heads, vec![Head::Ethical, Head::WarRisk]);
    }

    #[test]
    fn threshold_overrides_apply() {
        let overrides = BTreeMap::from([(Head::Zealot, 0.95)]);
        let policy = GatingPolicy::with_thresholds(&overrides).unwrap();
        let mut scores = passing_scores();
        scores.insert(Head::Zealot, 0.9);
        assert!(policy.decide(&scores).unwrap().allowed);
    }

    #[test]
    fn override_on_ungated_head_is_rejected() {
        let overrides = BTreeMap::from([(Head::Introspection, 0.5)]);
        assert!(matches!(
            GatingPolicy::with_thresholds(&overrides),
            Err(EthosError::InvalidConfig(_))
        ));
    }
}
