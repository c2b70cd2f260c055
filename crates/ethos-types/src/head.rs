//! The closed registry of scoring heads and the score map keyed by them.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::EthosError;

/// A named scoring head.
///
/// The eight gated heads decide whether an action is allowed; `Introspection`
/// is scored and recorded but never gated.  Declaration order is the
/// canonical order used for iteration, flattening and failure attribution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Head {
    Ethical,
    Misuse,
    Surveillance,
    Manipulation,
    Hacking,
    Intent,
    Zealot,
    WarRisk,
    Introspection,
}

/// Which input vector a head is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HeadGroup {
    /// `concat(proposed_action, memory_summary, context)`
    Action,
    /// The prompt embedding.
    Prompt,
    /// The memory summary.
    Memory,
}

/// Comparison applied between a head's score and its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Passes when `score > threshold`.
    PassAbove,
    /// Passes when `score < threshold`.
    PassBelow,
}

impl Direction {
    /// Strict comparison: a score equal to the threshold fails.
    pub fn passes(self, score: f32, threshold: f32) -> bool {
        match self {
            Direction::PassAbove => score > threshold,
            Direction::PassBelow => score < threshold,
        }
    }

    /// The score value that always fails this direction.
    pub fn failing_extreme(self) -> f32 {
        match self {
            Direction::PassAbove => 0.0,
            Direction::PassBelow => 1.0,
        }
    }
}

impl Head {
    /// Every head, in canonical order.
    pub const ALL: [Head; 9] = [
        Head::Ethical,
        Head::Misuse,
        Head::Surveillance,
        Head::Manipulation,
        Head::Hacking,
        Head::Intent,
        Head::Zealot,
        Head::WarRisk,
        Head::Introspection,
    ];

    /// The heads that take part in gating.
    pub const GATED: [Head; 8] = [
        Head::Ethical,
        Head::Misuse,
        Head::Surveillance,
        Head::Manipulation,
        Head::Hacking,
        Head::Intent,
        Head::Zealot,
        Head::WarRisk,
    ];

    /// Heads evaluated on the action/memory/context vector.
    pub const ACTION_GROUP: [Head; 5] = [
        Head::Ethical,
        Head::Misuse,
        Head::Surveillance,
        Head::Manipulation,
        Head::Hacking,
    ];

    /// Heads evaluated on the prompt embedding.
    pub const PROMPT_GROUP: [Head; 3] = [Head::Intent, Head::Zealot, Head::WarRisk];

    pub fn name(self) -> &'static str {
        match self {
            Head::Ethical => "ethical",
            Head::Misuse => "misuse",
            Head::Surveillance => "surveillance",
            Head::Manipulation => "manipulation",
            Head::Hacking => "hacking",
            Head::Intent => "intent",
            Head::Zealot => "zealot",
            Head::WarRisk => "war_risk",
            Head::Introspection => "introspection",
        }
    }

    pub fn group(self) -> HeadGroup {
        match self {
            Head::Ethical | Head::Misuse | Head::Surveillance | Head::Manipulation | Head::Hacking => {
                HeadGroup::Action
            }
            Head::Intent | Head::Zealot | Head::WarRisk => HeadGroup::Prompt,
            Head::Introspection => HeadGroup::Memory,
        }
    }

    /// Default `(threshold, direction)` for gated heads, `None` for
    /// `Introspection`.
    pub fn default_rule(self) -> Option<(f32, Direction)> {
        match self {
            Head::Ethical => Some((0.8, Direction::PassAbove)),
            Head::Introspection => None,
            _ => Some((0.3, Direction::PassBelow)),
        }
    }

    /// Every head belonging to `group`, in canonical order.
    pub fn in_group(group: HeadGroup) -> impl Iterator<Item = Head> + Clone {
        Head::ALL.into_iter().filter(move |h| h.group() == group)
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Head {
    type Err = EthosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Head::ALL
            .into_iter()
            .find(|h| h.name() == s)
            .ok_or_else(|| EthosError::InvalidConfig(format!("unknown head '{s}'")))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scores
// ────────────────────────────────────────────────────────────────────────────

/// Mapping from [`Head`] to a score in `[0, 1]`, iterated in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Scores(BTreeMap<Head, f32>);

impl Scores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the score for `head`.
    pub fn insert(&mut self, head: Head, score: f32) {
        self.0.insert(head, score);
    }

    pub fn get(&self, head: Head) -> Option<f32> {
        self.0.get(&head).copied()
    }

    /// Like [`get`](Self::get) but reports an absent head as
    /// [`EthosError::MissingScore`].
    pub fn require(&self, head: Head) -> Result<f32, EthosError> {
        self.get(head).ok_or(EthosError::MissingScore(head))
    }

    pub fn contains(&self, head: Head) -> bool {
        self.0.contains_key(&head)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Head, f32)> + '_ {
        self.0.iter().map(|(h, s)| (*h, *s))
    }

    /// Copy every score of `other` into `self`.
    pub fn merge(&mut self, other: &Scores) {
        self.0.extend(other.iter());
    }

    /// A new map holding only the given heads that are present in `self`.
    pub fn subset(&self, heads: &[Head]) -> Scores {
        heads
            .iter()
            .filter_map(|h| self.get(*h).map(|s| (*h, s)))
            .collect()
    }
}

impl FromIterator<(Head, f32)> for Scores {
    fn from_iter<T: IntoIterator<Item = (Head, f32)>>(iter: T) -> Self {
        Scores(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(Head, f32); N]> for Scores {
    fn from(pairs: [(Head, f32); N]) -> Self {
        pairs.into_iter().collect()
    }
}
