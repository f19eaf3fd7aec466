// Data models: the records that flow between pipeline stages.
//
// Everything here lives for one pipeline invocation. A ClassifiedComment is
// created once at the classification boundary and never mutated afterwards;
// conclusions are derived from groups of them.

use serde::{Deserialize, Serialize};

/// The argumentative function of a comment. Exactly one per classified comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Claim,
    Counterclaim,
    Rebuttal,
    Evidence,
}

impl Role {
    /// Candidate labels handed to the zero-shot classifier, in tie-break order.
    pub const ALL: [Role; 4] = [Role::Claim, Role::Counterclaim, Role::Rebuttal, Role::Evidence];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Claim => "Claim",
            Role::Counterclaim => "Counterclaim",
            Role::Rebuttal => "Rebuttal",
            Role::Evidence => "Evidence",
        }
    }

    /// Parse a label back into a role. Exact match only; labels come from
    /// our own candidate list, so anything else is a classifier bug.
    pub fn from_label(label: &str) -> Option<Self> {
        Role::ALL.into_iter().find(|r| r.as_str() == label)
    }

    /// Label strings in the order they are offered to the classifier.
    pub fn labels() -> [&'static str; 4] {
        Role::ALL.map(|r| r.as_str())
    }

    /// Counterclaims and rebuttals both push against the topic's claims.
    pub fn is_counter(&self) -> bool {
        matches!(self, Role::Counterclaim | Role::Rebuttal)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Balance of claims against counter-arguments within one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effectiveness {
    Effective,
    Adequate,
    Ineffective,
}

impl Effectiveness {
    /// Compare claim count against counterclaim + rebuttal count.
    pub fn from_counts(claims: usize, counters: usize) -> Self {
        match claims.cmp(&counters) {
            std::cmp::Ordering::Greater => Effectiveness::Effective,
            std::cmp::Ordering::Equal => Effectiveness::Adequate,
            std::cmp::Ordering::Less => Effectiveness::Ineffective,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Effectiveness::Effective => "Effective",
            Effectiveness::Adequate => "Adequate",
            Effectiveness::Ineffective => "Ineffective",
        }
    }
}

impl std::fmt::Display for Effectiveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized opinion with its assigned topic and role.
///
/// Serialized as `{text, topic, type}`, the shape the remote-call response
/// and the opinions CSV both use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedComment {
    pub text: String,
    pub topic: String,
    #[serde(rename = "type")]
    pub role: Role,
}

/// Generated summary and effectiveness verdict for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub topic: String,
    pub effectiveness: Effectiveness,
    pub summary: String,
}

/// Everything one pipeline invocation produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub comments: Vec<ClassifiedComment>,
    pub conclusions: Vec<Conclusion>,
    /// Classification batches that contributed no records.
    pub failed_batches: usize,
    /// Summarization batches whose summaries were dropped.
    pub failed_summary_batches: usize,
}
