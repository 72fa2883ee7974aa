//! Disposition state machine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing state of an email record.
///
/// Stored as the exact strings the durable table has always used:
/// `""` for a freshly received message, `"Email Review"` once a review
/// email has been accepted for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disposition {
    /// Received and unprocessed. Set only by intake.
    #[serde(rename = "")]
    Received,
    /// Review email delivered. Terminal, set only by the review dispatcher.
    #[serde(rename = "Email Review")]
    UnderReview,
}

impl Disposition {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: Disposition) -> bool {
        matches!((self, target), (Disposition::Received, Disposition::UnderReview))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::UnderReview)
    }

    /// The stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "",
            Self::UnderReview => "Email Review",
        }
    }

    /// Validate a move to `target`.
    pub fn transition(self, target: Disposition) -> Result<Disposition, InvalidTransition> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(InvalidTransition { from: self, to: target })
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::UnderReview => "under_review",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Disposition {
    type Err = UnknownDisposition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::Received),
            "Email Review" => Ok(Self::UnderReview),
            other => Err(UnknownDisposition(other.to_string())),
        }
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: Disposition,
    pub to: Disposition,
}

/// A stored disposition string outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown disposition {0:?}")]
pub struct UnknownDisposition(pub String);

/// A recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: Disposition,
    pub to: Disposition,
    pub timestamp: DateTime<Utc>,
}
