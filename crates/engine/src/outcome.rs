//! Results of engine operations as seen by a rendering collaborator.

use courseplan_catalog::{CourseId, PathId, ProgrammeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::state::BoxId;

/// Result of `validate_and_commit` and `resolve_decision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Accepted(Acceptance),
    Rejected(Rejection),
    PendingDecision(PendingDecision),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }

    pub fn accepted(&self) -> Option<&Acceptance> {
        match self {
            Outcome::Accepted(a) => Some(a),
            _ => None,
        }
    }

    pub fn rejected(&self) -> Option<&Rejection> {
        match self {
            Outcome::Rejected(r) => Some(r),
            _ => None,
        }
    }

    pub fn decision(&self) -> Option<&PendingDecision> {
        match self {
            Outcome::PendingDecision(d) => Some(d),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Accepted
// ──────────────────────────────────────────────

/// A committed add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    pub course: CourseId,
    pub box_id: BoxId,
    /// Leaf paths the course now counts toward.
    pub attributions: Vec<PathId>,
    /// Programmes the course was double counted into.
    pub double_count: Vec<ProgrammeId>,
    /// Read-only boxes auto-added for exact prerequisites, deepest first.
    pub forced: Vec<ForcedBox>,
    /// Constrained-choice prerequisite slots opened by this add.
    pub slots: Vec<SlotSummary>,
    pub warnings: Vec<Warning>,
    /// Units added to the plan by this operation, forced boxes included.
    pub units_added: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedBox {
    pub course: CourseId,
    pub box_id: BoxId,
    pub attributions: Vec<PathId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub slot_id: BoxId,
    pub owner_course: CourseId,
    pub options: Vec<CourseId>,
}

// ──────────────────────────────────────────────
// Rejected
// ──────────────────────────────────────────────

/// An add that was refused. The selection state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub course: CourseId,
    pub box_id: BoxId,
    pub reason: RejectionReason,
    pub message: String,
}

/// Why an add was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// The course already holds the maximum number of attributions.
    TripleCountPrevented,
    /// The course and a selected course preclude each other.
    Precluded { conflicting: CourseId },
    /// The box already holds a course.
    BoxOccupied { occupant: CourseId },
    /// The target is not a loaded leaf path accepting the course.
    InvalidTarget { path: PathId },
    /// The course already counts toward the target path.
    AlreadyInPath { path: PathId },
    /// The box is a prerequisite slot that does not offer this course.
    NotASlotOption { slot: BoxId },
    /// The course is already in the plan and the add would give it no new attribution.
    AlreadySelected,
    /// A second box would double count the course, and the named programme
    /// has no double-count room left for it.
    DoubleCountCapReached { programme: ProgrammeId },
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::TripleCountPrevented => "TRIPLE_COUNT_PREVENTED",
            RejectionReason::Precluded { .. } => "PRECLUDED",
            RejectionReason::BoxOccupied { .. } => "BOX_OCCUPIED",
            RejectionReason::InvalidTarget { .. } => "INVALID_TARGET",
            RejectionReason::AlreadyInPath { .. } => "ALREADY_IN_PATH",
            RejectionReason::NotASlotOption { .. } => "NOT_A_SLOT_OPTION",
            RejectionReason::AlreadySelected => "ALREADY_SELECTED",
            RejectionReason::DoubleCountCapReached { .. } => "DOUBLE_COUNT_CAP_REACHED",
        }
    }
}

// ──────────────────────────────────────────────
// Pending decision
// ──────────────────────────────────────────────

/// An add suspended until the student answers a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub decision_id: String,
    pub course: CourseId,
    pub kind: DecisionKind,
    pub prompt: String,
    pub options: Vec<DecisionOption>,
}

impl PendingDecision {
    pub fn option(&self, id: &str) -> Option<&DecisionOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionKind {
    /// Which branch of a `complex_or` prerequisite to follow.
    PrerequisiteChoice { owner: CourseId },
    /// Which programmes a shared course counts into.
    DoubleCount,
}

impl DecisionKind {
    pub fn code(&self) -> &'static str {
        match self {
            DecisionKind::PrerequisiteChoice { .. } => "PREREQUISITE_UNRESOLVED",
            DecisionKind::DoubleCount => "DOUBLE_COUNT_AMBIGUOUS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOption {
    pub id: String,
    pub label: String,
    /// For double-count decisions, the programmes this option allocates to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub programmes: Vec<ProgrammeId>,
}

// ──────────────────────────────────────────────
// Warnings
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub course: CourseId,
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    /// A max cap on `path` is exceeded; the course no longer counts toward it.
    CapExceeded { path: PathId },
    /// The course's prerequisite rule is not satisfied by the plan.
    MissingPrerequisite,
    /// The course already holds the maximum number of attributions.
    AlreadyMaxed,
    /// The course and a selected course preclude each other.
    Precluded { conflicting: CourseId },
}

impl WarningKind {
    pub fn code(&self) -> &'static str {
        match self {
            WarningKind::CapExceeded { .. } => "CAP_EXCEEDED",
            WarningKind::MissingPrerequisite => "MISSING_PREREQUISITE",
            WarningKind::AlreadyMaxed => "ALREADY_MAXED",
            WarningKind::Precluded { .. } => "PRECLUDED",
        }
    }
}

// ──────────────────────────────────────────────
// Removal
// ──────────────────────────────────────────────

/// Result of removing a box and everything that existed only for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    /// (course, box) pairs removed, the requested one first.
    pub removed: Vec<(CourseId, BoxId)>,
    /// (course, cap path) pairs whose stripped tag was restored.
    pub restored: Vec<(CourseId, PathId)>,
    /// (course, box) pairs the cascade reached but kept because another
    /// selected course still needs them. They are re-owned by that course.
    #[serde(default)]
    pub retained: Vec<(CourseId, BoxId)>,
    pub units_removed: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_serializes_with_code() {
        let json = serde_json::to_value(RejectionReason::TripleCountPrevented).unwrap();
        assert_eq!(json, serde_json::json!({ "code": "TRIPLE_COUNT_PREVENTED" }));
        let json = serde_json::to_value(RejectionReason::Precluded {
            conflicting: "CS1010E".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "code": "PRECLUDED", "conflicting": "CS1010E" })
        );
        let json = serde_json::to_value(RejectionReason::DoubleCountCapReached {
            programme: "ma".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "code": "DOUBLE_COUNT_CAP_REACHED", "programme": "ma" })
        );
    }

    #[test]
    fn removal_without_retained_boxes_still_parses() {
        let removal: Removal = serde_json::from_value(serde_json::json!({
            "removed": [["CS1010", "b1"]],
            "restored": [],
            "units_removed": "4"
        }))
        .unwrap();
        assert!(removal.retained.is_empty());
        assert_eq!(removal.units_removed, Decimal::from(4));
    }

    #[test]
    fn codes_match_taxonomy() {
        assert_eq!(DecisionKind::DoubleCount.code(), "DOUBLE_COUNT_AMBIGUOUS");
        assert_eq!(
            DecisionKind::PrerequisiteChoice {
                owner: "CS2040S".to_string()
            }
            .code(),
            "PREREQUISITE_UNRESOLVED"
        );
        assert_eq!(
            WarningKind::CapExceeded {
                path: "p".to_string()
            }
            .code(),
            "CAP_EXCEEDED"
        );
    }

    #[test]
    fn outcome_accessors() {
        let outcome = Outcome::Rejected(Rejection {
            course: "CS1010".to_string(),
            box_id: "b1".to_string(),
            reason: RejectionReason::TripleCountPrevented,
            message: String::new(),
        });
        assert!(!outcome.is_accepted());
        assert!(outcome.rejected().is_some());
        assert!(outcome.decision().is_none());
    }
}
