//! Course, programme and requirement-path records.
//!
//! All unit values use `rust_decimal::Decimal` so that half-unit courses
//! and cap arithmetic never go through `f64`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::rule::PrerequisiteRule;

/// Course code, e.g. `"CS1010"`.
pub type CourseId = String;
/// Requirement path identifier.
pub type PathId = String;
/// Programme identifier.
pub type ProgrammeId = String;

// ──────────────────────────────────────────────
// Courses
// ──────────────────────────────────────────────

/// A course as the reference data describes it. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    #[serde(default)]
    pub title: String,
    pub units: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisite: Option<PrerequisiteRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preclusions: Vec<CourseId>,
}

// ──────────────────────────────────────────────
// Programmes
// ──────────────────────────────────────────────

/// The role a programme plays in a student's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgrammeKind {
    Major,
    SecondMajor,
    Minor,
}

impl ProgrammeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgrammeKind::Major => "major",
            ProgrammeKind::SecondMajor => "second_major",
            ProgrammeKind::Minor => "minor",
        }
    }
}

/// A degree programme: a major, second major or minor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Programme {
    pub id: ProgrammeId,
    pub kind: ProgrammeKind,
    #[serde(default)]
    pub label: String,
    /// Units the whole programme requires, unrestricted electives included.
    pub total_units: Decimal,
    /// Units of this programme that may be shared with other programmes.
    #[serde(default)]
    pub double_count_cap: Decimal,
    /// Every requirement path belonging to this programme.
    #[serde(default)]
    pub paths: Vec<PathId>,
}

// ──────────────────────────────────────────────
// Requirement paths
// ──────────────────────────────────────────────

/// How a requirement path combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicKind {
    And,
    Or,
    Leaf,
    Section,
}

/// Whether a cap rule is a floor or a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapKind {
    Min,
    Max,
}

/// A unit threshold attached to a requirement path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapRule {
    pub kind: CapKind,
    pub units: Decimal,
}

/// One node of a programme's requirement tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementPath {
    pub id: PathId,
    /// Absent for section roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PathId>,
    pub programme: ProgrammeId,
    #[serde(default)]
    pub label: String,
    pub logic: LogicKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<CapRule>,
    #[serde(default)]
    pub required_units: Decimal,
    /// Courses a leaf accepts. An empty list on a leaf accepts any course.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub courses: Vec<CourseId>,
}

impl RequirementPath {
    pub fn is_leaf(&self) -> bool {
        self.logic == LogicKind::Leaf
    }

    /// Whether a leaf path accepts the given course. Non-leaf paths accept nothing.
    pub fn accepts(&self, course: &str) -> bool {
        self.is_leaf() && (self.courses.is_empty() || self.courses.iter().any(|c| c == course))
    }

    /// Whether the leaf lists the course explicitly (open leaves do not).
    pub fn lists(&self, course: &str) -> bool {
        self.is_leaf() && self.courses.iter().any(|c| c == course)
    }

    /// The ceiling of a max-type cap rule, if this path carries one.
    pub fn max_cap(&self) -> Option<Decimal> {
        match self.cap {
            Some(CapRule {
                kind: CapKind::Max,
                units,
            }) => Some(units),
            _ => None,
        }
    }

    /// The floor of a min-type cap rule, if this path carries one.
    pub fn min_cap(&self) -> Option<Decimal> {
        match self.cap {
            Some(CapRule {
                kind: CapKind::Min,
                units,
            }) => Some(units),
            _ => None,
        }
    }
}
