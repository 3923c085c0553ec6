//! The per-session mutable selection state.
//!
//! Every map is kept sparse: an entry whose count or total drops to zero is
//! removed, so that adding and then removing the same course restores a
//! state that compares equal to the original.

use std::collections::{BTreeMap, BTreeSet};

use courseplan_catalog::{CourseId, PathId, ProgrammeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::outcome::PendingDecision;

/// Identifier of a UI slot holding one course.
pub type BoxId = String;

/// Why a plan entry exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum EntryOrigin {
    /// Placed by the student.
    Chosen,
    /// Auto-added to satisfy an exact prerequisite of the entry in `owner`.
    Forced { owner: BoxId },
    /// Placed by the student into a prerequisite slot owned by `owner`.
    Slot { owner: BoxId },
}

/// One (course, box) pair of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub course: CourseId,
    pub box_id: BoxId,
    pub units: Decimal,
    pub origin: EntryOrigin,
    /// Leaf paths this entry counts toward. Empty for unattributed entries.
    pub attributions: Vec<PathId>,
    /// Programmes whose double-count allowance this entry consumes.
    pub double_count: Vec<ProgrammeId>,
}

impl PlanEntry {
    pub fn owner(&self) -> Option<&BoxId> {
        match &self.origin {
            EntryOrigin::Chosen => None,
            EntryOrigin::Forced { owner } | EntryOrigin::Slot { owner } => Some(owner),
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self.origin, EntryOrigin::Forced { .. })
    }
}

/// A course's contribution to one path, recorded on the leaf and every ancestor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub course: CourseId,
    pub box_id: BoxId,
    pub units: Decimal,
    /// The leaf through which the units arrive.
    pub leaf: PathId,
}

/// A constrained-choice prerequisite slot the student still has to fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteSlot {
    /// Box of the entry whose prerequisite this slot satisfies.
    pub owner: BoxId,
    /// Course whose prerequisite this slot satisfies.
    pub owner_course: CourseId,
    pub options: Vec<CourseId>,
}

/// An add operation suspended on a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub decision: PendingDecision,
    /// Decision point the pending question belongs to.
    pub point: String,
    pub request: AddRequest,
    /// Answers given so far, keyed by decision point.
    pub answers: BTreeMap<String, String>,
}

/// The arguments of one add operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequest {
    pub course: CourseId,
    pub box_id: BoxId,
    pub target: Option<PathId>,
}

/// Derived and chosen state of one planning session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    /// Plan entries keyed by box.
    pub entries: BTreeMap<BoxId, PlanEntry>,
    /// Active requirement attributions per course.
    pub usage_count: BTreeMap<CourseId, u32>,
    /// Accumulated units per path, for leaves and every ancestor.
    pub path_fulfilment: BTreeMap<PathId, Decimal>,
    /// Contributions per path, in commit order.
    pub path_contributors: BTreeMap<PathId, Vec<Contribution>>,
    /// Accumulated units per max-type cap rule, keyed by the path carrying it.
    pub cap_usage: BTreeMap<PathId, Decimal>,
    /// Units charged against each programme's double-count cap.
    pub double_count_usage: BTreeMap<ProgrammeId, Decimal>,
    /// Programmes each double-counted course is allocated to.
    pub double_count_attribution: BTreeMap<CourseId, Vec<ProgrammeId>>,
    /// Cap rules each course no longer counts toward.
    pub stripped_tags: BTreeMap<CourseId, BTreeSet<PathId>>,
    /// Open and filled prerequisite slots, keyed by slot box id.
    pub slots: BTreeMap<BoxId, PrerequisiteSlot>,
    pub pending: Option<PendingOperation>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set of (course, box) pairs in the plan.
    pub fn chosen_courses(&self) -> BTreeSet<(CourseId, BoxId)> {
        self.entries
            .values()
            .map(|e| (e.course.clone(), e.box_id.clone()))
            .collect()
    }

    /// Distinct courses in the plan.
    pub fn selected_courses(&self) -> BTreeSet<CourseId> {
        self.entries.values().map(|e| e.course.clone()).collect()
    }

    pub fn is_selected(&self, course: &str) -> bool {
        self.entries.values().any(|e| e.course == course)
    }

    pub fn usage(&self, course: &str) -> u32 {
        self.usage_count.get(course).copied().unwrap_or(0)
    }

    pub fn fulfilment(&self, path: &str) -> Decimal {
        self.path_fulfilment
            .get(path)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn contributions(&self, path: &str) -> &[Contribution] {
        self.path_contributors
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Course codes contributing to a path, in commit order.
    pub fn contributors(&self, path: &str) -> Vec<CourseId> {
        self.contributions(path)
            .iter()
            .map(|c| c.course.clone())
            .collect()
    }

    pub fn cap_used(&self, path: &str) -> Decimal {
        self.cap_usage.get(path).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn double_count_used(&self, programme: &str) -> Decimal {
        self.double_count_usage
            .get(programme)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn is_stripped(&self, course: &str, cap_path: &str) -> bool {
        self.stripped_tags
            .get(course)
            .is_some_and(|tags| tags.contains(cap_path))
    }

    /// Slots that do not hold a course yet.
    pub fn open_slots(&self) -> Vec<(&BoxId, &PrerequisiteSlot)> {
        self.slots
            .iter()
            .filter(|(id, _)| !self.entries.contains_key(*id))
            .collect()
    }

    pub fn pending_decision(&self) -> Option<&PendingDecision> {
        self.pending.as_ref().map(|p| &p.decision)
    }
}

/// Add `delta` to a sparse decimal map.
pub(crate) fn add_units(map: &mut BTreeMap<String, Decimal>, key: &str, delta: Decimal) {
    if delta.is_zero() {
        return;
    }
    *map.entry(key.to_string()).or_insert(Decimal::ZERO) += delta;
}

/// Subtract `delta` from a sparse decimal map, clamping at zero and dropping
/// the key once it reaches zero. Returns the remaining value.
pub(crate) fn sub_units(map: &mut BTreeMap<String, Decimal>, key: &str, delta: Decimal) -> Decimal {
    let remaining = match map.get(key) {
        Some(v) => (*v - delta).max(Decimal::ZERO),
        None => Decimal::ZERO,
    };
    if remaining.is_zero() {
        map.remove(key);
    } else {
        map.insert(key.to_string(), remaining);
    }
    remaining
}
