//! Planning of a single add operation.
//!
//! The planner is a pure function of the selection state, the fetched course
//! facts and the answers given so far. It either produces the full set of
//! entries and slots to commit or halts: because facts are missing, because
//! the student has to answer a question, or because a guard rejects the add.
//! The engine fetches missing facts and replays; answered questions are
//! replayed the same way, so no partial plan is ever kept between calls.
//!
//! Guard precedence: triple count, box and target checks, preclusion,
//! prerequisites (questions first), then double counting.

use std::collections::{BTreeMap, BTreeSet};

use courseplan_catalog::{CourseId, PrerequisiteRule, ProgrammeId};
use rust_decimal::Decimal;

use crate::allocator::CapAllocator;
use crate::config::EngineConfig;
use crate::hierarchy::PathHierarchy;
use crate::outcome::{DecisionKind, DecisionOption, RejectionReason};
use crate::resolver;
use crate::state::{AddRequest, BoxId, EntryOrigin, PlanEntry, PrerequisiteSlot, SelectionState};

/// What the engine knows about one course.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CourseFacts {
    pub units: Decimal,
    pub rule: Option<PrerequisiteRule>,
    pub preclusions: Vec<CourseId>,
    /// At least one lookup failed and a default was used.
    pub degraded: bool,
}

#[derive(Debug)]
pub(crate) enum Halt {
    NeedsData(Vec<CourseId>),
    Question(Question),
    Rejected(RejectionReason, String),
}

#[derive(Debug)]
pub(crate) struct Question {
    pub point: String,
    pub kind: DecisionKind,
    pub prompt: String,
    pub options: Vec<DecisionOption>,
}

/// Entries in commit order (forced prerequisites deepest first, the requested
/// course last) and the slots to open.
#[derive(Debug)]
pub(crate) struct Plan {
    pub entries: Vec<PlanEntry>,
    pub slots: Vec<(BoxId, PrerequisiteSlot)>,
}

struct Draft {
    working: BTreeSet<CourseId>,
    /// (course, box, owner box)
    forced: Vec<(CourseId, BoxId, BoxId)>,
    slots: Vec<(BoxId, PrerequisiteSlot)>,
}

pub(crate) fn double_count_point(course: &str) -> String {
    format!("double-count:{}", course)
}

pub(crate) struct Planner<'a> {
    pub hierarchy: &'a PathHierarchy,
    pub config: &'a EngineConfig,
    pub state: &'a SelectionState,
    pub facts: &'a BTreeMap<CourseId, CourseFacts>,
    pub answers: &'a BTreeMap<String, String>,
}

impl<'a> Planner<'a> {
    fn allocator(&self) -> CapAllocator<'a> {
        CapAllocator::new(self.hierarchy, self.config)
    }

    fn facts_for(&self, course: &str) -> Result<&'a CourseFacts, Halt> {
        self.facts
            .get(course)
            .ok_or_else(|| Halt::NeedsData(vec![course.to_string()]))
    }

    pub fn plan(&self, request: &AddRequest) -> Result<Plan, Halt> {
        let course = &request.course;
        let selected = self.state.is_selected(course);

        if let Err(reason) = self.allocator().check_usage(self.state, course) {
            let message = format!(
                "{} already counts toward {} requirements",
                course,
                self.state.usage(course)
            );
            return Err(Halt::Rejected(reason, message));
        }

        if let Some(occupant) = self.state.entries.get(&request.box_id) {
            return Err(Halt::Rejected(
                RejectionReason::BoxOccupied {
                    occupant: occupant.course.clone(),
                },
                format!("box {} already holds {}", request.box_id, occupant.course),
            ));
        }

        let origin = match self.state.slots.get(&request.box_id) {
            Some(slot) => {
                if !slot.options.contains(course) {
                    return Err(Halt::Rejected(
                        RejectionReason::NotASlotOption {
                            slot: request.box_id.clone(),
                        },
                        format!(
                            "{} is not an option for this prerequisite of {} (choose one of {})",
                            course,
                            slot.owner_course,
                            slot.options.join(", ")
                        ),
                    ));
                }
                if selected {
                    return Err(already_selected(course));
                }
                EntryOrigin::Slot {
                    owner: slot.owner.clone(),
                }
            }
            None => EntryOrigin::Chosen,
        };

        match &request.target {
            Some(target) => {
                if !self.hierarchy.leaf(target).is_some_and(|l| l.accepts(course)) {
                    return Err(Halt::Rejected(
                        RejectionReason::InvalidTarget {
                            path: target.clone(),
                        },
                        format!("{} is not a requirement that accepts {}", target, course),
                    ));
                }
                if self
                    .state
                    .contributions(target)
                    .iter()
                    .any(|c| &c.course == course)
                {
                    return Err(Halt::Rejected(
                        RejectionReason::AlreadyInPath {
                            path: target.clone(),
                        },
                        format!(
                            "{} already counts toward {}",
                            course,
                            self.hierarchy.label(target)
                        ),
                    ));
                }
            }
            None if selected => return Err(already_selected(course)),
            None => {}
        }

        let facts = self.facts_for(course)?;
        let selected_courses = self.state.selected_courses();
        if let Some(other) = self.conflict(course, facts, &selected_courses) {
            return Err(Halt::Rejected(
                RejectionReason::Precluded {
                    conflicting: other.clone(),
                },
                format!("{} and {} preclude each other", course, other),
            ));
        }

        let mut draft = Draft {
            working: selected_courses,
            forced: Vec::new(),
            slots: Vec::new(),
        };
        if !selected {
            draft.working.insert(course.clone());
            self.expand(course, &request.box_id, &mut draft)?;
        }

        let target_programme = request
            .target
            .as_deref()
            .and_then(|t| self.hierarchy.programme_of(t))
            .cloned();
        let double_count = match &target_programme {
            Some(home) if !selected => self.double_count(course, facts.units, home)?,
            Some(home) => self.cross_programme_charge(course, facts.units, home)?,
            None => Vec::new(),
        };

        let mut attributions: Vec<String> = request.target.iter().cloned().collect();
        for programme in &double_count {
            if selected || Some(programme) == target_programme.as_ref() {
                continue;
            }
            if let Some(leaf) = self.hierarchy.first_leaf_listing(programme, course) {
                attributions.push(leaf.clone());
            }
        }

        let mut charged: BTreeMap<ProgrammeId, Decimal> = double_count
            .iter()
            .map(|p| (p.clone(), facts.units))
            .collect();

        let mut entries = Vec::with_capacity(draft.forced.len() + 1);
        for (forced, box_id, owner) in &draft.forced {
            let units = self.facts_for(forced)?.units;
            let (attributions, double_count) = match &target_programme {
                Some(home) => self.inherit(forced, units, home, &double_count, &mut charged),
                None => (Vec::new(), Vec::new()),
            };
            entries.push(PlanEntry {
                course: forced.clone(),
                box_id: box_id.clone(),
                units,
                origin: EntryOrigin::Forced {
                    owner: owner.clone(),
                },
                attributions,
                double_count,
            });
        }
        entries.push(PlanEntry {
            course: course.clone(),
            box_id: request.box_id.clone(),
            units: facts.units,
            origin,
            attributions,
            double_count,
        });

        Ok(Plan {
            entries,
            slots: draft.slots,
        })
    }

    /// Depth-first expansion of `owner`'s prerequisite rule. Forced courses
    /// are pushed after their own prerequisites.
    fn expand(&self, owner: &CourseId, owner_box: &str, draft: &mut Draft) -> Result<(), Halt> {
        let facts = self.facts_for(owner)?;
        let Some(rule) = &facts.rule else {
            return Ok(());
        };
        let resolution = resolver::resolve(rule, owner, &draft.working, self.answers);

        if let Some(q) = resolution.decision {
            return Err(Halt::Question(Question {
                point: q.point,
                kind: DecisionKind::PrerequisiteChoice {
                    owner: owner.clone(),
                },
                prompt: q.prompt,
                options: q.options,
            }));
        }

        let missing: Vec<CourseId> = resolution
            .forced
            .iter()
            .filter(|c| !self.facts.contains_key(*c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Halt::NeedsData(missing));
        }

        for forced in &resolution.forced {
            if draft.working.contains(forced) {
                continue;
            }
            let forced_facts = self.facts_for(forced)?;
            if let Some(other) = self.conflict(forced, forced_facts, &draft.working) {
                return Err(Halt::Rejected(
                    RejectionReason::Precluded {
                        conflicting: other.clone(),
                    },
                    format!(
                        "{} requires {}, which is precluded by {}",
                        owner, forced, other
                    ),
                ));
            }
            let box_id = format!("{}:prereq:{}", owner_box, forced);
            if let Some(occupant) = self.state.entries.get(&box_id) {
                return Err(Halt::Rejected(
                    RejectionReason::BoxOccupied {
                        occupant: occupant.course.clone(),
                    },
                    format!("box {} already holds {}", box_id, occupant.course),
                ));
            }
            draft.working.insert(forced.clone());
            self.expand(forced, &box_id, draft)?;
            draft.forced.push((forced.clone(), box_id, owner_box.to_string()));
        }

        for slot in resolution.slots {
            draft.slots.push((
                format!("{}:slot:{}", owner_box, slot.position),
                PrerequisiteSlot {
                    owner: owner_box.to_string(),
                    owner_course: owner.clone(),
                    options: slot.options,
                },
            ));
        }
        Ok(())
    }

    /// A course in `others` that `course` precludes or is precluded by.
    fn conflict<'b>(
        &self,
        course: &str,
        facts: &CourseFacts,
        others: &'b BTreeSet<CourseId>,
    ) -> Option<&'b CourseId> {
        others.iter().find(|other| {
            other.as_str() != course
                && (facts.preclusions.iter().any(|p| p == *other)
                    || self
                        .facts
                        .get(other.as_str())
                        .is_some_and(|f| f.preclusions.iter().any(|p| p == course)))
        })
    }

    /// Programmes the course could count toward: those listing it explicitly,
    /// plus the programme of the target leaf. Load order.
    fn eligible(&self, course: &str, home: &str) -> Vec<ProgrammeId> {
        self.hierarchy
            .programmes()
            .iter()
            .filter(|p| p.id == home || self.hierarchy.first_leaf_listing(&p.id, course).is_some())
            .map(|p| p.id.clone())
            .collect()
    }

    /// Attributions a course would hold if double counted into `chosen`.
    fn attribution_count(&self, chosen: &[ProgrammeId], home: &str) -> u32 {
        1 + chosen.iter().filter(|p| p.as_str() != home).count() as u32
    }

    fn double_count(
        &self,
        course: &str,
        units: Decimal,
        home: &str,
    ) -> Result<Vec<ProgrammeId>, Halt> {
        let eligible = self.eligible(course, home);
        if eligible.len() < 2 {
            return Ok(Vec::new());
        }
        let allocator = self.allocator();
        let spare: Vec<ProgrammeId> = eligible
            .into_iter()
            .filter(|p| allocator.has_spare(self.state, p, units, Decimal::ZERO))
            .collect();

        let options = self.double_count_options(&spare, home);
        match options.len() {
            0 => Ok(Vec::new()),
            1 => {
                // Home alone: nothing is shared.
                let only = &options[0].programmes;
                if only.len() == 1 && only[0] == home {
                    Ok(Vec::new())
                } else {
                    Ok(only.clone())
                }
            }
            _ => {
                let point = double_count_point(course);
                if let Some(answer) = self.answers.get(&point) {
                    if let Some(option) = options.iter().find(|o| &o.id == answer) {
                        return Ok(option.programmes.clone());
                    }
                }
                Err(Halt::Question(Question {
                    point,
                    kind: DecisionKind::DoubleCount,
                    prompt: format!(
                        "{} can count toward more than one programme; choose where it is double counted",
                        course
                    ),
                    options,
                }))
            }
        }
    }

    /// Another box of an already selected course, placed under `home`. When
    /// the earlier boxes count toward a different programme the course is
    /// double counted: every programme involved that is not yet charged for
    /// it needs room, or the add is rejected.
    fn cross_programme_charge(
        &self,
        course: &str,
        units: Decimal,
        home: &str,
    ) -> Result<Vec<ProgrammeId>, Halt> {
        let mut programmes: Vec<ProgrammeId> = Vec::new();
        for entry in self.state.entries.values().filter(|e| e.course == course) {
            for leaf in &entry.attributions {
                if let Some(p) = self.hierarchy.programme_of(leaf) {
                    if !programmes.contains(p) {
                        programmes.push(p.clone());
                    }
                }
            }
        }
        if programmes.iter().all(|p| p == home) {
            return Ok(Vec::new());
        }
        if !programmes.iter().any(|p| p == home) {
            programmes.push(home.to_string());
        }

        let charged = self.state.double_count_attribution.get(course);
        programmes.retain(|p| !charged.is_some_and(|list| list.contains(p)));
        let allocator = self.allocator();
        if let Some(full) = programmes
            .iter()
            .find(|p| !allocator.has_spare(self.state, p, units, Decimal::ZERO))
        {
            return Err(Halt::Rejected(
                RejectionReason::DoubleCountCapReached {
                    programme: full.clone(),
                },
                format!(
                    "{} cannot also count toward {}: {} has no double-count room left",
                    course,
                    self.hierarchy.label(home),
                    self.hierarchy.label(full)
                ),
            ));
        }
        Ok(programmes)
    }

    fn double_count_options(&self, spare: &[ProgrammeId], home: &str) -> Vec<DecisionOption> {
        let max = self.config.max_attributions;
        let mut options = Vec::new();
        for p in spare {
            let chosen = vec![p.clone()];
            if self.attribution_count(&chosen, home) <= max {
                options.push(DecisionOption {
                    id: p.clone(),
                    label: format!("Count in {}", self.hierarchy.label(p)),
                    programmes: chosen,
                });
            }
        }
        if self.config.max_double_count_programmes >= 2 {
            for (i, a) in spare.iter().enumerate() {
                for b in &spare[i + 1..] {
                    let chosen = vec![a.clone(), b.clone()];
                    if self.attribution_count(&chosen, home) <= max {
                        options.push(DecisionOption {
                            id: format!("{}+{}", a, b),
                            label: format!(
                                "Count in {} and {}",
                                self.hierarchy.label(a),
                                self.hierarchy.label(b)
                            ),
                            programmes: chosen,
                        });
                    }
                }
            }
        }
        options
    }

    /// Attribution of a forced prerequisite. It counts toward the first leaf
    /// of the parent's programme listing it and, where it is eligible and the
    /// programme still has room, into the parent's double-count programmes.
    fn inherit(
        &self,
        course: &str,
        units: Decimal,
        home: &str,
        parent_programmes: &[ProgrammeId],
        charged: &mut BTreeMap<ProgrammeId, Decimal>,
    ) -> (Vec<String>, Vec<ProgrammeId>) {
        let mut attributions = Vec::new();
        if let Some(leaf) = self.hierarchy.first_leaf_listing(home, course) {
            attributions.push(leaf.clone());
        }
        let mut double_count = Vec::new();
        let eligible = self.eligible(course, home);
        if attributions.is_empty() || eligible.len() < 2 {
            return (attributions, double_count);
        }

        let allocator = self.allocator();
        for programme in parent_programmes {
            if !eligible.contains(programme)
                || double_count.len() >= self.config.max_double_count_programmes
            {
                continue;
            }
            let extra_leaf = if programme == home {
                None
            } else {
                match self.hierarchy.first_leaf_listing(programme, course) {
                    Some(leaf) => Some(leaf.clone()),
                    None => continue,
                }
            };
            if extra_leaf.is_some() && attributions.len() as u32 >= self.config.max_attributions {
                continue;
            }
            let pending = charged.get(programme).copied().unwrap_or(Decimal::ZERO);
            if !allocator.has_spare(self.state, programme, units, pending) {
                continue;
            }
            attributions.extend(extra_leaf);
            double_count.push(programme.clone());
            *charged.entry(programme.clone()).or_insert(Decimal::ZERO) += units;
        }
        (attributions, double_count)
    }
}

fn already_selected(course: &str) -> Halt {
    Halt::Rejected(
        RejectionReason::AlreadySelected,
        format!("{} is already in the plan", course),
    )
}
