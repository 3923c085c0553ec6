//! The validation engine: the public surface of a planning session.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use courseplan_catalog::{CourseId, PathId, Programme, ProgrammeId, ProgrammeKind, RequirementPath};
use courseplan_lookup::ReferenceLookup;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;

use crate::allocator::CapAllocator;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::hierarchy::PathHierarchy;
use crate::outcome::{
    Acceptance, ForcedBox, Outcome, PendingDecision, Rejection, Removal, SlotSummary, Warning,
    WarningKind,
};
use crate::planner::{CourseFacts, Halt, Plan, Planner};
use crate::progress::{ProgrammeSummary, ProgressAggregator, ProgressReport};
use crate::resolver;
use crate::state::{AddRequest, BoxId, EntryOrigin, PendingOperation, SelectionState};

/// One planning session over a loaded set of programmes.
///
/// Mutating operations take `&mut self`; callers serialise them. Every
/// write to the selection state happens after the last await of an
/// operation, so dropping an operation's future leaves the state untouched.
pub struct ValidationEngine {
    lookup: Arc<dyn ReferenceLookup>,
    config: EngineConfig,
    hierarchy: PathHierarchy,
    state: SelectionState,
    facts: BTreeMap<CourseId, CourseFacts>,
    decisions_issued: u64,
}

impl ValidationEngine {
    /// Load the requirement structure of `programmes` and start an empty session.
    pub async fn load(
        lookup: Arc<dyn ReferenceLookup>,
        programmes: &[ProgrammeId],
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let hierarchy = load_hierarchy(lookup.as_ref(), programmes, &config).await?;
        Ok(ValidationEngine {
            lookup,
            config,
            hierarchy,
            state: SelectionState::new(),
            facts: BTreeMap::new(),
            decisions_issued: 0,
        })
    }

    /// Replace the loaded programmes. The selection state is discarded.
    pub async fn reload(&mut self, programmes: &[ProgrammeId]) -> Result<(), EngineError> {
        let hierarchy = load_hierarchy(self.lookup.as_ref(), programmes, &self.config).await?;
        self.hierarchy = hierarchy;
        self.state = SelectionState::new();
        self.facts.clear();
        Ok(())
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn hierarchy(&self) -> &PathHierarchy {
        &self.hierarchy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pending_decision(&self) -> Option<&PendingDecision> {
        self.state.pending_decision()
    }

    /// Warm the lookup for courses the student is likely to pick. Fire and forget.
    pub fn preload(&self, courses: Vec<CourseId>) -> JoinHandle<()> {
        let lookup = Arc::clone(&self.lookup);
        tokio::spawn(async move { lookup.preload(&courses).await })
    }

    // ──────────────────────────────────────────────
    // Add
    // ──────────────────────────────────────────────

    /// Validate adding `course` to `box_id`, counting toward the leaf `target`,
    /// and commit it if every guard passes.
    ///
    /// `target = None` places the course without attributing it to any path;
    /// it then only counts toward unrestricted electives. A pending decision
    /// from an earlier add is abandoned.
    pub async fn validate_and_commit(
        &mut self,
        course: &str,
        box_id: &str,
        target: Option<&str>,
    ) -> Outcome {
        let request = AddRequest {
            course: course.to_string(),
            box_id: box_id.to_string(),
            target: target.map(str::to_string),
        };
        if let Some(pending) = &self.state.pending {
            tracing::debug!(
                decision = %pending.decision.decision_id,
                course = %pending.request.course,
                "pending decision superseded"
            );
        }
        self.run(request, BTreeMap::new()).await
    }

    /// Answer the pending decision and continue the suspended add.
    pub async fn resolve_decision(
        &mut self,
        decision_id: &str,
        option_id: &str,
    ) -> Result<Outcome, EngineError> {
        let pending = match &self.state.pending {
            Some(p) if p.decision.decision_id == decision_id => p.clone(),
            _ => return Err(EngineError::UnknownDecision(decision_id.to_string())),
        };
        if pending.decision.option(option_id).is_none() {
            return Err(EngineError::InvalidOption {
                decision_id: decision_id.to_string(),
                option_id: option_id.to_string(),
            });
        }
        let mut answers = pending.answers;
        answers.insert(pending.point, option_id.to_string());
        Ok(self.run(pending.request, answers).await)
    }

    /// Drop the pending decision, if any. The plan is unchanged.
    pub fn abandon_decision(&mut self) -> Option<PendingDecision> {
        let pending = self.state.pending.take()?;
        tracing::debug!(decision = %pending.decision.decision_id, "decision abandoned");
        Some(pending.decision)
    }

    async fn run(&mut self, request: AddRequest, answers: BTreeMap<String, String>) -> Outcome {
        self.purge_degraded();
        loop {
            let result = Planner {
                hierarchy: &self.hierarchy,
                config: &self.config,
                state: &self.state,
                facts: &self.facts,
                answers: &answers,
            }
            .plan(&request);

            match result {
                Ok(plan) => {
                    self.state.pending = None;
                    return Outcome::Accepted(self.commit(&request, plan));
                }
                Err(Halt::NeedsData(courses)) => self.fetch(courses).await,
                Err(Halt::Rejected(reason, message)) => {
                    tracing::debug!(course = %request.course, code = reason.code(), "add rejected");
                    self.state.pending = None;
                    return Outcome::Rejected(Rejection {
                        course: request.course,
                        box_id: request.box_id,
                        reason,
                        message,
                    });
                }
                Err(Halt::Question(question)) => {
                    self.decisions_issued += 1;
                    let decision = PendingDecision {
                        decision_id: format!("decision-{}", self.decisions_issued),
                        course: request.course.clone(),
                        kind: question.kind,
                        prompt: question.prompt,
                        options: question.options,
                    };
                    tracing::debug!(
                        decision = %decision.decision_id,
                        code = decision.kind.code(),
                        "add awaiting decision"
                    );
                    self.state.pending = Some(PendingOperation {
                        decision: decision.clone(),
                        point: question.point,
                        request,
                        answers,
                    });
                    return Outcome::PendingDecision(decision);
                }
            }
        }
    }

    /// Facts that fell back to defaults are refetched on the next operation
    /// unless the course is already in the plan.
    fn purge_degraded(&mut self) {
        let selected = self.state.selected_courses();
        self.facts
            .retain(|course, facts| !facts.degraded || selected.contains(course));
    }

    async fn fetch(&mut self, courses: Vec<CourseId>) {
        let lookup = Arc::clone(&self.lookup);
        for course in courses {
            let facts = fetch_facts(lookup.as_ref(), &course, &self.config).await;
            self.facts.insert(course, facts);
        }
    }

    fn commit(&mut self, request: &AddRequest, plan: Plan) -> Acceptance {
        let allocator = CapAllocator::new(&self.hierarchy, &self.config);
        let aggregator = ProgressAggregator::new(&self.hierarchy);

        let mut warnings = Vec::new();
        let mut units_added = Decimal::ZERO;
        for entry in &plan.entries {
            self.state.entries.insert(entry.box_id.clone(), entry.clone());
            allocator.add_usage(&mut self.state, entry);
            for leaf in &entry.attributions {
                aggregator.add_contribution(&mut self.state, leaf, entry);
            }
            warnings.extend(allocator.charge_caps(&mut self.state, entry));
            allocator.charge_double_count(&mut self.state, entry);
            units_added += entry.units;
        }
        for (slot_id, slot) in &plan.slots {
            self.state.slots.insert(slot_id.clone(), slot.clone());
        }

        let selected = self.state.selected_courses();
        for entry in &plan.entries {
            if let Some(w) = self.missing_prerequisite(&entry.course, &selected) {
                warnings.push(w);
            }
        }

        let mut entries = plan.entries;
        let main = entries.pop();
        let forced = entries
            .into_iter()
            .map(|e| ForcedBox {
                course: e.course,
                box_id: e.box_id,
                attributions: e.attributions,
            })
            .collect::<Vec<_>>();
        let (attributions, double_count) = main
            .map(|e| (e.attributions, e.double_count))
            .unwrap_or_default();

        tracing::debug!(
            course = %request.course,
            box_id = %request.box_id,
            forced = forced.len(),
            slots = plan.slots.len(),
            units = %units_added,
            "add committed"
        );

        Acceptance {
            course: request.course.clone(),
            box_id: request.box_id.clone(),
            attributions,
            double_count,
            forced,
            slots: plan
                .slots
                .into_iter()
                .map(|(slot_id, slot)| SlotSummary {
                    slot_id,
                    owner_course: slot.owner_course,
                    options: slot.options,
                })
                .collect(),
            warnings,
            units_added,
        }
    }

    // ──────────────────────────────────────────────
    // Remove
    // ──────────────────────────────────────────────

    /// Remove `course` from `box_id`, together with every forced box, slot and
    /// slot course that exists only for it. Guards are not re-run.
    pub fn remove(&mut self, course: &str, box_id: &str) -> Result<Removal, EngineError> {
        let entry = self
            .state
            .entries
            .get(box_id)
            .ok_or_else(|| EngineError::UnknownBox(box_id.to_string()))?;
        if entry.course != course {
            return Err(EngineError::BoxMismatch {
                box_id: box_id.to_string(),
                course: course.to_string(),
                actual: entry.course.clone(),
            });
        }
        if let EntryOrigin::Forced { owner } = &entry.origin {
            if self.state.entries.contains_key(owner) {
                return Err(EngineError::ReadOnlyBox {
                    box_id: box_id.to_string(),
                    owner: owner.clone(),
                });
            }
        }

        // A cascaded box that a surviving entry still needs stays, re-owned
        // by that entry.
        let mut kept: BTreeMap<BoxId, BoxId> = BTreeMap::new();
        let doomed = loop {
            let doomed = self.cascade(box_id, &kept);
            match self.still_needed(&doomed) {
                Some((dependent, owner)) => {
                    kept.insert(dependent, owner);
                }
                None => break doomed,
            }
        };
        let doomed_slots: Vec<String> = self
            .state
            .slots
            .iter()
            .filter(|(_, slot)| doomed.contains(&slot.owner))
            .map(|(id, _)| id.clone())
            .collect();

        let allocator = CapAllocator::new(&self.hierarchy, &self.config);
        let aggregator = ProgressAggregator::new(&self.hierarchy);
        let mut removal = Removal {
            removed: Vec::new(),
            restored: Vec::new(),
            retained: Vec::new(),
            units_removed: Decimal::ZERO,
        };
        for b in &doomed {
            let Some(entry) = self.state.entries.remove(b) else {
                continue;
            };
            for leaf in &entry.attributions {
                aggregator.remove_contribution(&mut self.state, leaf, &entry);
            }
            allocator.release_usage(&mut self.state, &entry);
            removal
                .restored
                .extend(allocator.release_caps(&mut self.state, &entry));
            allocator.release_double_count(&mut self.state, &entry);
            removal.units_removed += entry.units;
            removal.removed.push((entry.course, entry.box_id));
        }
        for slot in doomed_slots {
            self.state.slots.remove(&slot);
        }
        for (dependent, owner) in kept {
            if let Some(entry) = self.state.entries.get_mut(&dependent) {
                entry.origin = EntryOrigin::Forced { owner };
                removal.retained.push((entry.course.clone(), dependent));
            }
        }
        let courses: BTreeSet<CourseId> = removal.removed.iter().map(|(c, _)| c.clone()).collect();
        for c in &courses {
            allocator.settle_double_count(&mut self.state, c);
        }

        tracing::debug!(
            course = %course,
            box_id = %box_id,
            cascaded = removal.removed.len().saturating_sub(1),
            retained = removal.retained.len(),
            restored = removal.restored.len(),
            "remove committed"
        );
        Ok(removal)
    }

    /// `root` and every box that exists only for it, breadth first. Boxes
    /// in `kept` and the entries they own are left out.
    fn cascade(&self, root: &str, kept: &BTreeMap<BoxId, BoxId>) -> Vec<BoxId> {
        let mut doomed = vec![root.to_string()];
        let mut i = 0;
        while i < doomed.len() {
            let owner = doomed[i].clone();
            for e in self.state.entries.values() {
                if e.owner() == Some(&owner)
                    && !kept.contains_key(&e.box_id)
                    && !doomed.contains(&e.box_id)
                {
                    doomed.push(e.box_id.clone());
                }
            }
            i += 1;
        }
        doomed
    }

    /// First cascaded box whose course an entry outside `doomed` depends on:
    /// the survivor's prerequisite names the course and is unmet without it.
    /// Returns (dependent box, survivor box).
    fn still_needed(&self, doomed: &[BoxId]) -> Option<(BoxId, BoxId)> {
        let survivors: Vec<_> = self
            .state
            .entries
            .values()
            .filter(|e| !doomed.contains(&e.box_id))
            .collect();
        let remaining: BTreeSet<CourseId> = survivors.iter().map(|e| e.course.clone()).collect();
        for b in doomed.iter().skip(1) {
            let Some(dependent) = self.state.entries.get(b) else {
                continue;
            };
            if remaining.contains(&dependent.course) {
                continue;
            }
            for survivor in &survivors {
                let Some(rule) = self.facts.get(&survivor.course).and_then(|f| f.rule.as_ref())
                else {
                    continue;
                };
                if !resolver::is_satisfied(rule, &remaining)
                    && rule.referenced_courses().contains(&dependent.course)
                {
                    return Some((b.clone(), survivor.box_id.clone()));
                }
            }
        }
        None
    }

    // ──────────────────────────────────────────────
    // Queries
    // ──────────────────────────────────────────────

    /// Progress of a requirement path or of a programme root.
    pub fn get_progress(&self, path: &str) -> Option<ProgressReport> {
        ProgressAggregator::new(&self.hierarchy).progress(&self.state, path)
    }

    pub fn get_programme_summary(&self, programme: &str) -> Option<ProgrammeSummary> {
        ProgressAggregator::new(&self.hierarchy).programme_summary(&self.state, programme)
    }

    /// Summaries of every loaded programme, in load order.
    pub fn programme_summaries(&self) -> Vec<ProgrammeSummary> {
        let aggregator = ProgressAggregator::new(&self.hierarchy);
        self.hierarchy
            .programmes()
            .iter()
            .filter_map(|p| aggregator.programme_summary(&self.state, &p.id))
            .collect()
    }

    /// Whether adding `course` anywhere would be rejected outright: it is
    /// already maxed out or conflicts with a selected course.
    pub async fn is_blocked(&self, course: &str) -> bool {
        if self.state.usage(course) >= self.config.max_attributions {
            return true;
        }
        let preclusions = match self.facts.get(course) {
            Some(facts) => facts.preclusions.clone(),
            None => match self.lookup.get_preclusions(course).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(
                        code = "REFERENCE_DATA_UNAVAILABLE",
                        course = %course,
                        error = %e,
                        "preclusions unavailable; assuming none"
                    );
                    Vec::new()
                }
            },
        };
        self.conflict(course, &preclusions).is_some()
    }

    fn conflict(&self, course: &str, preclusions: &[CourseId]) -> Option<CourseId> {
        self.state.selected_courses().into_iter().find(|other| {
            other != course
                && (preclusions.contains(other)
                    || self
                        .facts
                        .get(other)
                        .is_some_and(|f| f.preclusions.iter().any(|p| p == course)))
        })
    }

    fn missing_prerequisite(&self, course: &str, selected: &BTreeSet<CourseId>) -> Option<Warning> {
        let rule = self.facts.get(course)?.rule.as_ref()?;
        if resolver::is_satisfied(rule, selected) {
            return None;
        }
        Some(Warning {
            course: course.to_string(),
            kind: WarningKind::MissingPrerequisite,
            message: format!("{} still needs its prerequisite: {}", course, rule.label()),
        })
    }

    /// Structured warnings for a course, from what the session already knows.
    pub fn warnings(&self, course: &str) -> Vec<Warning> {
        let mut out = Vec::new();
        if let Some(tags) = self.state.stripped_tags.get(course) {
            for path in tags {
                out.push(Warning {
                    course: course.to_string(),
                    kind: WarningKind::CapExceeded { path: path.clone() },
                    message: format!(
                        "{} no longer counts toward {}: its unit cap is exceeded",
                        course,
                        self.hierarchy.label(path)
                    ),
                });
            }
        }
        if self.state.is_selected(course) {
            out.extend(self.missing_prerequisite(course, &self.state.selected_courses()));
        }
        let usage = self.state.usage(course);
        if usage >= self.config.max_attributions {
            out.push(Warning {
                course: course.to_string(),
                kind: WarningKind::AlreadyMaxed,
                message: format!(
                    "{} already counts toward {} requirements and cannot count toward more",
                    course, usage
                ),
            });
        }
        let preclusions = self
            .facts
            .get(course)
            .map(|f| f.preclusions.clone())
            .unwrap_or_default();
        if let Some(other) = self.conflict(course, &preclusions) {
            out.push(Warning {
                course: course.to_string(),
                message: format!("{} and {} preclude each other", course, other),
                kind: WarningKind::Precluded { conflicting: other },
            });
        }
        out
    }

    /// Human-readable warnings for a course.
    pub fn get_warnings(&self, course: &str) -> Vec<String> {
        self.warnings(course).into_iter().map(|w| w.message).collect()
    }
}

async fn fetch_facts(lookup: &dyn ReferenceLookup, course: &str, config: &EngineConfig) -> CourseFacts {
    let (units, rule, preclusions) = tokio::join!(
        lookup.get_units(course),
        lookup.get_prerequisite_rule(course),
        lookup.get_preclusions(course),
    );
    let mut degraded = false;
    let units = match units {
        Ok(u) => u,
        Err(e) => {
            degraded = true;
            tracing::warn!(
                code = "REFERENCE_DATA_UNAVAILABLE",
                course = %course,
                error = %e,
                default = %config.default_units,
                "units unavailable; using default"
            );
            config.default_units
        }
    };
    let rule = match rule {
        Ok(r) => r,
        Err(e) => {
            degraded = true;
            tracing::warn!(
                code = "REFERENCE_DATA_UNAVAILABLE",
                course = %course,
                error = %e,
                "prerequisite rule unavailable; treating as none"
            );
            None
        }
    };
    let preclusions = match preclusions {
        Ok(p) => p,
        Err(e) => {
            degraded = true;
            tracing::warn!(
                code = "REFERENCE_DATA_UNAVAILABLE",
                course = %course,
                error = %e,
                "preclusions unavailable; treating as none"
            );
            Vec::new()
        }
    };
    CourseFacts {
        units,
        rule,
        preclusions,
        degraded,
    }
}

async fn load_hierarchy(
    lookup: &dyn ReferenceLookup,
    ids: &[ProgrammeId],
    config: &EngineConfig,
) -> Result<PathHierarchy, EngineError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(EngineError::ProgrammeSet(format!(
                "programme '{}' is selected more than once",
                id
            )));
        }
    }

    let mut programmes = Vec::with_capacity(ids.len());
    for id in ids {
        programmes.push(lookup.get_programme(id).await?);
    }
    check_programme_set(&programmes, config)?;

    let mut paths: BTreeMap<PathId, RequirementPath> = BTreeMap::new();
    let mut queue: Vec<PathId> = programmes
        .iter()
        .flat_map(|p| p.paths.iter().cloned())
        .collect();
    while let Some(id) = queue.pop() {
        if paths.contains_key(&id) {
            continue;
        }
        let path = lookup.get_requirement_path(&id).await?;
        if let Some(parent) = &path.parent {
            if !paths.contains_key(parent) && !seen.contains(parent.as_str()) {
                queue.push(parent.clone());
            }
        }
        paths.insert(id, path);
    }

    let hierarchy = PathHierarchy::build(programmes, paths.into_values().collect())?;
    tracing::info!(
        programmes = ids.len(),
        paths = hierarchy.path_count(),
        "programmes loaded"
    );
    Ok(hierarchy)
}

fn check_programme_set(programmes: &[Programme], config: &EngineConfig) -> Result<(), EngineError> {
    let count = |kind: ProgrammeKind| programmes.iter().filter(|p| p.kind == kind).count();
    let majors = count(ProgrammeKind::Major);
    if majors != 1 {
        return Err(EngineError::ProgrammeSet(format!(
            "exactly one major is required, found {}",
            majors
        )));
    }
    let second = count(ProgrammeKind::SecondMajor);
    if second > 1 {
        return Err(EngineError::ProgrammeSet(format!(
            "at most one second major is allowed, found {}",
            second
        )));
    }
    let minors = count(ProgrammeKind::Minor);
    if minors > config.max_minors {
        return Err(EngineError::ProgrammeSet(format!(
            "at most {} minors are allowed, found {}",
            config.max_minors, minors
        )));
    }
    Ok(())
}
