//! Cap allocation: usage counts, max-cap strips and double-count charges.
//!
//! On commit the allocator charges every max cap on the chain from each
//! attributed leaf up to the programme root. A charge that pushes a cap over
//! its threshold strips the tag of every course contributing under that cap.
//! On remove the charge is released (clamped at zero) and, once the cap is
//! back at or under its threshold, every remaining contributor is restored.

use std::collections::BTreeSet;

use courseplan_catalog::{CourseId, PathId, ProgrammeId};
use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::hierarchy::PathHierarchy;
use crate::outcome::{RejectionReason, Warning, WarningKind};
use crate::state::{add_units, sub_units, PlanEntry, SelectionState};

pub struct CapAllocator<'a> {
    hierarchy: &'a PathHierarchy,
    config: &'a EngineConfig,
}

impl<'a> CapAllocator<'a> {
    pub fn new(hierarchy: &'a PathHierarchy, config: &'a EngineConfig) -> Self {
        CapAllocator { hierarchy, config }
    }

    // ── guards ──────────────────────────────────

    /// Triple-count guard: a course holds at most `max_attributions` attributions.
    pub fn check_usage(&self, state: &SelectionState, course: &str) -> Result<(), RejectionReason> {
        if state.usage(course) >= self.config.max_attributions {
            Err(RejectionReason::TripleCountPrevented)
        } else {
            Ok(())
        }
    }

    /// Whether charging `units` (on top of `pending` already proposed in the
    /// same operation) stays within the programme's double-count cap.
    pub fn has_spare(
        &self,
        state: &SelectionState,
        programme: &str,
        units: Decimal,
        pending: Decimal,
    ) -> bool {
        match self.hierarchy.programme(programme) {
            Some(p) => state.double_count_used(programme) + pending + units <= p.double_count_cap,
            None => false,
        }
    }

    /// Max caps on the chain above `leaf`, paired with their thresholds.
    pub fn caps_above(&self, leaf: &str) -> Vec<(PathId, Decimal)> {
        self.hierarchy
            .chain(leaf)
            .into_iter()
            .filter_map(|id| {
                let max = self.hierarchy.path(&id)?.max_cap()?;
                Some((id, max))
            })
            .collect()
    }

    // ── commit ──────────────────────────────────

    pub fn add_usage(&self, state: &mut SelectionState, entry: &PlanEntry) {
        let n = entry.attributions.len() as u32;
        if n > 0 {
            *state.usage_count.entry(entry.course.clone()).or_insert(0) += n;
        }
    }

    /// Charge every max cap above the entry's leaves. Contributions must already
    /// be recorded so the entry itself is among the stripped contributors.
    pub fn charge_caps(&self, state: &mut SelectionState, entry: &PlanEntry) -> Vec<Warning> {
        let mut warnings = Vec::new();
        for leaf in &entry.attributions {
            for (cap_path, threshold) in self.caps_above(leaf) {
                add_units(&mut state.cap_usage, &cap_path, entry.units);
                let used = state.cap_used(&cap_path);
                if used <= threshold {
                    continue;
                }
                let courses: Vec<CourseId> = state.contributors(&cap_path);
                for course in &courses {
                    state
                        .stripped_tags
                        .entry(course.clone())
                        .or_default()
                        .insert(cap_path.clone());
                }
                tracing::debug!(
                    path = %cap_path,
                    used = %used,
                    threshold = %threshold,
                    stripped = courses.len(),
                    "max cap exceeded"
                );
                warnings.push(Warning {
                    course: entry.course.clone(),
                    kind: WarningKind::CapExceeded {
                        path: cap_path.clone(),
                    },
                    message: format!(
                        "{} exceeds the {} unit cap of {} ({} units); courses under it no longer count toward it",
                        entry.course,
                        threshold,
                        self.hierarchy.label(&cap_path),
                        used
                    ),
                });
            }
        }
        warnings
    }

    pub fn charge_double_count(&self, state: &mut SelectionState, entry: &PlanEntry) {
        if entry.double_count.is_empty() {
            return;
        }
        for programme in &entry.double_count {
            add_units(&mut state.double_count_usage, programme, entry.units);
        }
        let attributed = state
            .double_count_attribution
            .entry(entry.course.clone())
            .or_default();
        for programme in &entry.double_count {
            if !attributed.contains(programme) {
                attributed.push(programme.clone());
            }
        }
    }

    // ── remove ──────────────────────────────────

    pub fn release_usage(&self, state: &mut SelectionState, entry: &PlanEntry) {
        let n = entry.attributions.len() as u32;
        if n == 0 {
            return;
        }
        let remaining = state.usage(&entry.course).saturating_sub(n);
        if remaining == 0 {
            state.usage_count.remove(&entry.course);
        } else {
            state.usage_count.insert(entry.course.clone(), remaining);
        }
    }

    /// Release the entry's cap charges. Contributions must already be removed.
    /// Returns the (course, cap path) pairs whose tag was restored.
    pub fn release_caps(
        &self,
        state: &mut SelectionState,
        entry: &PlanEntry,
    ) -> Vec<(CourseId, PathId)> {
        let mut restored = Vec::new();
        for leaf in &entry.attributions {
            for (cap_path, threshold) in self.caps_above(leaf) {
                let remaining = sub_units(&mut state.cap_usage, &cap_path, entry.units);

                let still_contributes = state
                    .contributions(&cap_path)
                    .iter()
                    .any(|c| c.course == entry.course);
                if !still_contributes {
                    unstrip(state, &entry.course, &cap_path);
                }

                if remaining <= threshold {
                    for course in state.contributors(&cap_path) {
                        if unstrip(state, &course, &cap_path) {
                            restored.push((course, cap_path.clone()));
                        }
                    }
                    if !restored.is_empty() {
                        tracing::debug!(path = %cap_path, restored = restored.len(), "cap tags restored");
                    }
                }
            }
        }
        restored
    }

    pub fn release_double_count(&self, state: &mut SelectionState, entry: &PlanEntry) {
        for programme in &entry.double_count {
            sub_units(&mut state.double_count_usage, programme, entry.units);
        }
        if entry.double_count.is_empty() {
            return;
        }
        // Another box of the same course may still hold some of the charges.
        let still_charged: Vec<ProgrammeId> = state
            .entries
            .values()
            .filter(|e| e.course == entry.course && e.box_id != entry.box_id)
            .flat_map(|e| e.double_count.iter().cloned())
            .collect();
        if let Some(list) = state.double_count_attribution.get_mut(&entry.course) {
            list.retain(|p| still_charged.contains(p));
            if list.is_empty() {
                state.double_count_attribution.remove(&entry.course);
            }
        }
    }

    /// Give back the double-count charges `course` holds on programmes it no
    /// longer counts toward. Runs after a box of the course is removed.
    pub fn settle_double_count(&self, state: &mut SelectionState, course: &str) {
        let attributed: BTreeSet<ProgrammeId> = state
            .entries
            .values()
            .filter(|e| e.course == course)
            .flat_map(|e| e.attributions.iter())
            .filter_map(|leaf| self.hierarchy.programme_of(leaf).cloned())
            .collect();
        let usage = &mut state.double_count_usage;
        for entry in state.entries.values_mut().filter(|e| e.course == course) {
            let units = entry.units;
            entry.double_count.retain(|p| {
                if attributed.contains(p) {
                    return true;
                }
                sub_units(usage, p, units);
                false
            });
        }
        let still_charged: BTreeSet<ProgrammeId> = state
            .entries
            .values()
            .filter(|e| e.course == course)
            .flat_map(|e| e.double_count.iter().cloned())
            .collect();
        if let Some(list) = state.double_count_attribution.get_mut(course) {
            list.retain(|p| still_charged.contains(p));
            if list.is_empty() {
                state.double_count_attribution.remove(course);
            }
        }
    }
}

/// Drop one stripped tag, keeping the map sparse. Returns whether it was set.
fn unstrip(state: &mut SelectionState, course: &str, cap_path: &str) -> bool {
    let Some(tags) = state.stripped_tags.get_mut(course) else {
        return false;
    };
    let removed = tags.remove(cap_path);
    if tags.is_empty() {
        state.stripped_tags.remove(course);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressAggregator;
    use crate::state::EntryOrigin;
    use courseplan_catalog::{
        CapKind, CapRule, LogicKind, Programme, ProgrammeKind, RequirementPath,
    };

    fn units(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn hierarchy() -> PathHierarchy {
        let section = RequirementPath {
            id: "ma-core".to_string(),
            parent: None,
            programme: "ma".to_string(),
            label: "Core".to_string(),
            logic: LogicKind::Section,
            cap: None,
            required_units: units(12),
            courses: vec![],
        };
        let leaf = RequirementPath {
            id: "ma-lvl1".to_string(),
            parent: Some("ma-core".to_string()),
            label: "Level 1".to_string(),
            logic: LogicKind::Leaf,
            cap: Some(CapRule {
                kind: CapKind::Max,
                units: units(4),
            }),
            ..section.clone()
        };
        PathHierarchy::build(
            vec![Programme {
                id: "ma".to_string(),
                kind: ProgrammeKind::Minor,
                label: "Mathematics".to_string(),
                total_units: units(20),
                double_count_cap: units(8),
                paths: vec!["ma-core".into(), "ma-lvl1".into()],
            }],
            vec![section, leaf],
        )
        .unwrap()
    }

    fn entry(course: &str, box_id: &str) -> PlanEntry {
        PlanEntry {
            course: course.to_string(),
            box_id: box_id.to_string(),
            units: units(4),
            origin: EntryOrigin::Chosen,
            attributions: vec!["ma-lvl1".to_string()],
            double_count: vec![],
        }
    }

    fn commit(h: &PathHierarchy, a: &CapAllocator, state: &mut SelectionState, e: &PlanEntry) -> Vec<Warning> {
        state.entries.insert(e.box_id.clone(), e.clone());
        a.add_usage(state, e);
        ProgressAggregator::new(h).add_contribution(state, "ma-lvl1", e);
        a.charge_caps(state, e)
    }

    fn uncommit(h: &PathHierarchy, a: &CapAllocator, state: &mut SelectionState, e: &PlanEntry) -> Vec<(CourseId, PathId)> {
        state.entries.remove(&e.box_id);
        ProgressAggregator::new(h).remove_contribution(state, "ma-lvl1", e);
        a.release_usage(state, e);
        a.release_caps(state, e)
    }

    #[test]
    fn exceeding_cap_strips_every_contributor() {
        let h = hierarchy();
        let config = EngineConfig::default();
        let a = CapAllocator::new(&h, &config);
        let mut state = SelectionState::new();

        assert!(commit(&h, &a, &mut state, &entry("MA1521", "b1")).is_empty());
        let warnings = commit(&h, &a, &mut state, &entry("MA1522", "b2"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind.code(), "CAP_EXCEEDED");
        assert_eq!(state.cap_used("ma-lvl1"), units(8));
        assert!(state.is_stripped("MA1521", "ma-lvl1"));
        assert!(state.is_stripped("MA1522", "ma-lvl1"));
    }

    #[test]
    fn release_under_threshold_restores_remaining() {
        let h = hierarchy();
        let config = EngineConfig::default();
        let a = CapAllocator::new(&h, &config);
        let mut state = SelectionState::new();
        commit(&h, &a, &mut state, &entry("MA1521", "b1"));
        let before = state.clone();

        commit(&h, &a, &mut state, &entry("MA1522", "b2"));
        let restored = uncommit(&h, &a, &mut state, &entry("MA1522", "b2"));
        assert_eq!(restored, vec![("MA1521".to_string(), "ma-lvl1".to_string())]);
        assert_eq!(state, before);
    }

    #[test]
    fn release_above_threshold_keeps_others_stripped() {
        let h = hierarchy();
        let config = EngineConfig::default();
        let a = CapAllocator::new(&h, &config);
        let mut state = SelectionState::new();
        commit(&h, &a, &mut state, &entry("MA1521", "b1"));
        commit(&h, &a, &mut state, &entry("MA1522", "b2"));
        commit(&h, &a, &mut state, &entry("MA2001", "b3"));

        let restored = uncommit(&h, &a, &mut state, &entry("MA2001", "b3"));
        assert!(restored.is_empty());
        assert!(!state.is_stripped("MA2001", "ma-lvl1"));
        assert!(state.is_stripped("MA1521", "ma-lvl1"));
        assert_eq!(state.cap_used("ma-lvl1"), units(8));
    }

    #[test]
    fn usage_guard_rejects_at_limit() {
        let h = hierarchy();
        let config = EngineConfig::default();
        let a = CapAllocator::new(&h, &config);
        let mut state = SelectionState::new();
        state.usage_count.insert("MA1521".to_string(), 2);
        assert_eq!(
            a.check_usage(&state, "MA1521"),
            Err(RejectionReason::TripleCountPrevented)
        );
        assert!(a.check_usage(&state, "MA1522").is_ok());
    }

    #[test]
    fn double_count_spare_capacity() {
        let h = hierarchy();
        let config = EngineConfig::default();
        let a = CapAllocator::new(&h, &config);
        let mut state = SelectionState::new();
        assert!(a.has_spare(&state, "ma", units(4), units(4)));
        state.double_count_usage.insert("ma".to_string(), units(6));
        assert!(!a.has_spare(&state, "ma", units(4), Decimal::ZERO));
        assert!(!a.has_spare(&state, "unknown", units(1), Decimal::ZERO));
    }

    #[test]
    fn double_count_charge_and_release() {
        let h = hierarchy();
        let config = EngineConfig::default();
        let a = CapAllocator::new(&h, &config);
        let mut state = SelectionState::new();
        let mut e = entry("MA1521", "b1");
        e.double_count = vec!["ma".to_string()];
        a.charge_double_count(&mut state, &e);
        assert_eq!(state.double_count_used("ma"), units(4));
        assert_eq!(state.double_count_attribution["MA1521"], vec!["ma".to_string()]);
        a.release_double_count(&mut state, &e);
        assert_eq!(state, SelectionState::new());
    }

    #[test]
    fn settling_drops_charges_outside_the_remaining_programmes() {
        let h = hierarchy();
        let config = EngineConfig::default();
        let a = CapAllocator::new(&h, &config);
        let mut state = SelectionState::new();
        let mut e = entry("MA1521", "b2");
        e.double_count = vec!["cs".to_string(), "ma".to_string()];
        state.entries.insert(e.box_id.clone(), e.clone());
        a.charge_double_count(&mut state, &e);

        a.settle_double_count(&mut state, "MA1521");
        assert_eq!(state.entries["b2"].double_count, vec!["ma".to_string()]);
        assert_eq!(state.double_count_used("cs"), Decimal::ZERO);
        assert_eq!(state.double_count_used("ma"), units(4));
        assert_eq!(state.double_count_attribution["MA1521"], vec!["ma".to_string()]);

        // Nothing stale left: a second pass is a no-op.
        let before = state.clone();
        a.settle_double_count(&mut state, "MA1521");
        assert_eq!(state, before);
    }
}
