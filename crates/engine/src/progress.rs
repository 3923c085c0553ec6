//! Per-path progress aggregation.
//!
//! A contribution is recorded on its leaf and on every ancestor up to the
//! programme root, so progress can be read at any level without walking the
//! tree. What a path *counts* excludes contributions from courses whose tag
//! was stripped by a max cap between the leaf and that path.
//!
//! Unrestricted-elective (UE) fulfilment is derived on demand from the
//! overflow of other programmes' sections and from unattributed entries.

use courseplan_catalog::{CourseId, PathId, ProgrammeId, ProgrammeKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::hierarchy::PathHierarchy;
use crate::state::{add_units, sub_units, Contribution, PlanEntry, SelectionState};

/// Progress of one requirement path or programme root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub path: PathId,
    pub label: String,
    pub required: Decimal,
    /// Units that count toward the path.
    pub fulfilled: Decimal,
    /// Units recorded on the path, stripped contributions included.
    pub raw: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Decimal>,
    pub minimum_met: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Decimal>,
    pub cap_exceeded: bool,
    pub contributors: Vec<CourseId>,
}

/// Unrestricted-elective figures of a major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeSummary {
    pub required: Decimal,
    pub fulfilled: Decimal,
    /// Spillover beyond `required`. Reported only.
    pub overflow: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammeSummary {
    pub programme: ProgrammeId,
    pub label: String,
    pub kind: ProgrammeKind,
    pub required: Decimal,
    pub fulfilled: Decimal,
    /// The programme's own section fulfilment, each section capped at its requirement.
    pub core: Decimal,
    /// Core fulfilment absorbed from the other loaded programmes.
    pub absorbed: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ue: Option<UeSummary>,
    pub sections: Vec<ProgressReport>,
}

/// Reads and writes the per-path totals of a [`SelectionState`].
pub struct ProgressAggregator<'a> {
    hierarchy: &'a PathHierarchy,
}

impl<'a> ProgressAggregator<'a> {
    pub fn new(hierarchy: &'a PathHierarchy) -> Self {
        ProgressAggregator { hierarchy }
    }

    /// Record `entry` on `leaf` and every ancestor of it.
    pub fn add_contribution(&self, state: &mut SelectionState, leaf: &str, entry: &PlanEntry) {
        for path in self.hierarchy.chain(leaf) {
            add_units(&mut state.path_fulfilment, &path, entry.units);
            state
                .path_contributors
                .entry(path)
                .or_default()
                .push(Contribution {
                    course: entry.course.clone(),
                    box_id: entry.box_id.clone(),
                    units: entry.units,
                    leaf: leaf.to_string(),
                });
        }
    }

    /// Undo [`add_contribution`](Self::add_contribution) for the same leaf and entry.
    pub fn remove_contribution(&self, state: &mut SelectionState, leaf: &str, entry: &PlanEntry) {
        for path in self.hierarchy.chain(leaf) {
            sub_units(&mut state.path_fulfilment, &path, entry.units);
            if let Some(list) = state.path_contributors.get_mut(&path) {
                if let Some(pos) = list
                    .iter()
                    .position(|c| c.box_id == entry.box_id && c.leaf == leaf)
                {
                    list.remove(pos);
                }
                if list.is_empty() {
                    state.path_contributors.remove(&path);
                }
            }
        }
    }

    /// Units counting toward `path` once stripped tags are taken into account.
    pub fn counted(&self, state: &SelectionState, path: &str) -> Decimal {
        state
            .contributions(path)
            .iter()
            .filter(|c| !self.stripped_between(state, c, path))
            .map(|c| c.units)
            .sum()
    }

    /// Whether the contribution's course is stripped for a cap on the chain
    /// from its leaf up to and including `path`.
    fn stripped_between(&self, state: &SelectionState, c: &Contribution, path: &str) -> bool {
        let Some(tags) = state.stripped_tags.get(&c.course) else {
            return false;
        };
        for id in self.hierarchy.chain(&c.leaf) {
            if tags.contains(&id) {
                return true;
            }
            if id == path {
                break;
            }
        }
        false
    }

    pub fn progress(&self, state: &SelectionState, path: &str) -> Option<ProgressReport> {
        let (required, minimum, maximum) = match self.hierarchy.path(path) {
            Some(p) => (p.required_units, p.min_cap(), p.max_cap()),
            None => (self.hierarchy.programme(path)?.total_units, None, None),
        };
        let fulfilled = self.counted(state, path);
        Some(ProgressReport {
            path: path.to_string(),
            label: self.hierarchy.label(path).to_string(),
            required,
            fulfilled,
            raw: state.fulfilment(path),
            minimum,
            minimum_met: minimum.map_or(true, |m| fulfilled >= m),
            maximum,
            cap_exceeded: maximum.is_some_and(|m| state.cap_used(path) > m),
            contributors: state.contributors(path),
        })
    }

    /// Σ over sections of the counted units, each capped at the section's
    /// requirement. Sections without a requirement count in full.
    fn core(&self, state: &SelectionState, programme: &str) -> Decimal {
        self.hierarchy
            .sections(programme)
            .iter()
            .map(|s| {
                let counted = self.counted(state, &s.id);
                if s.required_units.is_zero() {
                    counted
                } else {
                    counted.min(s.required_units)
                }
            })
            .sum()
    }

    /// Units counted by sections beyond their own requirement.
    fn overflow(&self, state: &SelectionState, programme: &str) -> Decimal {
        self.hierarchy
            .sections(programme)
            .iter()
            .filter(|s| !s.required_units.is_zero())
            .map(|s| (self.counted(state, &s.id) - s.required_units).max(Decimal::ZERO))
            .sum()
    }

    fn ue(&self, state: &SelectionState, programme: &str) -> Option<UeSummary> {
        let p = self.hierarchy.programme(programme)?;
        // What the core has not covered yet is left to electives.
        let required = (p.total_units - self.core(state, programme)).max(Decimal::ZERO);
        let unattributed: Decimal = state
            .entries
            .values()
            .filter(|e| e.attributions.is_empty())
            .map(|e| e.units)
            .sum();
        let spill: Decimal = unattributed
            + self
                .hierarchy
                .programmes()
                .iter()
                .filter(|q| q.id != programme)
                .map(|q| self.overflow(state, &q.id))
                .sum::<Decimal>();
        let fulfilled = required.min(spill);
        Some(UeSummary {
            required,
            fulfilled,
            overflow: spill - fulfilled,
        })
    }

    pub fn programme_summary(
        &self,
        state: &SelectionState,
        programme: &str,
    ) -> Option<ProgrammeSummary> {
        let p = self.hierarchy.programme(programme)?;
        let core = self.core(state, programme);
        let sections = self
            .hierarchy
            .sections(programme)
            .iter()
            .filter_map(|s| self.progress(state, &s.id))
            .collect();

        let (absorbed, ue) = if p.kind == ProgrammeKind::Major {
            let absorbed: Decimal = self
                .hierarchy
                .programmes()
                .iter()
                .filter(|q| q.id != programme)
                .map(|q| self.core(state, &q.id))
                .sum();
            (absorbed, self.ue(state, programme))
        } else {
            (Decimal::ZERO, None)
        };
        let fulfilled = core + absorbed + ue.as_ref().map_or(Decimal::ZERO, |u| u.fulfilled);

        Some(ProgrammeSummary {
            programme: p.id.clone(),
            label: self.hierarchy.label(programme).to_string(),
            kind: p.kind,
            required: p.total_units,
            fulfilled,
            core,
            absorbed,
            ue,
            sections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntryOrigin;
    use courseplan_catalog::{CapKind, CapRule, LogicKind, Programme, RequirementPath};

    fn units(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn path(id: &str, parent: Option<&str>, logic: LogicKind, required: i64) -> RequirementPath {
        RequirementPath {
            id: id.to_string(),
            parent: parent.map(str::to_string),
            programme: "cs".to_string(),
            label: String::new(),
            logic,
            cap: None,
            required_units: units(required),
            courses: vec![],
        }
    }

    fn hierarchy() -> PathHierarchy {
        let mut electives = path("cs-elec", Some("cs-core"), LogicKind::Leaf, 8);
        electives.cap = Some(CapRule {
            kind: CapKind::Max,
            units: units(4),
        });
        PathHierarchy::build(
            vec![Programme {
                id: "cs".to_string(),
                kind: ProgrammeKind::Major,
                label: "Computer Science".to_string(),
                total_units: units(40),
                double_count_cap: units(8),
                paths: vec!["cs-core".into(), "cs-found".into(), "cs-elec".into()],
            }],
            vec![
                path("cs-core", None, LogicKind::Section, 16),
                path("cs-found", Some("cs-core"), LogicKind::Leaf, 8),
                electives,
            ],
        )
        .unwrap()
    }

    fn entry(course: &str, box_id: &str, leaf: &str) -> PlanEntry {
        PlanEntry {
            course: course.to_string(),
            box_id: box_id.to_string(),
            units: units(4),
            origin: EntryOrigin::Chosen,
            attributions: vec![leaf.to_string()],
            double_count: vec![],
        }
    }

    #[test]
    fn contributions_reach_every_ancestor() {
        let h = hierarchy();
        let agg = ProgressAggregator::new(&h);
        let mut state = SelectionState::new();
        agg.add_contribution(&mut state, "cs-found", &entry("CS1010", "b1", "cs-found"));
        for p in ["cs-found", "cs-core", "cs"] {
            assert_eq!(state.fulfilment(p), units(4));
            assert_eq!(state.contributors(p), vec!["CS1010".to_string()]);
        }
        agg.remove_contribution(&mut state, "cs-found", &entry("CS1010", "b1", "cs-found"));
        assert_eq!(state, SelectionState::new());
    }

    #[test]
    fn stripped_contribution_stops_counting_above_its_cap() {
        let h = hierarchy();
        let agg = ProgressAggregator::new(&h);
        let mut state = SelectionState::new();
        agg.add_contribution(&mut state, "cs-elec", &entry("CS3230", "b1", "cs-elec"));
        state
            .stripped_tags
            .entry("CS3230".to_string())
            .or_default()
            .insert("cs-elec".to_string());
        assert_eq!(agg.counted(&state, "cs-elec"), Decimal::ZERO);
        assert_eq!(agg.counted(&state, "cs-core"), Decimal::ZERO);
        assert_eq!(state.fulfilment("cs-core"), units(4));
    }

    #[test]
    fn major_summary_has_ue() {
        let h = hierarchy();
        let agg = ProgressAggregator::new(&h);
        let mut state = SelectionState::new();
        agg.add_contribution(&mut state, "cs-found", &entry("CS1010", "b1", "cs-found"));
        let mut ue_entry = entry("GEA1000", "b2", "");
        ue_entry.attributions.clear();
        state.entries.insert("b2".to_string(), ue_entry);

        let summary = agg.programme_summary(&state, "cs").unwrap();
        assert_eq!(summary.required, units(40));
        assert_eq!(summary.core, units(4));
        let ue = summary.ue.unwrap();
        assert_eq!(ue.required, units(36));
        assert_eq!(ue.fulfilled, units(4));
        assert_eq!(summary.fulfilled, units(8));
    }

    #[test]
    fn report_flags_minimum_and_cap() {
        let h = hierarchy();
        let agg = ProgressAggregator::new(&h);
        let mut state = SelectionState::new();
        state.cap_usage.insert("cs-elec".to_string(), units(8));
        let report = agg.progress(&state, "cs-elec").unwrap();
        assert!(report.cap_exceeded);
        assert!(report.minimum_met);
        assert_eq!(report.maximum, Some(units(4)));
        assert!(agg.progress(&state, "nope").is_none());
    }
}
