//! Prerequisite resolution.
//!
//! Walks one course's rule tree depth-first against a working selection and
//! reports what the plan still needs: exact courses to force in, constrained
//! choice slots for the student to fill, or a question for a `complex_or`
//! node. Only the chosen branch of an answered `complex_or` is expanded.
//!
//! Every node has a position string (`r` for the root, `r.0` for its first
//! child, and so on). Positions name decision points and slots, so a replayed
//! resolution with the same answers produces the same ids.

use std::collections::{BTreeMap, BTreeSet};

use courseplan_catalog::{CourseId, PrerequisiteRule, RuleKind};

use crate::outcome::DecisionOption;

/// What a rule tree needs from the plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Exact prerequisites not yet selected, in rule order.
    pub forced: Vec<CourseId>,
    /// Constrained-choice slots to open.
    pub slots: Vec<SlotRequest>,
    /// First unanswered `complex_or` node, if any.
    pub decision: Option<PrerequisiteQuestion>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.forced.is_empty() && self.slots.is_empty() && self.decision.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRequest {
    /// Position of the slot within the rule tree; unique per owner.
    pub position: String,
    pub options: Vec<CourseId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrerequisiteQuestion {
    /// Decision point key, stable across replays.
    pub point: String,
    pub prompt: String,
    pub options: Vec<DecisionOption>,
}

/// Decision point key for the `complex_or` node at `position` of `owner`'s rule.
pub fn decision_point(owner: &str, position: &str) -> String {
    format!("prerequisite:{}:{}", owner, position)
}

/// Resolve `rule` (the prerequisite of `owner`) against `selected`.
///
/// `answers` maps decision points to the index of the chosen child.
pub fn resolve(
    rule: &PrerequisiteRule,
    owner: &str,
    selected: &BTreeSet<CourseId>,
    answers: &BTreeMap<String, String>,
) -> Resolution {
    let mut out = Resolution::default();
    walk(rule, owner, "r", selected, answers, &mut out);
    out
}

fn walk(
    rule: &PrerequisiteRule,
    owner: &str,
    position: &str,
    selected: &BTreeSet<CourseId>,
    answers: &BTreeMap<String, String>,
    out: &mut Resolution,
) {
    match &rule.kind {
        RuleKind::Simple { course } => force(course, selected, out),
        RuleKind::SimpleAnd { courses } => {
            for course in courses {
                force(course, selected, out);
            }
        }
        RuleKind::SimpleOr { courses } => {
            if !is_satisfied(rule, selected) {
                out.slots.push(SlotRequest {
                    position: position.to_string(),
                    options: courses.clone(),
                });
            }
        }
        RuleKind::NOfK { n, courses } => {
            let have = courses.iter().filter(|c| selected.contains(*c)).count();
            let open: Vec<CourseId> = courses
                .iter()
                .filter(|c| !selected.contains(*c))
                .cloned()
                .collect();
            let missing = (*n as usize).saturating_sub(have).min(open.len());
            for i in 0..missing {
                out.slots.push(SlotRequest {
                    position: format!("{}#{}", position, i),
                    options: open.clone(),
                });
            }
        }
        RuleKind::ComplexAnd { children } => {
            for (i, child) in children.iter().enumerate() {
                let child_pos = format!("{}.{}", position, i);
                walk(child, owner, &child_pos, selected, answers, out);
            }
        }
        RuleKind::ComplexOr { children } => {
            if children.is_empty() || is_satisfied(rule, selected) {
                return;
            }
            if children.len() == 1 {
                let child_pos = format!("{}.0", position);
                walk(&children[0], owner, &child_pos, selected, answers, out);
                return;
            }
            let point = decision_point(owner, position);
            let chosen = answers
                .get(&point)
                .and_then(|a| a.parse::<usize>().ok())
                .filter(|i| *i < children.len());
            match chosen {
                Some(i) => {
                    let child_pos = format!("{}.{}", position, i);
                    walk(&children[i], owner, &child_pos, selected, answers, out);
                }
                None => {
                    if out.decision.is_none() {
                        out.decision = Some(question(rule, owner, point, children));
                    }
                }
            }
        }
        RuleKind::Unrecognized => {
            tracing::warn!(
                course = %owner,
                rule = rule.id.as_deref().unwrap_or(position),
                "unrecognized prerequisite kind treated as satisfied"
            );
        }
    }
}

fn force(course: &CourseId, selected: &BTreeSet<CourseId>, out: &mut Resolution) {
    if !selected.contains(course) && !out.forced.contains(course) {
        out.forced.push(course.clone());
    }
}

fn question(
    rule: &PrerequisiteRule,
    owner: &str,
    point: String,
    children: &[PrerequisiteRule],
) -> PrerequisiteQuestion {
    let prompt = match &rule.description {
        Some(d) if !d.trim().is_empty() => {
            format!("Choose how to meet the prerequisite of {}: {}", owner, d.trim())
        }
        _ => format!("Choose how to meet the prerequisite of {}", owner),
    };
    PrerequisiteQuestion {
        point,
        prompt,
        options: children
            .iter()
            .enumerate()
            .map(|(i, child)| DecisionOption {
                id: i.to_string(),
                label: child.label(),
                programmes: vec![],
            })
            .collect(),
    }
}

/// Whether `selected` satisfies `rule`. Unrecognized nodes count as satisfied.
pub fn is_satisfied(rule: &PrerequisiteRule, selected: &BTreeSet<CourseId>) -> bool {
    match &rule.kind {
        RuleKind::Simple { course } => selected.contains(course),
        RuleKind::SimpleAnd { courses } => courses.iter().all(|c| selected.contains(c)),
        RuleKind::SimpleOr { courses } => {
            courses.is_empty() || courses.iter().any(|c| selected.contains(c))
        }
        RuleKind::NOfK { n, courses } => {
            courses.iter().filter(|c| selected.contains(*c)).count() >= *n as usize
        }
        RuleKind::ComplexAnd { children } => children.iter().all(|c| is_satisfied(c, selected)),
        RuleKind::ComplexOr { children } => {
            children.is_empty() || children.iter().any(|c| is_satisfied(c, selected))
        }
        RuleKind::Unrecognized => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(courses: &[&str]) -> BTreeSet<CourseId> {
        courses.iter().map(|c| c.to_string()).collect()
    }

    fn no_answers() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn simple_rules_force_missing_courses() {
        let rule = PrerequisiteRule::all_of(&["CS1010", "CS1231", "MA1521"]);
        let res = resolve(&rule, "CS2040S", &set(&["CS1231"]), &no_answers());
        assert_eq!(res.forced, vec!["CS1010", "MA1521"]);
        assert!(res.slots.is_empty());
        assert!(res.decision.is_none());
    }

    #[test]
    fn satisfied_simple_or_opens_no_slot() {
        let rule = PrerequisiteRule::any_of(&["CS1010", "CS1101S"]);
        assert!(resolve(&rule, "CS2030", &set(&["CS1101S"]), &no_answers()).is_empty());

        let res = resolve(&rule, "CS2030", &set(&[]), &no_answers());
        assert_eq!(res.slots.len(), 1);
        assert_eq!(res.slots[0].position, "r");
        assert_eq!(res.slots[0].options, vec!["CS1010", "CS1101S"]);
    }

    #[test]
    fn n_of_k_opens_one_slot_per_missing_course() {
        let rule = PrerequisiteRule::n_of(2, &["MA1101R", "MA1102R", "MA1521"]);
        let res = resolve(&rule, "MA2001", &set(&["MA1521"]), &no_answers());
        assert_eq!(res.slots.len(), 1);
        assert_eq!(res.slots[0].position, "r#0");
        assert_eq!(res.slots[0].options, vec!["MA1101R", "MA1102R"]);

        let res = resolve(&rule, "MA2001", &set(&[]), &no_answers());
        let positions: Vec<_> = res.slots.iter().map(|s| s.position.as_str()).collect();
        assert_eq!(positions, vec!["r#0", "r#1"]);
    }

    #[test]
    fn complex_or_asks_before_expanding() {
        let rule = PrerequisiteRule::new(RuleKind::ComplexOr {
            children: vec![
                PrerequisiteRule::simple("CS1010").with_description("Programming Methodology"),
                PrerequisiteRule::all_of(&["CS1101S", "CS1231S"]),
            ],
        });
        let res = resolve(&rule, "CS2030S", &set(&[]), &no_answers());
        assert!(res.forced.is_empty());
        let q = res.decision.unwrap();
        assert_eq!(q.point, "prerequisite:CS2030S:r");
        let labels: Vec<_> = q.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["Programming Methodology", "CS1101S and CS1231S"]);

        let mut answers = BTreeMap::new();
        answers.insert(q.point.clone(), "1".to_string());
        let res = resolve(&rule, "CS2030S", &set(&[]), &answers);
        assert_eq!(res.forced, vec!["CS1101S", "CS1231S"]);
        assert!(res.decision.is_none());
    }

    #[test]
    fn complex_or_with_satisfied_branch_needs_nothing() {
        let rule = PrerequisiteRule::new(RuleKind::ComplexOr {
            children: vec![
                PrerequisiteRule::simple("CS1010"),
                PrerequisiteRule::simple("CS1101S"),
            ],
        });
        assert!(resolve(&rule, "CS2030", &set(&["CS1101S"]), &no_answers()).is_empty());
    }

    #[test]
    fn complex_and_unions_children_and_bubbles_decision() {
        let rule = PrerequisiteRule::new(RuleKind::ComplexAnd {
            children: vec![
                PrerequisiteRule::simple("MA1521"),
                PrerequisiteRule::new(RuleKind::ComplexOr {
                    children: vec![
                        PrerequisiteRule::simple("CS1010"),
                        PrerequisiteRule::simple("CS1101S"),
                    ],
                }),
                PrerequisiteRule::any_of(&["ST1131", "ST2334"]),
            ],
        });
        let res = resolve(&rule, "CS3244", &set(&[]), &no_answers());
        assert_eq!(res.forced, vec!["MA1521"]);
        assert_eq!(res.slots[0].position, "r.2");
        assert_eq!(res.decision.unwrap().point, "prerequisite:CS3244:r.1");
    }

    #[test]
    fn unrecognized_is_fail_open() {
        let rule = PrerequisiteRule::new(RuleKind::Unrecognized);
        assert!(is_satisfied(&rule, &set(&[])));
        assert!(resolve(&rule, "CS4248", &set(&[]), &no_answers()).is_empty());
    }

    #[test]
    fn satisfaction_of_n_of_k() {
        let rule = PrerequisiteRule::n_of(2, &["A", "B", "C"]);
        assert!(!is_satisfied(&rule, &set(&["A"])));
        assert!(is_satisfied(&rule, &set(&["A", "C"])));
    }

    #[test]
    fn duplicates_are_forced_once() {
        let rule = PrerequisiteRule::new(RuleKind::ComplexAnd {
            children: vec![
                PrerequisiteRule::simple("CS1010"),
                PrerequisiteRule::all_of(&["CS1010", "CS1231"]),
            ],
        });
        let res = resolve(&rule, "CS2100", &set(&[]), &no_answers());
        assert_eq!(res.forced, vec!["CS1010", "CS1231"]);
    }
}
