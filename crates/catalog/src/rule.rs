//! Prerequisite rule trees.
//!
//! A rule tree is attached to exactly one owner course. Leaf kinds name
//! courses directly; `complex_and` and `complex_or` combine child rules.
//! Kinds the catalog does not know deserialize as [`RuleKind::Unrecognized`]
//! so that a single unfamiliar node does not make the whole course record
//! unreadable; the engine decides what an unrecognized node means.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::CourseId;

/// One node of a prerequisite rule tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Free-text description carried over from the course listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// The closed set of rule node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// A single required course.
    Simple { course: CourseId },
    /// Every listed course is required.
    SimpleAnd { courses: Vec<CourseId> },
    /// Any one listed course is required.
    SimpleOr { courses: Vec<CourseId> },
    /// `n` of the listed courses are required.
    #[serde(rename = "n_of_k")]
    NOfK { n: u32, courses: Vec<CourseId> },
    /// Every child rule is required.
    ComplexAnd { children: Vec<PrerequisiteRule> },
    /// Exactly one child rule is required; which one is the student's choice.
    ComplexOr { children: Vec<PrerequisiteRule> },
    #[serde(other)]
    Unrecognized,
}

impl PrerequisiteRule {
    pub fn new(kind: RuleKind) -> Self {
        PrerequisiteRule {
            id: None,
            description: None,
            kind,
        }
    }

    pub fn simple(course: &str) -> Self {
        Self::new(RuleKind::Simple {
            course: course.to_string(),
        })
    }

    pub fn all_of(courses: &[&str]) -> Self {
        Self::new(RuleKind::SimpleAnd {
            courses: courses.iter().map(|c| c.to_string()).collect(),
        })
    }

    pub fn any_of(courses: &[&str]) -> Self {
        Self::new(RuleKind::SimpleOr {
            courses: courses.iter().map(|c| c.to_string()).collect(),
        })
    }

    pub fn n_of(n: u32, courses: &[&str]) -> Self {
        Self::new(RuleKind::NOfK {
            n,
            courses: courses.iter().map(|c| c.to_string()).collect(),
        })
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Every course named anywhere in the tree.
    pub fn referenced_courses(&self) -> BTreeSet<CourseId> {
        let mut out = BTreeSet::new();
        self.collect_courses(&mut out);
        out
    }

    fn collect_courses(&self, out: &mut BTreeSet<CourseId>) {
        match &self.kind {
            RuleKind::Simple { course } => {
                out.insert(course.clone());
            }
            RuleKind::SimpleAnd { courses }
            | RuleKind::SimpleOr { courses }
            | RuleKind::NOfK { courses, .. } => {
                out.extend(courses.iter().cloned());
            }
            RuleKind::ComplexAnd { children } | RuleKind::ComplexOr { children } => {
                for child in children {
                    child.collect_courses(out);
                }
            }
            RuleKind::Unrecognized => {}
        }
    }

    /// Human-readable label: the description if present, else a summary.
    pub fn label(&self) -> String {
        match &self.description {
            Some(d) if !d.trim().is_empty() => d.trim().to_string(),
            _ => self.summary(),
        }
    }

    /// A generated one-line summary of the rule.
    pub fn summary(&self) -> String {
        match &self.kind {
            RuleKind::Simple { course } => course.clone(),
            RuleKind::SimpleAnd { courses } => courses.join(" and "),
            RuleKind::SimpleOr { courses } => format!("one of {}", courses.join(", ")),
            RuleKind::NOfK { n, courses } => format!("{} of {}", n, courses.join(", ")),
            RuleKind::ComplexAnd { children } => join_children(children, " and "),
            RuleKind::ComplexOr { children } => join_children(children, " or "),
            RuleKind::Unrecognized => "unrecognized requirement".to_string(),
        }
    }
}

fn join_children(children: &[PrerequisiteRule], sep: &str) -> String {
    children
        .iter()
        .map(|c| match c.kind {
            RuleKind::ComplexAnd { .. } | RuleKind::ComplexOr { .. } => format!("({})", c.summary()),
            _ => c.summary(),
        })
        .collect::<Vec<_>>()
        .join(sep)
}
