//! Explicit requirement-path hierarchy.
//!
//! Built once when a programme selection is loaded. Every path records its
//! parent in an adjacency map; section roots (paths without a parent) hang
//! under a synthetic programme-root node whose id is the programme id. All
//! ancestor walks go through this map.

use std::collections::{BTreeMap, BTreeSet};

use courseplan_catalog::{CourseId, PathId, Programme, ProgrammeId, RequirementPath};

/// Structural problems in a programme's requirement paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("path '{path}' names unknown parent '{parent}'")]
    UnknownParent { path: PathId, parent: PathId },

    #[error("path '{path}' of programme '{programme}' has parent '{parent}' from another programme")]
    CrossProgrammeParent {
        path: PathId,
        programme: ProgrammeId,
        parent: PathId,
    },

    #[error("leaf path '{parent}' cannot have child '{path}'")]
    LeafWithChildren { path: PathId, parent: PathId },

    #[error("requirement paths form a cycle through '{0}'")]
    Cycle(PathId),

    #[error("path '{path}' is listed by programme '{listed_by}' but owned by '{owner}'")]
    ProgrammeMismatch {
        path: PathId,
        owner: ProgrammeId,
        listed_by: ProgrammeId,
    },

    #[error("id '{0}' is used by both a programme and a path")]
    RootCollision(String),

    #[error("path '{0}' is defined twice")]
    DuplicatePath(PathId),
}

/// The loaded programmes and their requirement trees.
#[derive(Debug, Clone, Default)]
pub struct PathHierarchy {
    programmes: Vec<Programme>,
    paths: BTreeMap<PathId, RequirementPath>,
    /// Parent of every path, section roots pointing at their programme id.
    parent: BTreeMap<PathId, PathId>,
    children: BTreeMap<PathId, Vec<PathId>>,
}

impl PathHierarchy {
    /// Build and validate the hierarchy for the given programmes.
    ///
    /// `paths` must contain every path listed by the programmes. Programme
    /// order is kept: it decides which programme is consulted first when a
    /// course could be placed in several.
    pub fn build(
        programmes: Vec<Programme>,
        paths: Vec<RequirementPath>,
    ) -> Result<Self, HierarchyError> {
        let programme_ids: BTreeSet<&str> = programmes.iter().map(|p| p.id.as_str()).collect();

        let mut by_id: BTreeMap<PathId, RequirementPath> = BTreeMap::new();
        for path in paths {
            if programme_ids.contains(path.id.as_str()) {
                return Err(HierarchyError::RootCollision(path.id));
            }
            if by_id.contains_key(&path.id) {
                return Err(HierarchyError::DuplicatePath(path.id));
            }
            by_id.insert(path.id.clone(), path);
        }

        for programme in &programmes {
            for path_id in &programme.paths {
                if let Some(path) = by_id.get(path_id) {
                    if path.programme != programme.id {
                        return Err(HierarchyError::ProgrammeMismatch {
                            path: path_id.clone(),
                            owner: path.programme.clone(),
                            listed_by: programme.id.clone(),
                        });
                    }
                }
            }
        }

        let mut parent = BTreeMap::new();
        let mut children: BTreeMap<PathId, Vec<PathId>> = BTreeMap::new();
        for path in by_id.values() {
            let up = match &path.parent {
                Some(parent_id) => {
                    let parent_path =
                        by_id
                            .get(parent_id)
                            .ok_or_else(|| HierarchyError::UnknownParent {
                                path: path.id.clone(),
                                parent: parent_id.clone(),
                            })?;
                    if parent_path.programme != path.programme {
                        return Err(HierarchyError::CrossProgrammeParent {
                            path: path.id.clone(),
                            programme: path.programme.clone(),
                            parent: parent_id.clone(),
                        });
                    }
                    if parent_path.is_leaf() {
                        return Err(HierarchyError::LeafWithChildren {
                            path: path.id.clone(),
                            parent: parent_id.clone(),
                        });
                    }
                    parent_id.clone()
                }
                None => path.programme.clone(),
            };
            children.entry(up.clone()).or_default().push(path.id.clone());
            parent.insert(path.id.clone(), up);
        }

        let hierarchy = PathHierarchy {
            programmes,
            paths: by_id,
            parent,
            children,
        };
        hierarchy.check_acyclic()?;
        Ok(hierarchy)
    }

    fn check_acyclic(&self) -> Result<(), HierarchyError> {
        let limit = self.paths.len() + 1;
        for id in self.paths.keys() {
            let mut current = id;
            let mut steps = 0;
            while let Some(up) = self.parent.get(current) {
                steps += 1;
                if steps > limit || up == id {
                    return Err(HierarchyError::Cycle(id.clone()));
                }
                current = up;
            }
        }
        Ok(())
    }

    pub fn programmes(&self) -> &[Programme] {
        &self.programmes
    }

    pub fn programme(&self, id: &str) -> Option<&Programme> {
        self.programmes.iter().find(|p| p.id == id)
    }

    pub fn is_programme_root(&self, id: &str) -> bool {
        self.programme(id).is_some()
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn path(&self, id: &str) -> Option<&RequirementPath> {
        self.paths.get(id)
    }

    /// A leaf path by id. `None` for unknown ids and non-leaf paths.
    pub fn leaf(&self, id: &str) -> Option<&RequirementPath> {
        self.paths.get(id).filter(|p| p.is_leaf())
    }

    /// Whether the id names a path or a programme root.
    pub fn contains(&self, id: &str) -> bool {
        self.paths.contains_key(id) || self.is_programme_root(id)
    }

    /// Programme owning a path; a programme root owns itself.
    pub fn programme_of(&self, id: &str) -> Option<&ProgrammeId> {
        match self.paths.get(id) {
            Some(path) => Some(&path.programme),
            None => self.programme(id).map(|p| &p.id),
        }
    }

    pub fn parent(&self, id: &str) -> Option<&PathId> {
        self.parent.get(id)
    }

    pub fn children(&self, id: &str) -> &[PathId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The path itself followed by every ancestor, ending at the programme root.
    pub fn chain(&self, id: &str) -> Vec<PathId> {
        let mut out = vec![id.to_string()];
        let mut current = id;
        while let Some(up) = self.parent.get(current) {
            out.push(up.clone());
            current = up;
        }
        out
    }

    /// Section roots of a programme, in id order.
    pub fn sections(&self, programme: &str) -> Vec<&RequirementPath> {
        self.children(programme)
            .iter()
            .filter_map(|id| self.paths.get(id))
            .collect()
    }

    /// Display label of a path or programme root, falling back to the id.
    pub fn label<'a>(&'a self, id: &'a str) -> &'a str {
        let label = match self.paths.get(id) {
            Some(path) => path.label.as_str(),
            None => self.programme(id).map(|p| p.label.as_str()).unwrap_or(""),
        };
        if label.is_empty() {
            id
        } else {
            label
        }
    }

    /// First leaf of `programme` that lists `course` explicitly.
    pub fn first_leaf_listing(&self, programme: &str, course: &str) -> Option<&PathId> {
        self.programme(programme)?
            .paths
            .iter()
            .find(|id| self.paths.get(*id).is_some_and(|p| p.lists(course)))
    }

    /// Programmes with at least one leaf listing `course`, in load order.
    ///
    /// This is the static double-count eligibility of the course.
    pub fn programmes_listing(&self, course: &str) -> Vec<ProgrammeId> {
        self.programmes
            .iter()
            .filter(|p| self.first_leaf_listing(&p.id, course).is_some())
            .map(|p| p.id.clone())
            .collect()
    }

    /// Every course named by any leaf of the loaded programmes.
    pub fn listed_courses(&self) -> BTreeSet<CourseId> {
        self.paths
            .values()
            .filter(|p| p.is_leaf())
            .flat_map(|p| p.courses.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courseplan_catalog::{LogicKind, ProgrammeKind};
    use rust_decimal::Decimal;

    fn programme(id: &str, paths: &[&str]) -> Programme {
        Programme {
            id: id.to_string(),
            kind: ProgrammeKind::Major,
            label: id.to_uppercase(),
            total_units: Decimal::from(40),
            double_count_cap: Decimal::from(8),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn path(id: &str, programme: &str, parent: Option<&str>, logic: LogicKind) -> RequirementPath {
        RequirementPath {
            id: id.to_string(),
            parent: parent.map(str::to_string),
            programme: programme.to_string(),
            label: String::new(),
            logic,
            cap: None,
            required_units: Decimal::ZERO,
            courses: vec![],
        }
    }

    fn sample() -> PathHierarchy {
        let mut leaf = path("cs-found", "cs", Some("cs-core"), LogicKind::Leaf);
        leaf.courses = vec!["CS1010".to_string()];
        PathHierarchy::build(
            vec![programme("cs", &["cs-core", "cs-found"])],
            vec![path("cs-core", "cs", None, LogicKind::Section), leaf],
        )
        .unwrap()
    }

    #[test]
    fn chain_reaches_programme_root() {
        let h = sample();
        assert_eq!(h.chain("cs-found"), vec!["cs-found", "cs-core", "cs"]);
        assert_eq!(h.children("cs"), ["cs-core".to_string()]);
        assert!(h.is_programme_root("cs"));
        assert_eq!(h.programme_of("cs-found").map(String::as_str), Some("cs"));
    }

    #[test]
    fn finds_listing_leaves() {
        let h = sample();
        assert_eq!(
            h.first_leaf_listing("cs", "CS1010").map(String::as_str),
            Some("cs-found")
        );
        assert_eq!(h.programmes_listing("CS1010"), vec!["cs".to_string()]);
        assert!(h.programmes_listing("MA1521").is_empty());
    }

    #[test]
    fn labels_fall_back_to_ids() {
        let h = sample();
        assert_eq!(h.label("cs-core"), "cs-core");
        assert_eq!(h.label("cs"), "CS");
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let err = PathHierarchy::build(
            vec![programme("cs", &["a"])],
            vec![path("a", "cs", Some("missing"), LogicKind::Leaf)],
        )
        .unwrap_err();
        assert!(matches!(err, HierarchyError::UnknownParent { .. }));
    }

    #[test]
    fn cycle_is_rejected() {
        let err = PathHierarchy::build(
            vec![programme("cs", &["a", "b"])],
            vec![
                path("a", "cs", Some("b"), LogicKind::And),
                path("b", "cs", Some("a"), LogicKind::And),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, HierarchyError::Cycle(_)));
    }

    #[test]
    fn leaf_cannot_parent() {
        let err = PathHierarchy::build(
            vec![programme("cs", &["a", "b"])],
            vec![
                path("a", "cs", None, LogicKind::Leaf),
                path("b", "cs", Some("a"), LogicKind::Leaf),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, HierarchyError::LeafWithChildren { .. }));
    }

    #[test]
    fn cross_programme_parent_is_rejected() {
        let err = PathHierarchy::build(
            vec![programme("cs", &["a"]), programme("ma", &["b"])],
            vec![
                path("a", "cs", None, LogicKind::Section),
                path("b", "ma", Some("a"), LogicKind::Leaf),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, HierarchyError::CrossProgrammeParent { .. }));
    }

    #[test]
    fn programme_id_cannot_double_as_path() {
        let err = PathHierarchy::build(
            vec![programme("cs", &["cs"])],
            vec![path("cs", "cs", None, LogicKind::Section)],
        )
        .unwrap_err();
        assert_eq!(err, HierarchyError::RootCollision("cs".to_string()));
    }
}
