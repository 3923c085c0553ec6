//! Static reference lookup backed by an in-memory catalog document.

use std::collections::HashMap;

use async_trait::async_trait;
use courseplan_catalog::{
    CatalogDocument, Course, CourseId, PrerequisiteRule, Programme, RequirementPath,
};
use rust_decimal::Decimal;

use crate::error::LookupError;
use crate::traits::ReferenceLookup;

/// A lookup that answers from a fixed [`CatalogDocument`].
///
/// Useful for tests, the CLI, and deployments that ship their catalog as
/// a file. Every call resolves immediately.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    courses: HashMap<CourseId, Course>,
    paths: HashMap<String, RequirementPath>,
    programmes: HashMap<String, Programme>,
}

impl StaticLookup {
    pub fn new(doc: CatalogDocument) -> Self {
        StaticLookup {
            courses: doc.courses.into_iter().map(|c| (c.id.clone(), c)).collect(),
            paths: doc.paths.into_iter().map(|p| (p.id.clone(), p)).collect(),
            programmes: doc
                .programmes
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
        }
    }

    /// Create a lookup with no data at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn insert_course(&mut self, course: Course) {
        self.courses.insert(course.id.clone(), course);
    }

    pub fn insert_path(&mut self, path: RequirementPath) {
        self.paths.insert(path.id.clone(), path);
    }

    pub fn insert_programme(&mut self, programme: Programme) {
        self.programmes.insert(programme.id.clone(), programme);
    }

    fn course(&self, id: &str) -> Result<&Course, LookupError> {
        self.courses
            .get(id)
            .ok_or_else(|| LookupError::CourseNotFound(id.to_string()))
    }
}

#[async_trait]
impl ReferenceLookup for StaticLookup {
    async fn get_units(&self, course: &str) -> Result<Decimal, LookupError> {
        self.course(course).map(|c| c.units)
    }

    async fn get_prerequisite_rule(
        &self,
        course: &str,
    ) -> Result<Option<PrerequisiteRule>, LookupError> {
        self.course(course).map(|c| c.prerequisite.clone())
    }

    async fn get_preclusions(&self, course: &str) -> Result<Vec<CourseId>, LookupError> {
        self.course(course).map(|c| c.preclusions.clone())
    }

    async fn get_requirement_path(&self, path: &str) -> Result<RequirementPath, LookupError> {
        self.paths
            .get(path)
            .cloned()
            .ok_or_else(|| LookupError::PathNotFound(path.to_string()))
    }

    async fn get_programme(&self, programme: &str) -> Result<Programme, LookupError> {
        self.programmes
            .get(programme)
            .cloned()
            .ok_or_else(|| LookupError::ProgrammeNotFound(programme.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> StaticLookup {
        let doc = CatalogDocument::from_json(&serde_json::json!({
            "courses": [
                { "id": "CS1010", "units": 4 },
                {
                    "id": "CS2040S",
                    "units": 4,
                    "prerequisite": { "kind": "simple", "course": "CS1010" },
                    "preclusions": ["CS2040"]
                }
            ],
            "programmes": [
                { "id": "cs", "kind": "major", "total_units": 160, "paths": ["cs-core"] }
            ],
            "paths": [
                { "id": "cs-core", "programme": "cs", "logic": "section" }
            ]
        }))
        .unwrap();
        StaticLookup::new(doc)
    }

    #[tokio::test]
    async fn answers_course_queries() {
        let lookup = lookup();
        assert_eq!(lookup.get_units("CS1010").await.unwrap(), Decimal::from(4));
        assert!(lookup.get_prerequisite_rule("CS1010").await.unwrap().is_none());
        assert_eq!(
            lookup.get_prerequisite_rule("CS2040S").await.unwrap(),
            Some(PrerequisiteRule::simple("CS1010"))
        );
        assert_eq!(
            lookup.get_preclusions("CS2040S").await.unwrap(),
            vec!["CS2040".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_entries_are_not_found() {
        let lookup = lookup();
        assert_eq!(
            lookup.get_units("XX9999").await,
            Err(LookupError::CourseNotFound("XX9999".to_string()))
        );
        assert!(matches!(
            lookup.get_requirement_path("nope").await,
            Err(LookupError::PathNotFound(_))
        ));
        assert!(matches!(
            lookup.get_programme("nope").await,
            Err(LookupError::ProgrammeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn answers_structure_queries() {
        let lookup = lookup();
        let programme = lookup.get_programme("cs").await.unwrap();
        assert_eq!(programme.paths, vec!["cs-core".to_string()]);
        let path = lookup.get_requirement_path("cs-core").await.unwrap();
        assert_eq!(path.programme, "cs");
    }
}
