//! Catalog documents: one JSON file carrying courses, programmes and paths.
//!
//! The main entry point is [`CatalogDocument::from_json`]. Structural checks
//! that only need the document itself (duplicate ids, dangling programme
//! path lists) run in [`CatalogDocument::validate`]; tree-shape checks
//! belong to the engine's hierarchy builder.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{Course, Programme, RequirementPath};

/// Errors while reading or checking a catalog document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid catalog JSON: {0}")]
    Json(String),

    #[error("duplicate course '{0}'")]
    DuplicateCourse(String),

    #[error("duplicate programme '{0}'")]
    DuplicateProgramme(String),

    #[error("duplicate requirement path '{0}'")]
    DuplicatePath(String),

    #[error("programme '{programme}' lists unknown path '{path}'")]
    UnknownPath { programme: String, path: String },

    #[error("path '{path}' belongs to programme '{owner}' but is listed by '{listed_by}'")]
    ProgrammeMismatch {
        path: String,
        owner: String,
        listed_by: String,
    },

    #[error("path '{path}' names unknown programme '{programme}'")]
    UnknownProgramme { path: String, programme: String },
}

/// Courses, programmes and requirement paths in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub programmes: Vec<Programme>,
    #[serde(default)]
    pub paths: Vec<RequirementPath>,
}

impl CatalogDocument {
    /// Deserialize and validate a catalog from a JSON value.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_json::from_value(value.clone())
            .map_err(|e| CatalogError::Json(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Deserialize and validate a catalog from JSON text.
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument =
            serde_json::from_str(text).map_err(|e| CatalogError::Json(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = BTreeSet::new();
        for course in &self.courses {
            if !seen.insert(course.id.as_str()) {
                return Err(CatalogError::DuplicateCourse(course.id.clone()));
            }
        }

        let mut programmes = BTreeSet::new();
        for programme in &self.programmes {
            if !programmes.insert(programme.id.as_str()) {
                return Err(CatalogError::DuplicateProgramme(programme.id.clone()));
            }
        }

        let mut paths: BTreeMap<&str, &RequirementPath> = BTreeMap::new();
        for path in &self.paths {
            if paths.insert(path.id.as_str(), path).is_some() {
                return Err(CatalogError::DuplicatePath(path.id.clone()));
            }
            if !programmes.contains(path.programme.as_str()) {
                return Err(CatalogError::UnknownProgramme {
                    path: path.id.clone(),
                    programme: path.programme.clone(),
                });
            }
        }

        for programme in &self.programmes {
            for path_id in &programme.paths {
                let path = paths
                    .get(path_id.as_str())
                    .ok_or_else(|| CatalogError::UnknownPath {
                        programme: programme.id.clone(),
                        path: path_id.clone(),
                    })?;
                if path.programme != programme.id {
                    return Err(CatalogError::ProgrammeMismatch {
                        path: path_id.clone(),
                        owner: path.programme.clone(),
                        listed_by: programme.id.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn course(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    pub fn programme(&self, id: &str) -> Option<&Programme> {
        self.programmes.iter().find(|p| p.id == id)
    }

    pub fn path(&self, id: &str) -> Option<&RequirementPath> {
        self.paths.iter().find(|p| p.id == id)
    }
}
