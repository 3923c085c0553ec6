//! courseplan-catalog: typed reference data shared by the lookup layer,
//! the validation engine and the CLI.
//!
//! Covers the static side of course planning: course records with their
//! unit values, prerequisite rule trees and preclusions; programmes with
//! their unit targets and double-count caps; and the requirement paths that
//! make up each programme's tree. A [`CatalogDocument`] bundles all three
//! into one JSON document.

pub mod document;
pub mod rule;
pub mod types;

pub use document::{CatalogDocument, CatalogError};
pub use rule::{PrerequisiteRule, RuleKind};
pub use types::*;
