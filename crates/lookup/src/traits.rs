use async_trait::async_trait;
use courseplan_catalog::{CourseId, PrerequisiteRule, Programme, RequirementPath};
use rust_decimal::Decimal;

use crate::error::LookupError;

/// Read-only source of static reference data for course planning.
///
/// Implementations are typically network-backed and may suspend. The
/// engine treats every call as independent and cancellable: dropping the
/// returned future abandons the request. Results are assumed to be
/// eventually consistent; the engine never writes through this trait.
///
/// ## Failure handling
///
/// Callers decide how to degrade. The validation engine substitutes a
/// configured default unit value when `get_units` fails and treats a
/// failed `get_prerequisite_rule` or `get_preclusions` as "none", logging
/// each fallback. Only programme loading (`get_programme`,
/// `get_requirement_path`) propagates errors, since a plan cannot be
/// validated against a structure that was never read.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so that one instance
/// can be shared between sessions and moved into spawned warm-up tasks.
#[async_trait]
pub trait ReferenceLookup: Send + Sync + 'static {
    /// Unit value of a course.
    async fn get_units(&self, course: &str) -> Result<Decimal, LookupError>;

    /// Prerequisite rule tree of a course, `None` if it has no prerequisites.
    async fn get_prerequisite_rule(
        &self,
        course: &str,
    ) -> Result<Option<PrerequisiteRule>, LookupError>;

    /// Courses that cannot be taken together with `course`.
    async fn get_preclusions(&self, course: &str) -> Result<Vec<CourseId>, LookupError>;

    /// Metadata of a single requirement path.
    async fn get_requirement_path(&self, path: &str) -> Result<RequirementPath, LookupError>;

    /// Programme metadata, including the ids of all its requirement paths.
    async fn get_programme(&self, programme: &str) -> Result<Programme, LookupError>;

    /// Best-effort warm-up for the given courses. Errors are swallowed.
    async fn preload(&self, _courses: &[CourseId]) {}
}
