/// All errors that can be returned by a ReferenceLookup implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// No course with this code exists in the reference data.
    #[error("course not found: {0}")]
    CourseNotFound(String),

    /// No requirement path with this id exists.
    #[error("requirement path not found: {0}")]
    PathNotFound(String),

    /// No programme with this id exists.
    #[error("programme not found: {0}")]
    ProgrammeNotFound(String),

    /// The backing service could not answer (network error, timeout, etc.).
    #[error("reference data unavailable: {0}")]
    Unavailable(String),
}
