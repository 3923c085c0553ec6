use courseplan_lookup::LookupError;

use crate::hierarchy::HierarchyError;

/// Errors returned by engine operations.
///
/// Guard outcomes (rejections, decisions, warnings) are not errors; they
/// come back as an [`Outcome`](crate::Outcome). These variants cover
/// misuse of the API and failures to load a programme structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Reading a programme or requirement path failed during load.
    #[error("failed to load requirement structure: {0}")]
    Reference(#[from] LookupError),

    /// The loaded paths do not form a valid tree.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// The requested combination of programmes is not allowed.
    #[error("invalid programme selection: {0}")]
    ProgrammeSet(String),

    /// No pending decision has this id.
    #[error("no pending decision with id '{0}'")]
    UnknownDecision(String),

    /// The chosen option is not one of the pending decision's options.
    #[error("decision '{decision_id}' has no option '{option_id}'")]
    InvalidOption {
        decision_id: String,
        option_id: String,
    },

    /// No plan entry occupies this box.
    #[error("box '{0}' is empty")]
    UnknownBox(String),

    /// The box holds a different course than the one named.
    #[error("box '{box_id}' holds '{actual}', not '{course}'")]
    BoxMismatch {
        box_id: String,
        course: String,
        actual: String,
    },

    /// Forced prerequisite boxes are removed together with their owner.
    #[error("box '{box_id}' is a prerequisite of '{owner}' and cannot be removed on its own")]
    ReadOnlyBox { box_id: String, owner: String },
}
