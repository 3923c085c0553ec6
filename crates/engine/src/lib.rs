//! Course plan validation engine -- incremental requirement fulfilment
//! across a major, an optional second major and up to three minors.
//!
//! The engine consumes reference data through a
//! [`ReferenceLookup`](courseplan_lookup::ReferenceLookup), keeps a
//! [`SelectionState`] up to date on every add and remove, and answers
//! progress queries from the maintained totals without re-walking the
//! requirement trees.

pub mod allocator;
pub mod config;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod outcome;
mod planner;
pub mod progress;
pub mod resolver;
pub mod state;

pub use allocator::CapAllocator;
pub use config::EngineConfig;
pub use engine::ValidationEngine;
pub use error::EngineError;
pub use hierarchy::{HierarchyError, PathHierarchy};
pub use outcome::{
    Acceptance, DecisionKind, DecisionOption, ForcedBox, Outcome, PendingDecision, Rejection,
    RejectionReason, Removal, SlotSummary, Warning, WarningKind,
};
pub use progress::{ProgrammeSummary, ProgressAggregator, ProgressReport, UeSummary};
pub use resolver::{is_satisfied, resolve, Resolution};
pub use state::{BoxId, EntryOrigin, PlanEntry, PrerequisiteSlot, SelectionState};
