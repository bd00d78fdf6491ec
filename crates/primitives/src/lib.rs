//! Core data model: projects, tags, module state, and versions.

/// Identifier types for projects, modules, and versions.
pub mod ids;
/// Per-module project state and merging.
pub mod state;
/// PLC tag records.
pub mod tag;
/// Immutable version records.
pub mod version;

pub use ids::{ModuleId, ProjectId, VersionNumber};
pub use state::{ModuleState, ProjectState, merge_json};
pub use tag::{Tag, TagScope, UnknownScope};
pub use version::{Version, VersionSummary};
