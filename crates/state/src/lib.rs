//! Durable project state: autosave, immutable versions, and rollback.
//!
//! * [`AutosaveController`]: debounced per-module persistence with an
//!   observable [`AutosaveStatus`] and a [`KeyValueStore`] fallback
//! * [`VersionControlManager`]: create, list, read, delete, and roll back
//!   versions against a [`ProjectBackend`]
//! * [`ProjectEventBus`]: typed fan-out of rollback and state events
//! * [`ModuleSession`]: one mounted module reacting to those events
//!
//! Snapshots arriving from a backend pass through [`schema::normalize`],
//! which maps every known snapshot layout onto [`ProjectState`].

mod autosave;
mod backend;
mod bus;
mod error;
mod http;
mod module;
pub mod schema;
mod store;
mod version;

pub use autosave::{AutosaveConfig, AutosaveController, AutosaveStatus, SaveOutcome};
pub use backend::{InMemoryBackend, ProjectBackend, RollbackOutcome};
pub use bus::{ProjectEvent, ProjectEventBus, RollbackEvent, Subscription, VersionAction};
pub use error::{Error, Result};
pub use http::HttpBackend;
pub use module::{ModuleSession, SessionActivity};
pub use pandaura_primitives::{ModuleId, ModuleState, ProjectId, ProjectState, Version, VersionNumber, VersionSummary};
pub use schema::SchemaError;
pub use store::{FileStore, KeyValueStore, MemoryStore, fallback_key};
pub use version::{DEFAULT_MIN_VERSION_INTERVAL, VersionControlManager};
