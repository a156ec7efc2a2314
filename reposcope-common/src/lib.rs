//! Repository scope selection and override reconciliation.
//!
//! Data flows leaf-first: [`catalog`] fetches and caches the repository
//! catalog, [`index`] and [`tree`] derive read-only views from it,
//! [`state`] holds the mutable selection, [`tristate`] renders it as
//! checkbox states and [`reconcile`] diffs it against the persisted
//! overrides. [`engine::ScopeEngine`] ties these together for one session.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod http;
pub mod index;
pub mod logging;
pub mod reconcile;
pub mod state;
pub mod tree;
pub mod tristate;
pub mod types;

pub use catalog::{CatalogCache, CatalogProvider, Clock, FetchSettings, ManualClock, SystemClock};
pub use config::ScopeConfig;
pub use engine::{ScopeEngine, ScopePersistence};
pub use errors::{ErrorCode, ScopeError};
pub use events::EventBus;
pub use index::CatalogIndex;
pub use reconcile::{DiffClassification, DiffSummary, RepoDiffRow};
pub use state::ScopeState;
pub use tree::{GroupKind, ScopeTree};
pub use tristate::{TriState, TriStateMap};
pub use types::{
    CatalogPage, CatalogSnapshot, OverrideRecord, ProjectRecord, RepoKey, RepositoryRecord,
    RepositoryRef, SavePayload, ScopeMode, ScopeResponse,
};
