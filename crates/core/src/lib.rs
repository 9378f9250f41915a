//! Domain layer for client project tracking.
//!
//! The crate owns the project entity, the status state machine, the list
//! query contract and the [`ProjectService`] that orchestrates them on top
//! of an injected [`ProjectStore`].

pub mod memory;
pub mod policy;
pub mod query;
pub mod service;
pub mod store;
pub mod types;

pub use memory::MemoryProjectStore;
pub use policy::{StatusTransitionPolicy, TransitionDecision};
pub use query::{ListParams, ProjectQuerySpec, SortField, SortOrder};
pub use service::{Clock, ErrorKind, ProjectService, ServiceError};
pub use store::{ProjectStore, StatusWrite, StoreError};
pub use types::{NewProject, Project, ProjectDraft, ProjectId, ProjectStatus, ValidationError};
