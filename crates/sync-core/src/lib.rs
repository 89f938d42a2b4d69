//! sync-core: Reconciliation engine between a Todoist-style task service and
//! a markdown vault.
//!
//! This crate provides the core functionality for:
//! - Indexing managed notes by remote and vault identity
//! - The push-then-pull sync loop with fingerprint change detection
//! - Deterministic path policy for task/project/section notes
//! - Archive transitions, uuid back-fill, and signature repair
//! - Contracts for the remote client, vault filesystem, and templates
//!
//! The engine is cooperative and single-threaded: one run is one logical
//! task of awaited I/O steps, and at most one run may be in flight.

pub mod archive;
pub mod backfill;
pub mod fingerprint;
pub mod index;
pub mod path_policy;
pub mod props;
pub mod reconciler;
pub mod remote;
pub mod schema;
pub mod settings;
pub mod template;
pub mod vault;

pub use index::VaultIndex;
pub use props::PropNames;
pub use reconciler::{Reconciler, RunError, RunSummary};
pub use remote::{
    CreateTask, Patch, RemoteClient, RemoteError, RemoteItem, RemoteProject, RemoteSection,
    RemoteSnapshot, TaskPatch,
};
pub use schema::{SyncStatus, TaskNote, TaskStatus};
pub use settings::{ConflictPolicy, ImportFilter, MissingRemoteMode, Settings};
pub use vault::{Vault, VaultError};
