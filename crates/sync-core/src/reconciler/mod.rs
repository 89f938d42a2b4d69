//! The reconciler: one sync run from repair to summary.
//!
//! A run is a single logical task of awaited steps; between awaits the
//! in-memory state is exclusively owned by the run. Order is fixed:
//! repair → backfill → index → push (creates, then updates) → snapshot →
//! pull (projects, sections, tasks) → back-links → missing-remote →
//! archive transitions → token persist.
//!
//! Per-item failures are caught and counted; only snapshot/auth failures and
//! broken vault primitives abort the run.

mod links;
mod missing;
pub(crate) mod pull;
mod push;

use crate::archive;
use crate::backfill;
use crate::index::VaultIndex;
use crate::props::repair_signature_lines;
use crate::remote::{RemoteClient, RemoteError};
use crate::settings::Settings;
use crate::vault::{Vault, VaultError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};
use vault_fs::FileSystem;

/// How many activity-log entries to consult for deletion classification.
const RECENTLY_DELETED_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),
}

pub type Result<T> = std::result::Result<T, RunError>;

/// Counters and warnings for one run; logged once at the end.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Signature lines repaired
    pub repaired: usize,
    /// Vault uuids back-filled
    pub uuids_assigned: usize,
    /// Remote tasks created from local notes
    pub created_remote: usize,
    /// Remote tasks updated from dirty local notes
    pub updated_remote: usize,
    /// Task notes created from the snapshot
    pub imported_new: usize,
    /// Task notes updated from the snapshot
    pub imported_updated: usize,
    /// Task files renamed or moved
    pub relocated: usize,
    /// Notes handled by missing-remote classification
    pub missing_handled: usize,
    /// Project/section notes moved by archive transitions
    pub archive_moves: usize,
    /// Items skipped as unchanged
    pub unchanged: usize,
    /// Per-item failures
    pub errors: usize,
    /// Duplicate remote task ids found in the vault
    pub duplicate_task_ids: Vec<String>,
}

impl RunSummary {
    pub fn has_warnings(&self) -> bool {
        !self.duplicate_task_ids.is_empty()
    }
}

/// One reconciliation engine instance, borrowed for a run.
pub struct Reconciler<'a, F: FileSystem, R: RemoteClient + ?Sized> {
    vault: &'a mut Vault<F>,
    remote: &'a R,
    settings: &'a Settings,
}

impl<'a, F: FileSystem, R: RemoteClient + ?Sized> Reconciler<'a, F, R> {
    pub fn new(vault: &'a mut Vault<F>, remote: &'a R, settings: &'a Settings) -> Self {
        Self {
            vault,
            remote,
            settings,
        }
    }

    /// Run one full sync at the given instant.
    pub async fn run(&mut self, now: DateTime<Utc>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let settings = self.settings;

        // Phase 0: repair mangled signature lines, then stamp missing uuids
        summary.repaired = self.repair_signatures().await?;
        summary.uuids_assigned = backfill::assign_missing_uuids(self.vault, &settings.props).await?;

        // Phase 1: index the vault
        let mut index = VaultIndex::build(self.vault, &settings.props).await?;
        summary.duplicate_task_ids = index.duplicate_task_ids.clone();

        // Phase 2: push, creates strictly before updates
        push::dispatch_creates(self.vault, self.remote, settings, &mut index, now, &mut summary)
            .await?;
        push::dispatch_updates(self.vault, self.remote, settings, &index, &mut summary).await?;

        // Phase 3: pull. The snapshot is fetched after push so tasks created
        // this run appear in it; a fetch failure aborts the run.
        let snapshot = self.remote.fetch_snapshot().await?;
        let deleted_ids = match self
            .remote
            .fetch_recently_deleted_ids(RECENTLY_DELETED_LIMIT)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Activity log unavailable, treating no tasks as deleted: {}", e);
                HashSet::new()
            }
        };

        let ctx = pull::PullContext::build(&snapshot, settings);

        pull::ensure_project_notes(self.vault, settings, &mut index, &ctx, now, &mut summary)
            .await?;
        pull::ensure_section_notes(self.vault, settings, &mut index, &ctx, now, &mut summary)
            .await?;

        for &item in &ctx.import_items {
            if let Err(e) =
                pull::upsert_task(self.vault, settings, &mut index, &ctx, item, now, &mut summary)
                    .await
            {
                warn!("Failed to upsert task {}: {}", item.id, e);
                summary.errors += 1;
            }
        }

        // Phase 4: cross-links after all upserts settled
        links::apply(self.vault, settings, &index, &ctx, &mut summary).await?;

        // Phase 5: tasks that vanished from the active listing
        missing::apply(
            self.vault,
            settings,
            &mut index,
            &snapshot,
            &deleted_ids,
            &mut summary,
        )
        .await?;

        // Phase 6: archive/unarchive moves, on fresh indexes
        archive::apply_transitions(self.vault, settings, &mut index, &ctx, &mut summary).await?;

        self.vault.store_sync_token(&snapshot.sync_token).await?;

        info!(
            created = summary.created_remote,
            updated = summary.updated_remote,
            imported = summary.imported_new + summary.imported_updated,
            missing = summary.missing_handled,
            errors = summary.errors,
            "Sync run complete"
        );
        if summary.has_warnings() {
            warn!(
                "Duplicate remote task ids: {}",
                summary.duplicate_task_ids.join(", ")
            );
        }

        Ok(summary)
    }

    /// Scan every markdown file and repair malformed signature lines.
    async fn repair_signatures(&mut self) -> Result<usize> {
        let props = &self.settings.props;
        let mut repaired = 0;
        for path in self.vault.list_markdown_files().await? {
            if self
                .vault
                .process_raw(&path, |raw| repair_signature_lines(raw, props))
                .await?
            {
                repaired += 1;
            }
        }
        Ok(repaired)
    }
}
