//! End-to-end reconciliation scenarios against an in-memory vault and a
//! scripted remote.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use sync_core::remote::{
    CreateTask, RemoteClient, RemoteDue, RemoteError, RemoteItem, RemoteProject, RemoteSection,
    RemoteSnapshot, TaskPatch,
};
use sync_core::{Reconciler, RunSummary, Settings, Vault};
use vault_fs::{parse_frontmatter, FileSystem, InMemoryFs};

/// Scripted remote: a canned snapshot, plus logs of every write. Tasks
/// created during a run appear in the snapshot fetched afterwards, the way
/// the real service behaves with push ordered before pull.
struct MockRemote {
    base: RemoteSnapshot,
    recently_deleted: HashSet<String>,
    fail_updates: AtomicBool,
    created: Mutex<Vec<(String, CreateTask)>>,
    updates: Mutex<Vec<TaskPatch>>,
    next_id: AtomicU64,
}

impl MockRemote {
    fn new(base: RemoteSnapshot) -> Self {
        Self {
            base,
            recently_deleted: HashSet::new(),
            fail_updates: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    fn recorded_updates(&self) -> Vec<TaskPatch> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn fetch_snapshot(&self) -> Result<RemoteSnapshot, RemoteError> {
        let mut snapshot = self.base.clone();
        for (id, task) in self.created.lock().unwrap().iter() {
            snapshot.items.push(RemoteItem {
                id: id.clone(),
                content: task.content.clone(),
                description: task.description.clone().unwrap_or_default(),
                project_id: task.project_id.clone(),
                section_id: task.section_id.clone(),
                parent_id: task.parent_id.clone(),
                priority: task.priority.unwrap_or(1),
                due: match (&task.due_date, &task.due_string) {
                    (None, None) => None,
                    (date, string) => Some(RemoteDue {
                        date: date.clone(),
                        string: string.clone(),
                        is_recurring: false,
                    }),
                },
                labels: task.labels.clone(),
                ..Default::default()
            });
        }
        Ok(snapshot)
    }

    async fn fetch_recently_deleted_ids(&self, _limit: usize) -> Result<HashSet<String>, RemoteError> {
        Ok(self.recently_deleted.clone())
    }

    async fn create_task(&self, task: &CreateTask) -> Result<String, RemoteError> {
        let id = format!("N{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created.lock().unwrap().push((id.clone(), task.clone()));
        Ok(id)
    }

    async fn update_task(&self, patch: &TaskPatch) -> Result<(), RemoteError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("connection reset".into()));
        }
        self.updates.lock().unwrap().push(patch.clone());
        Ok(())
    }
}

fn item(id: &str, content: &str, project_id: Option<&str>) -> RemoteItem {
    RemoteItem {
        id: id.to_string(),
        content: content.to_string(),
        project_id: project_id.map(str::to_string),
        priority: 1,
        ..Default::default()
    }
}

fn project(id: &str, name: &str) -> RemoteProject {
    RemoteProject {
        id: id.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

fn snapshot(
    items: Vec<RemoteItem>,
    projects: Vec<RemoteProject>,
    sections: Vec<RemoteSection>,
) -> RemoteSnapshot {
    RemoteSnapshot {
        items,
        projects,
        sections,
        user_id: "U1".to_string(),
        sync_token: "tok-1".to_string(),
    }
}

fn test_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
}

async fn run(
    fs: &Arc<InMemoryFs>,
    remote: &MockRemote,
    settings: &Settings,
) -> (Vault<Arc<InMemoryFs>>, RunSummary) {
    let mut vault = Vault::new(Arc::clone(fs));
    let summary = Reconciler::new(&mut vault, remote, settings)
        .run(test_now())
        .await
        .expect("run should succeed");
    (vault, summary)
}

async fn frontmatter_value(fs: &Arc<InMemoryFs>, path: &str, key: &str) -> Option<serde_json::Value> {
    let raw = String::from_utf8(fs.read(path).await.unwrap()).unwrap();
    parse_frontmatter(&raw)
        .frontmatter
        .and_then(|fm| fm.get(key).cloned())
}

fn is_hex8(value: &serde_json::Value) -> bool {
    value
        .as_str()
        .map(|s| s.len() == 8 && s.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

// Scenario 1: first import of one task.
#[tokio::test]
async fn first_import_of_one_task() {
    let fs = Arc::new(InMemoryFs::new());
    let remote = MockRemote::new(snapshot(
        vec![item("A1", "Buy milk", Some("P1"))],
        vec![project("P1", "Personal")],
        vec![],
    ));
    let settings = Settings::default();

    let (_, summary) = run(&fs, &remote, &settings).await;

    assert_eq!(summary.imported_new, 1);
    assert!(fs.exists("Tasks/Buy milk.md").await.unwrap());

    let get = |key: &'static str| frontmatter_value(&fs, "Tasks/Buy milk.md", key);
    assert_eq!(get("todoist_id").await.unwrap(), serde_json::json!("A1"));
    assert_eq!(get("status").await.unwrap(), serde_json::json!("Open"));
    assert_eq!(get("sync_status").await.unwrap(), serde_json::json!("synced"));
    assert!(is_hex8(&get("import_signature").await.unwrap()));
    let uuid = get("uuid").await.unwrap();
    assert!(!uuid.as_str().unwrap().is_empty());
}

// Scenario 2: crash between create and confirm. The file already carries the
// idempotency mark; the next run must not re-create, and the pull
// assimilates the remote row.
#[tokio::test]
async fn crash_between_create_and_confirm() {
    let fs = Arc::new(InMemoryFs::new());
    fs.write(
        "Tasks/New errand.md",
        b"---\ntitle: New errand\ntodoist_sync: true\ntodoist_pending_id: \"A2\"\n---\n",
    )
    .await
    .unwrap();

    let remote = MockRemote::new(snapshot(
        vec![item("A2", "New errand", None)],
        vec![],
        vec![],
    ));
    let settings = Settings::default();

    let (_, _) = run(&fs, &remote, &settings).await;

    // No re-creation happened
    assert_eq!(remote.created_count(), 0);

    let get = |key: &'static str| frontmatter_value(&fs, "Tasks/New errand.md", key);
    assert_eq!(get("todoist_id").await.unwrap(), serde_json::json!("A2"));
    assert!(get("todoist_pending_id").await.is_none());
    assert_eq!(get("sync_status").await.unwrap(), serde_json::json!("synced"));
}

// Round trip: a sync-flagged local note is dispatched and observed through
// the next pull with identical content on both sides.
#[tokio::test]
async fn local_create_round_trips() {
    let fs = Arc::new(InMemoryFs::new());
    fs.write(
        "Tasks/Water plants.md",
        b"---\ntitle: Water plants\ndue_date: \"2026-04-03\"\ntodoist_sync: true\n---\nRemember the balcony.\n",
    )
    .await
    .unwrap();

    let remote = MockRemote::new(snapshot(vec![], vec![], vec![]));
    let settings = Settings::default();

    let (_, summary) = run(&fs, &remote, &settings).await;

    assert_eq!(summary.created_remote, 1);
    assert_eq!(remote.created_count(), 1);
    let (id, payload) = remote.created.lock().unwrap()[0].clone();
    assert_eq!(payload.content, "Water plants");
    assert_eq!(payload.due_date.as_deref(), Some("2026-04-03"));

    let get = |key: &'static str| frontmatter_value(&fs, "Tasks/Water plants.md", key);
    assert_eq!(get("todoist_id").await.unwrap(), serde_json::json!(id));
    assert_eq!(get("sync_status").await.unwrap(), serde_json::json!("synced"));
    assert!(get("todoist_pending_id").await.is_none());
    assert_eq!(
        get("title").await.unwrap(),
        serde_json::json!("Water plants")
    );
    // The body is user-owned and untouched
    let raw = String::from_utf8(fs.read("Tasks/Water plants.md").await.unwrap()).unwrap();
    assert!(raw.ends_with("Remember the balcony.\n"));
}

// Scenario 3: conflict with local-wins. The push fails this run (network),
// so the note is still dirty when the pull sees a remote section change.
#[tokio::test]
async fn conflict_local_wins_preserves_user_fields() {
    let fs = Arc::new(InMemoryFs::new());
    fs.write(
        "Tasks/Call mom.md",
        b"---\ntitle: Call mom!\nstatus: Open\ntodoist_id: \"A3\"\nsync_status: dirty_local\nimport_signature: \"00000000\"\nsync_signature: \"11111111\"\ntodoist_sync: true\n---\n",
    )
    .await
    .unwrap();

    let mut remote_item = item("A3", "Call mom", Some("P1"));
    remote_item.section_id = Some("S7".to_string());
    let remote = MockRemote::new(snapshot(
        vec![remote_item],
        vec![project("P1", "Personal")],
        vec![RemoteSection {
            id: "S7".to_string(),
            name: "Family".to_string(),
            project_id: "P1".to_string(),
            ..Default::default()
        }],
    ));
    remote.fail_updates.store(true, Ordering::SeqCst);

    let settings = Settings::default();
    let (_, _) = run(&fs, &remote, &settings).await;

    let get = |key: &'static str| frontmatter_value(&fs, "Tasks/Call mom.md", key);
    // Remote-owned metadata landed
    assert_eq!(
        get("todoist_section_id").await.unwrap(),
        serde_json::json!("S7")
    );
    assert!(is_hex8(&get("import_signature").await.unwrap()));
    assert_ne!(
        get("import_signature").await.unwrap(),
        serde_json::json!("00000000")
    );
    // User-editable fields did not move
    assert_eq!(get("title").await.unwrap(), serde_json::json!("Call mom!"));
    assert_eq!(get("status").await.unwrap(), serde_json::json!("Open"));
    assert_eq!(
        get("sync_status").await.unwrap(),
        serde_json::json!("dirty_local")
    );

    // Next run, with the network back, the local title goes out
    remote.fail_updates.store(false, Ordering::SeqCst);
    let (_, _) = run(&fs, &remote, &settings).await;
    let updates = remote.recorded_updates();
    assert!(updates.iter().any(|p| p.id == "A3"
        && p.content == sync_core::remote::Patch::Set("Call mom!".to_string())));
}

// Scenario 4: recurring completion on the remote side appends the previous
// due date exactly once, even when the engine runs twice.
#[tokio::test]
async fn recurring_completion_appends_previous_due_once() {
    let fs = Arc::new(InMemoryFs::new());
    fs.write(
        "Tasks/Water the garden.md",
        b"---\ntitle: Water the garden\ntodoist_id: \"A5\"\ndue_date: \"2026-03-02\"\nrecurring: true\nrecurrence: every week\nsync_status: synced\nimport_signature: \"00000000\"\ntodoist_sync: true\n---\n",
    )
    .await
    .unwrap();

    let mut remote_item = item("A5", "Water the garden", Some("P1"));
    remote_item.due = Some(RemoteDue {
        date: Some("2026-03-09".to_string()),
        string: Some("every week".to_string()),
        is_recurring: true,
    });
    let remote = MockRemote::new(snapshot(
        vec![remote_item],
        vec![project("P1", "Garden")],
        vec![],
    ));
    let settings = Settings::default();

    let (_, _) = run(&fs, &remote, &settings).await;
    let (_, _) = run(&fs, &remote, &settings).await;

    let get = |key: &'static str| frontmatter_value(&fs, "Tasks/Water the garden.md", key);
    assert_eq!(
        get("due_date").await.unwrap(),
        serde_json::json!("2026-03-09")
    );
    assert_eq!(
        get("complete_instances").await.unwrap(),
        serde_json::json!(["2026-03-02"])
    );
    // The recurrence rule was written once and kept verbatim
    assert_eq!(
        get("recurrence").await.unwrap(),
        serde_json::json!("every week")
    );
}

// Scenario 5: project rename with subfolders moves the folder, the tasks in
// it, and repoints the wikilinks.
#[tokio::test]
async fn project_rename_moves_folder_and_repoints_links() {
    let fs = Arc::new(InMemoryFs::new());
    fs.write(
        "Tasks/Home/_.md",
        b"---\nproject: Home\ntodoist_project_id: \"P3\"\nuuid: pu-1\n---\n",
    )
    .await
    .unwrap();
    fs.write(
        "Tasks/Home/Fix sink.md",
        b"---\ntitle: Fix sink\ntodoist_id: \"T1\"\ntodoist_project_id: \"P3\"\nproject_link: \"[[Tasks/Home/_|Home]]\"\nsync_status: synced\nimport_signature: \"00000000\"\ntodoist_sync: true\n---\n",
    )
    .await
    .unwrap();

    let remote = MockRemote::new(snapshot(
        vec![item("T1", "Fix sink", Some("P3"))],
        vec![project("P3", "Household")],
        vec![],
    ));
    let mut settings = Settings::default();
    settings.use_project_subfolders = true;

    let (_, _) = run(&fs, &remote, &settings).await;

    assert!(fs.exists("Tasks/Household/_.md").await.unwrap());
    assert!(fs.exists("Tasks/Household/Fix sink.md").await.unwrap());
    assert!(!fs.exists("Tasks/Home").await.unwrap());

    assert_eq!(
        frontmatter_value(&fs, "Tasks/Household/_.md", "project")
            .await
            .unwrap(),
        serde_json::json!("Household")
    );
    assert_eq!(
        frontmatter_value(&fs, "Tasks/Household/Fix sink.md", "project_link")
            .await
            .unwrap(),
        serde_json::json!("[[Tasks/Household/_|Household]]")
    );
}

// Scenario 6: duplicate remote id. One primary file is updated, the other is
// untouched, and the run reports the duplicate.
#[tokio::test]
async fn duplicate_remote_id_updates_primary_only() {
    let fs = Arc::new(InMemoryFs::new());
    let original_b = b"---\ntitle: Copy B\ntodoist_id: \"A4\"\nuuid: ub\n---\n";
    fs.write(
        "Tasks/Copy A.md",
        b"---\ntitle: Copy A\ntodoist_id: \"A4\"\nuuid: ua\nsync_status: synced\ntodoist_sync: true\n---\n",
    )
    .await
    .unwrap();
    fs.write("Tasks/Copy B.md", original_b).await.unwrap();

    let remote = MockRemote::new(snapshot(
        vec![item("A4", "Copy A", None)],
        vec![],
        vec![],
    ));
    let settings = Settings::default();

    let (_, summary) = run(&fs, &remote, &settings).await;

    assert_eq!(summary.duplicate_task_ids, vec!["A4".to_string()]);

    // Primary (first seen in sorted order) was reconciled
    assert!(
        frontmatter_value(&fs, "Tasks/Copy A.md", "last_imported")
            .await
            .is_some()
    );
    // The duplicate is byte-for-byte untouched
    let after = fs.read("Tasks/Copy B.md").await.unwrap();
    assert_eq!(after, original_b.to_vec());
}

// A task that loses its parent on the remote has its link cleared in the
// same run.
#[tokio::test]
async fn parent_removed_clears_child_link() {
    let fs = Arc::new(InMemoryFs::new());
    fs.write(
        "Tasks/Child.md",
        b"---\ntitle: Child\ntodoist_id: \"C1\"\nparent_task: \"[[Tasks/Parent]]\"\nsync_status: synced\nimport_signature: \"00000000\"\ntodoist_sync: true\n---\n",
    )
    .await
    .unwrap();

    let remote = MockRemote::new(snapshot(vec![item("C1", "Child", None)], vec![], vec![]));
    let settings = Settings::default();

    let (_, _) = run(&fs, &remote, &settings).await;

    assert!(frontmatter_value(&fs, "Tasks/Child.md", "parent_task")
        .await
        .is_none());
}

// Parent/child back-links: the child points at the parent, the parent lists
// its children sorted.
#[tokio::test]
async fn parent_child_back_links_form_a_forest() {
    let fs = Arc::new(InMemoryFs::new());
    let mut child_a = item("C1", "Alpha subtask", None);
    child_a.parent_id = Some("P9".to_string());
    let mut child_b = item("C2", "Beta subtask", None);
    child_b.parent_id = Some("P9".to_string());
    let parent = item("P9", "Umbrella", None);

    let remote = MockRemote::new(snapshot(vec![parent, child_a, child_b], vec![], vec![]));
    let settings = Settings::default();

    let (_, _) = run(&fs, &remote, &settings).await;

    assert_eq!(
        frontmatter_value(&fs, "Tasks/Alpha subtask.md", "parent_task")
            .await
            .unwrap(),
        serde_json::json!("[[Tasks/Umbrella]]")
    );
    assert_eq!(
        frontmatter_value(&fs, "Tasks/Umbrella.md", "has_subtasks")
            .await
            .unwrap(),
        serde_json::json!(true)
    );
    assert_eq!(
        frontmatter_value(&fs, "Tasks/Umbrella.md", "subtask_count")
            .await
            .unwrap(),
        serde_json::json!(2)
    );
    let subtasks = frontmatter_value(&fs, "Tasks/Umbrella.md", "subtasks")
        .await
        .unwrap();
    let list: Vec<String> = subtasks
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    let mut sorted = list.clone();
    sorted.sort();
    assert_eq!(list, sorted);
}

// Missing-remote classification: absent from the active listing and not
// recently deleted means completed.
#[tokio::test]
async fn missing_task_is_classified_completed() {
    let fs = Arc::new(InMemoryFs::new());
    fs.write(
        "Tasks/Old chore.md",
        b"---\ntitle: Old chore\nstatus: Open\ntodoist_id: \"GONE\"\nsync_status: synced\ntodoist_sync: true\n---\n",
    )
    .await
    .unwrap();

    let remote = MockRemote::new(snapshot(vec![], vec![], vec![]));
    let settings = Settings::default();

    let (_, summary) = run(&fs, &remote, &settings).await;

    assert_eq!(summary.missing_handled, 1);
    let get = |key: &'static str| frontmatter_value(&fs, "Tasks/Old chore.md", key);
    assert_eq!(get("status").await.unwrap(), serde_json::json!("Done"));
    assert_eq!(get("done").await.unwrap(), serde_json::json!(true));
    assert_eq!(
        get("sync_status").await.unwrap(),
        serde_json::json!("archived_remote")
    );
}

// Missing-remote with deletion: stop-syncing strips the remote id so the
// note becomes local-only.
#[tokio::test]
async fn deleted_task_with_stop_syncing_unlinks_note() {
    let fs = Arc::new(InMemoryFs::new());
    fs.write(
        "Tasks/Abandoned.md",
        b"---\ntitle: Abandoned\ntodoist_id: \"D1\"\nsync_status: synced\ntodoist_sync: true\n---\n",
    )
    .await
    .unwrap();

    let mut remote = MockRemote::new(snapshot(vec![], vec![], vec![]));
    remote.recently_deleted.insert("D1".to_string());
    let mut settings = Settings::default();
    settings.deleted_mode = sync_core::MissingRemoteMode::StopSyncing;

    let (_, _) = run(&fs, &remote, &settings).await;

    let get = |key: &'static str| frontmatter_value(&fs, "Tasks/Abandoned.md", key);
    assert!(get("todoist_id").await.is_none());
    assert_eq!(get("deleted").await.unwrap(), serde_json::json!(true));
    assert_eq!(
        get("sync_status").await.unwrap(),
        serde_json::json!("deleted_remote")
    );
}

// Idempotence: a second run against an unchanged remote leaves every file
// byte-identical (the clock is pinned, so imported-at stamps agree too).
#[tokio::test]
async fn second_run_is_byte_identical() {
    let fs = Arc::new(InMemoryFs::new());
    let mut due_item = item("A1", "Buy milk", Some("P1"));
    due_item.due = Some(RemoteDue {
        date: Some("2026-04-07".to_string()),
        string: Some("next tuesday".to_string()),
        is_recurring: false,
    });
    let remote = MockRemote::new(snapshot(
        vec![due_item, item("A2", "Sweep porch", Some("P1"))],
        vec![project("P1", "Personal")],
        vec![],
    ));
    let settings = Settings::default();

    let (vault, _) = run(&fs, &remote, &settings).await;
    let files = vault.list_markdown_files().await.unwrap();
    let mut before = Vec::new();
    for path in &files {
        before.push(fs.read(path).await.unwrap());
    }

    let (vault, _) = run(&fs, &remote, &settings).await;
    let files_after = vault.list_markdown_files().await.unwrap();
    assert_eq!(files, files_after);
    for (path, expected) in files.iter().zip(before) {
        assert_eq!(fs.read(path).await.unwrap(), expected, "changed: {}", path);
    }
}

// Archive transition: an archived project's folder moves to the archive
// folder and comes back to a computed path on unarchive.
#[tokio::test]
async fn project_archive_and_unarchive_round_trip() {
    let fs = Arc::new(InMemoryFs::new());
    fs.write(
        "Tasks/Garage/_.md",
        b"---\nproject: Garage\ntodoist_project_id: \"P8\"\nuuid: pg\n---\n",
    )
    .await
    .unwrap();
    fs.write(
        "Tasks/Garage/Sort tools.md",
        b"---\ntitle: Sort tools\ntodoist_id: \"G1\"\ntodoist_project_id: \"P8\"\nsync_status: synced\ntodoist_sync: true\n---\n",
    )
    .await
    .unwrap();

    let mut archived = project("P8", "Garage");
    archived.is_archived = true;
    // The archived project's item is gone from the active listing too; keep
    // the task known so it is not classified missing in this test.
    let remote = MockRemote::new(snapshot(
        vec![item("G1", "Sort tools", Some("P8"))],
        vec![archived],
        vec![],
    ));
    let mut settings = Settings::default();
    settings.use_project_subfolders = true;

    let (_, summary) = run(&fs, &remote, &settings).await;
    assert_eq!(summary.archive_moves, 1);
    assert!(fs.exists("Archive/Projects/Garage/_.md").await.unwrap());
    assert!(
        fs.exists("Archive/Projects/Garage/Sort tools.md")
            .await
            .unwrap()
    );
    assert!(!fs.exists("Tasks/Garage").await.unwrap());

    // Unarchive: the note moves back to its computed active path
    let remote = MockRemote::new(snapshot(
        vec![item("G1", "Sort tools", Some("P8"))],
        vec![project("P8", "Garage")],
        vec![],
    ));
    let (_, _) = run(&fs, &remote, &settings).await;
    assert!(fs.exists("Tasks/Garage/_.md").await.unwrap());
    assert!(!fs.exists("Archive/Projects/Garage").await.unwrap());
}

// Stale dirty mark: content matches the last-pushed fingerprint, so no
// update is dispatched and the mark resets.
#[tokio::test]
async fn stale_dirty_mark_resets_without_push() {
    let fs = Arc::new(InMemoryFs::new());

    // First run imports the task and records both signatures
    let remote = MockRemote::new(snapshot(vec![item("A6", "Rake leaves", None)], vec![], vec![]));
    let settings = Settings::default();
    let (_, _) = run(&fs, &remote, &settings).await;

    // Mark it dirty without changing anything
    let raw = String::from_utf8(fs.read("Tasks/Rake leaves.md").await.unwrap()).unwrap();
    let marked = raw.replace("sync_status: synced", "sync_status: dirty_local");
    fs.write("Tasks/Rake leaves.md", marked.as_bytes())
        .await
        .unwrap();

    let (_, summary) = run(&fs, &remote, &settings).await;

    assert!(remote.recorded_updates().is_empty());
    assert!(summary.unchanged >= 1);
    assert_eq!(
        frontmatter_value(&fs, "Tasks/Rake leaves.md", "sync_status")
            .await
            .unwrap(),
        serde_json::json!("synced")
    );
}
