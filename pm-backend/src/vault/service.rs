//! Async handle over a `VaultStore`.
//!
//! Every call runs on tokio's blocking pool under one lock, so file I/O never
//! blocks executor threads and mutations are serialized. A call that has
//! started runs to completion even if its caller goes away.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use pm_types::{CreateEpicPayload, CreateProjectPayload, CreateStoryPayload};

use super::error::{VaultError, VaultResult};
use super::projection::BoardWithTasks;
use super::schema::{Board, Epic, Project, Task};
use super::store::{IntegrityReport, LoadDiagnostic, VaultStore};

/// Snapshot of the last load's problems
#[derive(Debug, Clone, serde::Serialize)]
pub struct VaultDiagnostics {
    pub skipped: Vec<LoadDiagnostic>,
    pub integrity: IntegrityReport,
}

#[derive(Clone)]
pub struct VaultService {
    store: Arc<Mutex<VaultStore>>,
}

impl VaultService {
    pub fn new(store: VaultStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Open (and seed if needed) the vault under `root` off the executor
    pub async fn open(root: PathBuf) -> VaultResult<Self> {
        let store = tokio::task::spawn_blocking(move || VaultStore::open(root))
            .await
            .map_err(|e| join_error("open", e))??;
        Ok(Self::new(store))
    }

    /// Run `f` against the locked store; `op` names the call in errors
    async fn with_store<T, F>(&self, op: &'static str, f: F) -> VaultResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut VaultStore) -> VaultResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut guard = store.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| join_error(op, e))?
    }

    pub async fn vault_path(&self) -> VaultResult<PathBuf> {
        self.with_store("vault_path", |s| Ok(s.vault_path().to_path_buf())).await
    }

    pub async fn reload(&self) -> VaultResult<VaultDiagnostics> {
        self.with_store("reload", |s| {
            s.load()?;
            Ok(snapshot_diagnostics(s))
        })
        .await
    }

    pub async fn diagnostics(&self) -> VaultResult<VaultDiagnostics> {
        self.with_store("diagnostics", |s| Ok(snapshot_diagnostics(s))).await
    }

    pub async fn list_boards(&self) -> VaultResult<Vec<Board>> {
        self.with_store("list_boards", |s| Ok(s.list_boards())).await
    }

    pub async fn list_tasks(&self, board_id: Option<String>) -> VaultResult<Vec<Task>> {
        self.with_store("list_tasks", move |s| Ok(s.list_tasks(board_id.as_deref())))
            .await
    }

    pub async fn list_projects(&self) -> VaultResult<Vec<Project>> {
        self.with_store("list_projects", |s| Ok(s.list_projects())).await
    }

    pub async fn list_epics(&self, project_id: Option<String>) -> VaultResult<Vec<Epic>> {
        self.with_store("list_epics", move |s| Ok(s.list_epics(project_id.as_deref())))
            .await
    }

    pub async fn get_board_with_tasks(&self, board_id: String) -> VaultResult<BoardWithTasks> {
        self.with_store("get_board_with_tasks", move |s| s.get_board_with_tasks(&board_id))
            .await
    }

    pub async fn create_project(&self, payload: CreateProjectPayload) -> VaultResult<Project> {
        self.with_store("create_project", move |s| s.create_project(&payload)).await
    }

    pub async fn create_epic(&self, payload: CreateEpicPayload) -> VaultResult<Epic> {
        self.with_store("create_epic", move |s| s.create_epic(&payload)).await
    }

    pub async fn create_story(&self, payload: CreateStoryPayload) -> VaultResult<Task> {
        self.with_store("create_story", move |s| s.create_story(&payload)).await
    }

    pub async fn update_task_column(&self, task_id: String, column: String) -> VaultResult<Task> {
        self.with_store("update_task_column", move |s| s.update_task_column(&task_id, &column))
            .await
    }
}

fn snapshot_diagnostics(store: &VaultStore) -> VaultDiagnostics {
    VaultDiagnostics {
        skipped: store.diagnostics().to_vec(),
        integrity: store.integrity().clone(),
    }
}

fn join_error(op: &'static str, e: tokio::task::JoinError) -> VaultError {
    let message = if e.is_panic() {
        "task panicked".to_string()
    } else {
        e.to_string()
    };
    log::error!("[VAULT] {} did not complete: {}", op, message);
    VaultError::Internal { op, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_service_round_trip() {
        let dir = tempdir().unwrap();
        let service = VaultService::open(dir.path().to_path_buf()).await.unwrap();

        let task = service
            .create_story(CreateStoryPayload {
                title: "From the service".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let moved = service
            .update_task_column(task.id.clone(), "Done".to_string())
            .await
            .unwrap();
        assert_eq!(moved.column, "Done");

        let board = service
            .get_board_with_tasks("default".to_string())
            .await
            .unwrap();
        let done = board.columns.iter().find(|c| c.name == "Done").unwrap();
        assert_eq!(done.tasks.len(), 1);

        assert_eq!(
            service.vault_path().await.unwrap(),
            dir.path().join("vault")
        );
    }

    #[tokio::test]
    async fn test_reload_picks_up_external_edits() {
        let dir = tempdir().unwrap();
        let service = VaultService::open(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(service.list_projects().await.unwrap().len(), 1);

        let projects = dir.path().join("vault").join("projects");
        std::fs::write(
            projects.join("hand-made.md"),
            "---\nid: hand-made\ntitle: Hand made\n---\n",
        )
        .unwrap();
        std::fs::write(projects.join("broken.md"), "no header").unwrap();

        // reads serve the snapshot until reload
        assert_eq!(service.list_projects().await.unwrap().len(), 1);

        let diagnostics = service.reload().await.unwrap();
        assert_eq!(diagnostics.skipped.len(), 1);
        assert_eq!(service.list_projects().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_ids() {
        let dir = tempdir().unwrap();
        let service = VaultService::open(dir.path().to_path_buf()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .create_project(CreateProjectPayload {
                            title: "Parallel".to_string(),
                            ..Default::default()
                        })
                        .await
                        .unwrap()
                        .id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[tokio::test]
    async fn test_panicking_call_reports_operation_and_releases_lock() {
        let dir = tempdir().unwrap();
        let service = VaultService::open(dir.path().to_path_buf()).await.unwrap();

        let err = service
            .with_store::<(), _>("list_boards", |_| panic!("boom"))
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "internal");
        match err {
            VaultError::Internal { op, message } => {
                assert_eq!(op, "list_boards");
                assert_eq!(message, "task panicked");
            }
            other => panic!("expected internal error, got {other:?}"),
        }

        assert_eq!(service.list_tasks(None).await.unwrap().len(), 2);
    }
}
