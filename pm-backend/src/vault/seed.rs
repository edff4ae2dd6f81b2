//! First-run bootstrap of an empty vault.
//!
//! Seeding happens only when the vault root does not exist at all. An existing
//! root is never touched, even if it is half empty, so user edits are never
//! overwritten. The seed is staged in a hidden sibling directory and renamed
//! into place, so a crash mid-seed leaves no partial vault root behind.

use std::fs;
use std::path::Path;

use strum::IntoEnumIterator;

use super::error::{VaultError, VaultResult};
use super::frontmatter;
use super::layout::{dir_name, filename_for, VaultLayout};
use super::schema::{now_timestamp, Board, Entity, EntityKind, Epic, Project, Task};

pub const DEFAULT_BOARD_ID: &str = "default";
pub const DEFAULT_COLUMNS: [&str; 6] = ["Inbox", "Backlog", "Ready", "In Progress", "Review", "Done"];

const STAGING_DIR: &str = ".vault-seed";
const SAMPLE_PROJECT_ID: &str = "getting-started";
const SAMPLE_EPIC_ID: &str = "first-steps";
const SAMPLE_COLUMN: &str = "Backlog";

/// Seed the vault if its root is absent. Returns whether anything was written.
pub fn ensure_seeded(layout: &VaultLayout) -> VaultResult<bool> {
    let vault_root = layout.vault_root();
    let exists = vault_root
        .try_exists()
        .map_err(|e| VaultError::io(vault_root, e))?;
    if exists {
        log::debug!("[SEED] Vault already present at {}", vault_root.display());
        return Ok(false);
    }

    let parent = vault_root.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;

    let staging = parent.join(STAGING_DIR);
    if staging.exists() {
        log::warn!("[SEED] Discarding stale staging dir {}", staging.display());
        fs::remove_dir_all(&staging).map_err(|e| VaultError::io(&staging, e))?;
    }

    if let Err(e) = write_seed(&staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    fs::rename(&staging, vault_root).map_err(|e| VaultError::io(vault_root, e))?;
    log::info!("[SEED] Seeded new vault at {}", vault_root.display());
    Ok(true)
}

fn write_seed(staging: &Path) -> VaultResult<()> {
    for kind in EntityKind::iter() {
        let dir = staging.join(dir_name(kind));
        fs::create_dir_all(&dir).map_err(|e| VaultError::io(&dir, e))?;
    }

    let created = now_timestamp();
    let (board, project, epic, tasks) = default_entities(&created);

    write_entity(staging, &board)?;
    write_entity(staging, &project)?;
    write_entity(staging, &epic)?;
    for task in &tasks {
        write_entity(staging, task)?;
    }
    Ok(())
}

fn write_entity<E: Entity>(staging: &Path, entity: &E) -> VaultResult<()> {
    let raw = frontmatter::serialize(&entity.encode(), entity.body())?;
    let path = staging
        .join(dir_name(E::KIND))
        .join(filename_for(entity.id(), E::KIND));
    fs::write(&path, raw).map_err(|e| VaultError::io(&path, e))
}

fn default_entities(created: &str) -> (Board, Project, Epic, Vec<Task>) {
    let board = Board {
        id: DEFAULT_BOARD_ID.to_string(),
        title: "Default Board".to_string(),
        columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
    };

    let project = Project {
        id: SAMPLE_PROJECT_ID.to_string(),
        title: "Getting Started".to_string(),
        owner: None,
        description: Some("A sample project. Rename it or create your own.".to_string()),
        created: Some(created.to_string()),
        updated: None,
    };

    let epic = Epic {
        id: SAMPLE_EPIC_ID.to_string(),
        title: "First Steps".to_string(),
        project_id: Some(SAMPLE_PROJECT_ID.to_string()),
        owner: None,
        description: Some("Learn how the vault is laid out.".to_string()),
        created: Some(created.to_string()),
        updated: None,
    };

    let sample_task = |id: &str, title: &str, body: &str| Task {
        id: id.to_string(),
        title: title.to_string(),
        board: DEFAULT_BOARD_ID.to_string(),
        column: SAMPLE_COLUMN.to_string(),
        tags: ["sample".to_string()].into_iter().collect(),
        due: None,
        created: created.to_string(),
        updated: None,
        project_id: Some(SAMPLE_PROJECT_ID.to_string()),
        epic_id: Some(SAMPLE_EPIC_ID.to_string()),
        owner: None,
        as_a: None,
        i_want: None,
        so_that: None,
        acceptance_criteria: Vec::new(),
        body: body.to_string(),
    };

    let tasks = vec![
        sample_task(
            "welcome-to-your-vault",
            "Welcome to your vault",
            "Every card is a markdown file under `vault/tasks/`.\nEdit it in any editor and reload.\n",
        ),
        sample_task(
            "move-a-card",
            "Move a card to another column",
            "Moving a card rewrites its `column` field and stamps `updated`.\n",
        ),
    ];

    (board, project, epic, tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
        let mut files = BTreeMap::new();
        for kind in EntityKind::iter() {
            let dir = root.join(dir_name(kind));
            if let Ok(entries) = fs::read_dir(&dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    files.insert(path.clone(), fs::read_to_string(&path).unwrap());
                }
            }
        }
        files
    }

    #[test]
    fn test_seeds_fresh_vault() {
        let dir = tempdir().unwrap();
        let layout = VaultLayout::new(dir.path());

        assert!(ensure_seeded(&layout).unwrap());

        let files = snapshot(layout.vault_root());
        assert_eq!(files.len(), 5);
        assert!(layout.path_for(EntityKind::Board, DEFAULT_BOARD_ID).exists());
        assert_eq!(layout.list_files(EntityKind::Task).unwrap().len(), 2);
        assert!(!dir.path().join(STAGING_DIR).exists());

        let raw = fs::read_to_string(layout.path_for(EntityKind::Epic, SAMPLE_EPIC_ID)).unwrap();
        let doc = frontmatter::parse(&raw).unwrap();
        let epic = Epic::decode(&doc.header, &doc.body).unwrap();
        assert_eq!(epic.project_id.as_deref(), Some(SAMPLE_PROJECT_ID));
    }

    #[test]
    fn test_second_run_writes_nothing() {
        let dir = tempdir().unwrap();
        let layout = VaultLayout::new(dir.path());
        ensure_seeded(&layout).unwrap();

        // user edits one file and deletes another
        let board = layout.path_for(EntityKind::Board, DEFAULT_BOARD_ID);
        fs::write(&board, "---\nid: default\ntitle: Mine\ncolumns: [Todo]\n---\n").unwrap();
        fs::remove_file(layout.path_for(EntityKind::Project, SAMPLE_PROJECT_ID)).unwrap();
        let before = snapshot(layout.vault_root());

        assert!(!ensure_seeded(&layout).unwrap());
        assert_eq!(snapshot(layout.vault_root()), before);
    }

    #[test]
    fn test_existing_empty_root_is_not_repaired() {
        let dir = tempdir().unwrap();
        let layout = VaultLayout::new(dir.path());
        fs::create_dir_all(layout.vault_root()).unwrap();

        assert!(!ensure_seeded(&layout).unwrap());
        assert!(snapshot(layout.vault_root()).is_empty());
    }

    #[test]
    fn test_stale_staging_dir_is_discarded() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join(STAGING_DIR).join("tasks");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("leftover.md"), "junk").unwrap();

        let layout = VaultLayout::new(dir.path());
        assert!(ensure_seeded(&layout).unwrap());
        assert!(!layout.directory_for(EntityKind::Task).join("leftover.md").exists());
    }
}
