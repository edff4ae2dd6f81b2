//! In-memory index over the vault's entity files
//!
//! The files on disk are the only durable state; the index is a cache rebuilt
//! by `load()`. Loading is fail-soft per file: a file that cannot be parsed or
//! decoded is skipped and reported in `diagnostics()`. Mutations are fail-fast:
//! every check runs before the single file write, so a rejected call leaves
//! the file set untouched.
//!
//! Column policy: a task whose column is not declared by its board is kept and
//! shown in the board's `Unassigned` bucket. Moves and creates into undeclared
//! columns are accepted under the same rule.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use pm_types::{CreateEpicPayload, CreateProjectPayload, CreateStoryPayload};
use serde::Serialize;

use super::error::{ValidationError, VaultError, VaultResult};
use super::frontmatter::{self, Header};
use super::layout::{self, VaultLayout};
use super::projection::{self, BoardWithTasks};
use super::schema::{
    clean_text_field, is_recognizable_date, now_timestamp, Board, Entity, EntityKind, Epic,
    Project, Task,
};
use super::seed::{self, DEFAULT_BOARD_ID};

/// Column new stories land in when the board declares it
pub const PREFERRED_DEFAULT_COLUMN: &str = "Backlog";
const STORY_TAG: &str = "story";

/// A vault file left out of the index, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadDiagnostic {
    pub kind: EntityKind,
    pub path: PathBuf,
    pub message: String,
}

/// A reference to an entity that does not exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingRef {
    pub kind: EntityKind,
    pub id: String,
    pub field: &'static str,
    pub target: String,
}

impl DanglingRef {
    fn new(kind: EntityKind, id: &str, field: &'static str, target: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            field,
            target: target.to_string(),
        }
    }
}

/// Result of the referential-integrity pass over the last load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Tasks whose board does not exist; never projected
    pub orphaned_tasks: Vec<String>,
    /// Tasks whose column their board does not declare
    pub unplaced_tasks: Vec<String>,
    pub dangling_refs: Vec<DanglingRef>,
}

#[derive(Debug, Default)]
struct VaultIndex {
    boards: BTreeMap<String, Board>,
    tasks: BTreeMap<String, Task>,
    projects: BTreeMap<String, Project>,
    epics: BTreeMap<String, Epic>,
    /// Task ids per existing board; `projection::build` orders them
    tasks_by_board: BTreeMap<String, Vec<String>>,
    /// File each indexed entity was read from or written to
    paths: HashMap<(EntityKind, String), PathBuf>,
}

pub struct VaultStore {
    layout: VaultLayout,
    index: VaultIndex,
    diagnostics: Vec<LoadDiagnostic>,
    integrity: IntegrityReport,
}

impl VaultStore {
    /// Open the vault under `root`, seeding it on first use, and load it.
    ///
    /// Fails only when the vault root itself cannot be created or read.
    pub fn open(root: impl AsRef<Path>) -> VaultResult<Self> {
        let layout = VaultLayout::new(root);
        seed::ensure_seeded(&layout)?;

        let mut store = Self {
            layout,
            index: VaultIndex::default(),
            diagnostics: Vec::new(),
            integrity: IntegrityReport::default(),
        };
        store.load()?;
        Ok(store)
    }

    pub fn vault_path(&self) -> &Path {
        self.layout.vault_root()
    }

    /// Files skipped by the last `load()`
    pub fn diagnostics(&self) -> &[LoadDiagnostic] {
        &self.diagnostics
    }

    pub fn integrity(&self) -> &IntegrityReport {
        &self.integrity
    }

    /// Rebuild the index from disk.
    ///
    /// Bad files are skipped and reported; the previous index is kept if the
    /// vault root cannot be read at all.
    pub fn load(&mut self) -> VaultResult<()> {
        let root = self.layout.vault_root();
        if !root.is_dir() {
            return Err(VaultError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "vault root is missing"),
            ));
        }

        let mut index = VaultIndex::default();
        let mut diagnostics = Vec::new();

        let boards = read_kind::<Board>(&self.layout, &mut diagnostics)?;
        insert_loaded(&mut index.boards, &mut index.paths, boards, &mut diagnostics);
        let tasks = read_kind::<Task>(&self.layout, &mut diagnostics)?;
        insert_loaded(&mut index.tasks, &mut index.paths, tasks, &mut diagnostics);
        let projects = read_kind::<Project>(&self.layout, &mut diagnostics)?;
        insert_loaded(&mut index.projects, &mut index.paths, projects, &mut diagnostics);
        let epics = read_kind::<Epic>(&self.layout, &mut diagnostics)?;
        insert_loaded(&mut index.epics, &mut index.paths, epics, &mut diagnostics);

        for diag in &diagnostics {
            log::warn!(
                "[VAULT] Skipped {} file {}: {}",
                diag.kind,
                diag.path.display(),
                diag.message
            );
        }

        self.index = index;
        self.diagnostics = diagnostics;
        self.rebuild_integrity();

        log::info!(
            "[VAULT] Loaded {} boards, {} tasks, {} projects, {} epics ({} skipped)",
            self.index.boards.len(),
            self.index.tasks.len(),
            self.index.projects.len(),
            self.index.epics.len(),
            self.diagnostics.len()
        );
        Ok(())
    }

    // =====================================================
    // Queries
    // =====================================================

    pub fn list_boards(&self) -> Vec<Board> {
        sorted_by_title(self.index.boards.values())
    }

    /// All tasks, or only those on `board_id` (orphans included when unfiltered)
    pub fn list_tasks(&self, board_id: Option<&str>) -> Vec<Task> {
        sorted_by_title(
            self.index
                .tasks
                .values()
                .filter(|t| board_id.map(|b| b == t.board).unwrap_or(true)),
        )
    }

    pub fn list_projects(&self) -> Vec<Project> {
        sorted_by_title(self.index.projects.values())
    }

    pub fn list_epics(&self, project_id: Option<&str>) -> Vec<Epic> {
        sorted_by_title(
            self.index
                .epics
                .values()
                .filter(|e| project_id.map(|p| e.project_id.as_deref() == Some(p)).unwrap_or(true)),
        )
    }

    #[cfg(test)]
    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.index.tasks.get(task_id)
    }

    pub fn get_board_with_tasks(&self, board_id: &str) -> VaultResult<BoardWithTasks> {
        let board = self
            .index
            .boards
            .get(board_id)
            .ok_or_else(|| VaultError::not_found(EntityKind::Board, board_id))?;

        let tasks = self
            .index
            .tasks_by_board
            .get(board_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.index.tasks.get(id));

        Ok(projection::build(board, tasks))
    }

    // =====================================================
    // Mutations
    // =====================================================

    pub fn create_project(&mut self, payload: &CreateProjectPayload) -> VaultResult<Project> {
        let mut errors = ValidationError::default();
        let title = required_input(&mut errors, "title", &payload.title);
        let owner = optional_input(&mut errors, "owner", payload.owner.as_deref());
        let description = optional_input(&mut errors, "description", payload.description.as_deref());
        errors.into_result()?;

        let project = Project {
            id: self.unique_id(EntityKind::Project, &title),
            title,
            owner,
            description,
            created: Some(now_timestamp()),
            updated: None,
        };

        let path = self.write_new(&project)?;
        self.index
            .paths
            .insert((EntityKind::Project, project.id.clone()), path);
        self.index.projects.insert(project.id.clone(), project.clone());

        log::info!("[VAULT] Created project {}", project.id);
        Ok(project)
    }

    pub fn create_epic(&mut self, payload: &CreateEpicPayload) -> VaultResult<Epic> {
        let mut errors = ValidationError::default();
        let title = required_input(&mut errors, "title", &payload.title);
        let owner = optional_input(&mut errors, "owner", payload.owner.as_deref());
        let description = optional_input(&mut errors, "description", payload.description.as_deref());
        let project_id = self.resolve_ref(
            &mut errors,
            "project_id",
            payload.project_id.as_deref(),
            |store, id| store.index.projects.contains_key(id),
        );
        errors.into_result()?;

        let epic = Epic {
            id: self.unique_id(EntityKind::Epic, &title),
            title,
            project_id,
            owner,
            description,
            created: Some(now_timestamp()),
            updated: None,
        };

        let path = self.write_new(&epic)?;
        self.index.paths.insert((EntityKind::Epic, epic.id.clone()), path);
        self.index.epics.insert(epic.id.clone(), epic.clone());
        self.rebuild_integrity();

        log::info!("[VAULT] Created epic {}", epic.id);
        Ok(epic)
    }

    /// Create a story task on a board (the `default` board when unspecified).
    pub fn create_story(&mut self, payload: &CreateStoryPayload) -> VaultResult<Task> {
        let mut errors = ValidationError::default();
        let title = required_input(&mut errors, "title", &payload.title);

        let board_id = match payload.board_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => DEFAULT_BOARD_ID.to_string(),
        };
        let board = self.index.boards.get(&board_id);
        if board.is_none() {
            errors.invalid("board_id", format!("unknown board `{}`", board_id));
        }

        let column = match optional_input(&mut errors, "column", payload.column.as_deref()) {
            Some(column) => column,
            None => board.map(default_column).unwrap_or_default(),
        };
        if let Some(board) = board {
            if column.is_empty() {
                errors.invalid("column", "board declares no columns");
            } else if !board.columns.contains(&column) {
                log::warn!(
                    "[VAULT] Story column `{}` is not declared on board {}; shown as unassigned",
                    column,
                    board.id
                );
            }
        }

        let project_id = self.resolve_ref(
            &mut errors,
            "project_id",
            payload.project_id.as_deref(),
            |store, id| store.index.projects.contains_key(id),
        );
        let epic_id = self.resolve_ref(
            &mut errors,
            "epic_id",
            payload.epic_id.as_deref(),
            |store, id| store.index.epics.contains_key(id),
        );
        if let (Some(project_id), Some(epic_id)) = (&project_id, &epic_id) {
            let epic_project = self
                .index
                .epics
                .get(epic_id)
                .and_then(|e| e.project_id.as_deref());
            if epic_project.is_some_and(|p| p != project_id) {
                errors.invalid(
                    "epic_id",
                    format!("epic `{}` belongs to another project", epic_id),
                );
            }
        }

        let due = optional_input(&mut errors, "due", payload.due.as_deref());
        if due.as_deref().is_some_and(|d| !is_recognizable_date(d)) {
            errors.invalid("due", "not a recognizable date");
        }

        let mut tags: BTreeSet<String> = payload
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        tags.insert(STORY_TAG.to_string());

        let owner = optional_input(&mut errors, "owner", payload.owner.as_deref());
        let as_a = optional_input(&mut errors, "as_a", payload.as_a.as_deref());
        let i_want = optional_input(&mut errors, "i_want", payload.i_want.as_deref());
        let so_that = optional_input(&mut errors, "so_that", payload.so_that.as_deref());
        let acceptance_criteria = payload
            .acceptance_criteria
            .iter()
            .flatten()
            .filter(|c| !c.trim().is_empty())
            .filter_map(|c| match clean_text_field("acceptance_criteria", c) {
                Ok(c) => Some(c),
                Err(reason) => {
                    errors.invalid("acceptance_criteria", reason);
                    None
                }
            })
            .collect::<Vec<_>>();
        let body = optional_input(&mut errors, "description", payload.description.as_deref())
            .map(|d| format!("{}\n", d))
            .unwrap_or_default();

        errors.into_result()?;

        let task = Task {
            id: self.unique_id(EntityKind::Task, &title),
            title,
            board: board_id,
            column,
            tags,
            due,
            created: now_timestamp(),
            updated: None,
            project_id,
            epic_id,
            owner,
            as_a,
            i_want,
            so_that,
            acceptance_criteria,
            body,
        };

        let path = self.write_new(&task)?;
        self.index.paths.insert((EntityKind::Task, task.id.clone()), path);
        self.index.tasks.insert(task.id.clone(), task.clone());
        self.rebuild_integrity();

        log::info!(
            "[VAULT] Created story {} on {}/{}",
            task.id,
            task.board,
            task.column
        );
        Ok(task)
    }

    /// Move a task to `column`, stamping `updated`.
    pub fn update_task_column(&mut self, task_id: &str, column: &str) -> VaultResult<Task> {
        let current = self
            .index
            .tasks
            .get(task_id)
            .ok_or_else(|| VaultError::not_found(EntityKind::Task, task_id))?;

        let column = clean_text_field("column", column)
            .map_err(|reason| ValidationError::single("column", reason))?;

        let declared = self
            .index
            .boards
            .get(&current.board)
            .is_some_and(|b| b.columns.contains(&column));
        if !declared {
            log::warn!(
                "[VAULT] Task {} moved to undeclared column `{}` on board {}; shown as unassigned",
                task_id,
                column,
                current.board
            );
        }

        let mut task = current.clone();
        task.column = column;
        task.updated = Some(now_timestamp());

        let path = self
            .index
            .paths
            .get(&(EntityKind::Task, task.id.clone()))
            .cloned()
            .unwrap_or_else(|| self.layout.path_for(EntityKind::Task, &task.id));
        rewrite(&path, &task)?;

        self.index.tasks.insert(task.id.clone(), task.clone());
        self.rebuild_integrity();

        log::info!("[VAULT] Moved task {} to {}", task.id, task.column);
        Ok(task)
    }

    // =====================================================
    // Internals
    // =====================================================

    /// Check an optional reference; blank counts as absent
    fn resolve_ref(
        &self,
        errors: &mut ValidationError,
        field: &str,
        value: Option<&str>,
        exists: impl Fn(&Self, &str) -> bool,
    ) -> Option<String> {
        let id = value.map(str::trim).filter(|v| !v.is_empty())?;
        if !exists(self, id) {
            errors.invalid(field, format!("unknown reference `{}`", id));
            return None;
        }
        Some(id.to_string())
    }

    /// Slug of `title`, suffixed `-2`, `-3`, ... until neither the index nor
    /// the disk has it. Files that failed to load still count as taken.
    fn unique_id(&self, kind: EntityKind, title: &str) -> String {
        let mut base = layout::slugify(title);
        if base.is_empty() {
            base = kind.to_string();
        }

        let mut candidate = base.clone();
        let mut n = 2;
        while self.id_taken(kind, &candidate) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        candidate
    }

    fn id_taken(&self, kind: EntityKind, id: &str) -> bool {
        let indexed = match kind {
            EntityKind::Board => self.index.boards.contains_key(id),
            EntityKind::Task => self.index.tasks.contains_key(id),
            EntityKind::Project => self.index.projects.contains_key(id),
            EntityKind::Epic => self.index.epics.contains_key(id),
        };
        indexed || self.layout.path_for(kind, id).exists()
    }

    fn write_new<E: Entity>(&self, entity: &E) -> VaultResult<PathBuf> {
        let path = self.layout.path_for(E::KIND, entity.id());
        let raw = frontmatter::serialize(&entity.encode(), entity.body())?;
        layout::write_atomic(&path, &raw).map_err(|e| VaultError::io(&path, e))?;
        Ok(path)
    }

    /// Recompute per-board task lists and the integrity report from the index
    fn rebuild_integrity(&mut self) {
        let index = &self.index;
        let mut report = IntegrityReport::default();
        let mut tasks_by_board: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for task in index.tasks.values() {
            match index.boards.get(&task.board) {
                None => report.orphaned_tasks.push(task.id.clone()),
                Some(board) => {
                    if !board.columns.contains(&task.column) {
                        report.unplaced_tasks.push(task.id.clone());
                    }
                    tasks_by_board
                        .entry(task.board.clone())
                        .or_default()
                        .push(task.id.clone());
                }
            }

            if let Some(project_id) = &task.project_id {
                if !index.projects.contains_key(project_id) {
                    report.dangling_refs.push(DanglingRef::new(
                        EntityKind::Task,
                        &task.id,
                        "project_id",
                        project_id,
                    ));
                }
            }
            if let Some(epic_id) = &task.epic_id {
                if !index.epics.contains_key(epic_id) {
                    report.dangling_refs.push(DanglingRef::new(
                        EntityKind::Task,
                        &task.id,
                        "epic_id",
                        epic_id,
                    ));
                }
            }
        }

        for epic in index.epics.values() {
            if let Some(project_id) = &epic.project_id {
                if !index.projects.contains_key(project_id) {
                    report.dangling_refs.push(DanglingRef::new(
                        EntityKind::Epic,
                        &epic.id,
                        "project_id",
                        project_id,
                    ));
                }
            }
        }

        if !report.orphaned_tasks.is_empty() {
            log::warn!(
                "[VAULT] {} task(s) reference a missing board and are hidden from boards",
                report.orphaned_tasks.len()
            );
        }

        self.index.tasks_by_board = tasks_by_board;
        self.integrity = report;
    }
}

/// Read and decode every file of one kind, in path order.
///
/// Per-file problems become diagnostics; only an unreadable directory fails.
fn read_kind<E: Entity>(
    layout: &VaultLayout,
    diagnostics: &mut Vec<LoadDiagnostic>,
) -> VaultResult<Vec<(E, PathBuf)>> {
    let dir = layout.directory_for(E::KIND);
    let mut files = layout
        .list_files(E::KIND)
        .map_err(|e| VaultError::io(&dir, e))?;
    files.sort();
    log::debug!("[VAULT] Scanning {} {} file(s) in {}", files.len(), E::KIND, dir.display());

    let mut loaded = Vec::with_capacity(files.len());
    for path in files {
        match read_entity::<E>(&path) {
            Ok(entity) => loaded.push((entity, path)),
            Err(message) => diagnostics.push(LoadDiagnostic {
                kind: E::KIND,
                path,
                message,
            }),
        }
    }
    Ok(loaded)
}

fn read_entity<E: Entity>(path: &Path) -> Result<E, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("unreadable: {}", e))?;
    let doc = frontmatter::parse(&raw).map_err(|e| e.to_string())?;
    E::decode(&doc.header, &doc.body).map_err(|e| e.to_string())
}

/// Index loaded entities; a repeated id keeps the first file
fn insert_loaded<E: Entity>(
    map: &mut BTreeMap<String, E>,
    paths: &mut HashMap<(EntityKind, String), PathBuf>,
    loaded: Vec<(E, PathBuf)>,
    diagnostics: &mut Vec<LoadDiagnostic>,
) {
    for (entity, path) in loaded {
        let id = entity.id().to_string();
        if let Some(first) = paths.get(&(E::KIND, id.clone())) {
            diagnostics.push(LoadDiagnostic {
                kind: E::KIND,
                message: format!("duplicate id `{}` (already loaded from {})", id, first.display()),
                path,
            });
            continue;
        }
        paths.insert((E::KIND, id.clone()), path);
        map.insert(id, entity);
    }
}

/// Rewrite an existing entity file, keeping header keys this kind does not own
fn rewrite<E: Entity>(path: &Path, entity: &E) -> VaultResult<()> {
    let mut header = entity.encode();
    if let Some(existing) = fs::read_to_string(path)
        .ok()
        .and_then(|raw| frontmatter::parse(&raw).ok())
    {
        append_unknown_keys::<E>(&mut header, existing.header);
    }

    let raw = frontmatter::serialize(&header, entity.body())?;
    layout::write_atomic(path, &raw).map_err(|e| VaultError::io(path, e))
}

fn append_unknown_keys<E: Entity>(header: &mut Header, existing: Header) {
    for (key, value) in existing {
        let known = key.as_str().is_some_and(|k| E::FIELDS.contains(&k));
        if !known && !header.contains_key(&key) {
            header.insert(key, value);
        }
    }
}

fn sorted_by_title<'a, E: Entity + 'a>(items: impl Iterator<Item = &'a E>) -> Vec<E> {
    let mut out: Vec<E> = items.cloned().collect();
    out.sort_by(|a, b| a.title().cmp(b.title()).then_with(|| a.id().cmp(b.id())));
    out
}

fn default_column(board: &Board) -> String {
    board
        .columns
        .iter()
        .find(|c| c.as_str() == PREFERRED_DEFAULT_COLUMN)
        .or_else(|| board.columns.first())
        .cloned()
        .unwrap_or_default()
}

fn required_input(errors: &mut ValidationError, field: &str, value: &str) -> String {
    if value.trim().is_empty() {
        errors.missing(field);
        return String::new();
    }
    match clean_text_field(field, value) {
        Ok(v) => v,
        Err(reason) => {
            errors.invalid(field, reason);
            String::new()
        }
    }
}

fn optional_input(errors: &mut ValidationError, field: &str, value: Option<&str>) -> Option<String> {
    let value = value.filter(|v| !v.trim().is_empty())?;
    match clean_text_field(field, value) {
        Ok(v) => Some(v),
        Err(reason) => {
            errors.invalid(field, reason);
            None
        }
    }
}
