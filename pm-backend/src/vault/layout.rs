//! File layout for the vault
//!
//! Maps entity kinds to directories and ids to filenames, lists entity files,
//! and writes files atomically (hidden temp file + rename).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::schema::EntityKind;

pub const VAULT_DIR: &str = "vault";
pub const ENTITY_EXT: &str = "md";

/// Directory layout rooted at `<root>/vault`
#[derive(Debug, Clone)]
pub struct VaultLayout {
    vault_root: PathBuf,
}

impl VaultLayout {
    /// Layout for the vault under `root` (the vault itself is `root/vault`)
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            vault_root: root.as_ref().join(VAULT_DIR),
        }
    }

    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    pub fn directory_for(&self, kind: EntityKind) -> PathBuf {
        self.vault_root.join(dir_name(kind))
    }

    /// Path an entity with this id would be written to
    pub fn path_for(&self, kind: EntityKind, id: &str) -> PathBuf {
        self.directory_for(kind).join(filename_for(id, kind))
    }

    /// Entity files of one kind, in no particular order
    pub fn list_files(&self, kind: EntityKind) -> io::Result<Vec<PathBuf>> {
        list_entity_files(&self.directory_for(kind))
    }
}

pub fn dir_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Board => "boards",
        EntityKind::Task => "tasks",
        EntityKind::Project => "projects",
        EntityKind::Epic => "epics",
    }
}

/// Filename for an id: `<slug>.md`, falling back to the kind name for ids with
/// no usable characters
pub fn filename_for(id: &str, kind: EntityKind) -> String {
    let slug = slugify(id);
    if slug.is_empty() {
        format!("{}.{}", kind, ENTITY_EXT)
    } else {
        format!("{}.{}", slug, ENTITY_EXT)
    }
}

/// Slugify a title or id (e.g. "Fix Login Bug!" -> "fix-login-bug")
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<&str>>()
        .join("-")
}

/// List `.md` files directly inside `dir`, skipping hidden entries.
///
/// A missing directory lists as empty.
pub fn list_entity_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if !dir.exists() {
        return Ok(files);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // Skip hidden files (temp files from interrupted writes, editor swap files)
        if path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(true)
        {
            continue;
        }
        if path.is_file() && path.extension().map(|e| e == ENTITY_EXT).unwrap_or(false) {
            files.push(path);
        }
    }

    Ok(files)
}

/// Write `content` to `path` so readers see either the old or the new file.
///
/// The temp file is a hidden sibling, so it never shows up in listings.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let temp_path = parent.join(format!(".{}.tmp", name.to_string_lossy()));

    let result = (|| -> io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
