//! Vault of boards, tasks, projects and epics stored as markdown files with YAML
//! frontmatter.
//!
//! Files live under `<data dir>/vault/{boards,tasks,projects,epics}/<id>.md`
//! and stay editable by hand; the in-memory index is rebuilt from them by
//! `VaultStore::load`. `VaultService` is the async handle the HTTP layer uses.

pub mod error;
pub mod frontmatter;
pub mod layout;
pub mod projection;
pub mod schema;
pub mod seed;
pub mod service;
pub mod store;

pub use error::{VaultError, VaultResult};
pub use service::VaultService;
pub use store::VaultStore;
