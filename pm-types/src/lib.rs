//! Shared wire types for the vault HTTP API and its UI clients.

use serde::{Deserialize, Serialize};

// =====================================================
// Request Types
// =====================================================

/// Create a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectPayload {
    /// Absent decodes as blank so the store reports it as a missing field
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Create an epic, optionally linked to a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEpicPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Create a story (a task tagged `story`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryPayload {
    #[serde(default)]
    pub title: String,
    /// Defaults to the `default` board
    #[serde(default)]
    pub board_id: Option<String>,
    /// Defaults to `Backlog` when the board has it, else the first column
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub epic_id: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    /// Stored as the task body
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub as_a: Option<String>,
    #[serde(default)]
    pub i_want: Option<String>,
    #[serde(default)]
    pub so_that: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due: Option<String>,
}

/// Move a task to another column
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskColumnPayload {
    pub task_id: String,
    pub column: String,
}

/// Partial story draft sent to the field-suggestion service.
///
/// The same shape comes back with suggested values filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub as_a: Option<String>,
    #[serde(default)]
    pub i_want: Option<String>,
    #[serde(default)]
    pub so_that: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Option<Vec<String>>,
}

// =====================================================
// Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error body; field lists are only present for validation failures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// One of `format`, `validation`, `not_found`, `io`, `internal`,
    /// `unavailable`, `upstream`
    pub kind: String,
    pub message: String,
    /// Request field names, camelCase as sent in the payload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_fields: Vec<String>,
}

/// Result of `vault_info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultInfo {
    pub path: String,
}

/// Id of a freshly created entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedId {
    pub id: String,
}

/// Suggestion result: the merged draft plus fields that were rejected
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorySuggestion {
    pub draft: StoryDraft,
    /// Fields filled in from the suggestion service
    pub filled: Vec<String>,
    /// Suggested fields dropped because they failed validation
    pub rejected: Vec<String>,
}
