//! Vault REST API: board, task, project and epic endpoints for the UI.
//!
//! Every response uses the `{success, data?, error?}` envelope. Validation
//! failures are 422, unknown ids 404, broken files and I/O 500. Field names in
//! validation errors use the camelCase of the request payloads.

use actix_web::{web, HttpResponse, Responder};
use pm_types::{
    ApiError, ApiResponse, CreateEpicPayload, CreateProjectPayload, CreateStoryPayload, CreatedId,
    StoryDraft, UpdateTaskColumnPayload, VaultInfo,
};
use serde::{Deserialize, Serialize};

use crate::ai::{merge_suggestion, SuggestError};
use crate::vault::{VaultError, VaultResult};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/vault")
            .route("/info", web::get().to(vault_info))
            .route("/diagnostics", web::get().to(diagnostics))
            .route("/reload", web::post().to(reload))
            .route("/boards", web::get().to(list_boards))
            .route("/boards/{id}", web::get().to(get_board))
            .route("/tasks", web::get().to(list_tasks))
            .route("/tasks/column", web::post().to(update_task_column))
            .route("/projects", web::get().to(list_projects))
            .route("/projects", web::post().to(create_project))
            .route("/epics", web::get().to(list_epics))
            .route("/epics", web::post().to(create_epic))
            .route("/stories", web::post().to(create_story))
            .route("/stories/suggest", web::post().to(suggest_story_fields)),
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TasksQuery {
    board_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpicsQuery {
    project_id: Option<String>,
}

/// Map a vault result onto the JSON envelope
fn respond<T: Serialize>(result: VaultResult<T>) -> HttpResponse {
    match result {
        Ok(data) => HttpResponse::Ok().json(ApiResponse::ok(data)),
        Err(e) => vault_error_response(&e),
    }
}

/// `board_id` -> `boardId`
fn wire_field(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn vault_error_response(e: &VaultError) -> HttpResponse {
    let mut body = ApiError {
        kind: e.kind_name().to_string(),
        message: e.to_string(),
        ..Default::default()
    };

    let mut resp = match e {
        VaultError::Validation(v) => {
            body.missing_fields = v.missing_fields.iter().map(|f| wire_field(f)).collect();
            body.invalid_fields = v.invalid_fields.iter().map(|f| wire_field(&f.field)).collect();
            HttpResponse::UnprocessableEntity()
        }
        VaultError::NotFound { .. } => HttpResponse::NotFound(),
        VaultError::Format(_) | VaultError::Io { .. } | VaultError::Internal { .. } => {
            log::error!("[VAULT] Request failed: {}", e);
            HttpResponse::InternalServerError()
        }
    };
    resp.json(ApiResponse::<()>::err(body))
}

fn suggest_error_response(e: &SuggestError) -> HttpResponse {
    let (mut resp, kind) = match e {
        SuggestError::Unavailable => (HttpResponse::ServiceUnavailable(), "unavailable"),
        _ => {
            log::warn!("[STORY_ASSIST] {}", e);
            (HttpResponse::BadGateway(), "upstream")
        }
    };
    resp.json(ApiResponse::<()>::err(ApiError {
        kind: kind.to_string(),
        message: e.to_string(),
        ..Default::default()
    }))
}

async fn vault_info(state: web::Data<AppState>) -> impl Responder {
    respond(state.vault.vault_path().await.map(|p| VaultInfo {
        path: p.to_string_lossy().to_string(),
    }))
}

async fn diagnostics(state: web::Data<AppState>) -> impl Responder {
    respond(state.vault.diagnostics().await)
}

async fn reload(state: web::Data<AppState>) -> impl Responder {
    respond(state.vault.reload().await)
}

async fn list_boards(state: web::Data<AppState>) -> impl Responder {
    respond(state.vault.list_boards().await)
}

async fn get_board(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    respond(state.vault.get_board_with_tasks(path.into_inner()).await)
}

async fn list_tasks(state: web::Data<AppState>, query: web::Query<TasksQuery>) -> impl Responder {
    respond(state.vault.list_tasks(query.into_inner().board_id).await)
}

async fn list_projects(state: web::Data<AppState>) -> impl Responder {
    respond(state.vault.list_projects().await)
}

async fn list_epics(state: web::Data<AppState>, query: web::Query<EpicsQuery>) -> impl Responder {
    respond(state.vault.list_epics(query.into_inner().project_id).await)
}

async fn create_project(
    state: web::Data<AppState>,
    body: web::Json<CreateProjectPayload>,
) -> impl Responder {
    respond(
        state
            .vault
            .create_project(body.into_inner())
            .await
            .map(|p| CreatedId { id: p.id }),
    )
}

async fn create_epic(
    state: web::Data<AppState>,
    body: web::Json<CreateEpicPayload>,
) -> impl Responder {
    respond(
        state
            .vault
            .create_epic(body.into_inner())
            .await
            .map(|e| CreatedId { id: e.id }),
    )
}

async fn create_story(
    state: web::Data<AppState>,
    body: web::Json<CreateStoryPayload>,
) -> impl Responder {
    respond(
        state
            .vault
            .create_story(body.into_inner())
            .await
            .map(|t| CreatedId { id: t.id }),
    )
}

async fn update_task_column(
    state: web::Data<AppState>,
    body: web::Json<UpdateTaskColumnPayload>,
) -> impl Responder {
    let UpdateTaskColumnPayload { task_id, column } = body.into_inner();
    respond(state.vault.update_task_column(task_id, column).await)
}

/// Suggest values for empty story fields. Never writes to the vault.
async fn suggest_story_fields(
    state: web::Data<AppState>,
    body: web::Json<StoryDraft>,
) -> impl Responder {
    let Some(suggester) = state.suggester.clone() else {
        return suggest_error_response(&SuggestError::Unavailable);
    };

    let draft = body.into_inner();
    match suggester.suggest(&draft).await {
        Ok(suggested) => {
            let result = merge_suggestion(draft, suggested);
            log::info!(
                "[STORY_ASSIST] Filled {} field(s), rejected {}",
                result.filled.len(),
                result.rejected.len()
            );
            HttpResponse::Ok().json(ApiResponse::ok(result))
        }
        Err(e) => suggest_error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};

    use crate::ai::story_assist::tests::StubSuggester;
    use crate::ai::FieldSuggester;
    use crate::config::Config;
    use crate::vault::VaultService;

    async fn state(suggester: Option<Arc<dyn FieldSuggester>>) -> (TempDir, web::Data<AppState>) {
        let dir = tempdir().unwrap();
        let vault = VaultService::open(dir.path().to_path_buf()).await.unwrap();
        let state = web::Data::new(AppState {
            vault,
            suggester,
            config: Config::from_lookup(|_| None),
        });
        (dir, state)
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(config)).await
        };
    }

    #[actix_web::test]
    async fn test_board_view_and_lists() {
        let (_dir, state) = state(None).await;
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/vault/boards/default").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["board"]["id"], "default");
        assert_eq!(body["data"]["columns"][1]["name"], "Backlog");
        assert_eq!(body["data"]["columns"][1]["tasks"].as_array().unwrap().len(), 2);

        let req = test::TestRequest::get()
            .uri("/api/vault/epics?projectId=getting-started")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"][0]["id"], "first-steps");

        let req = test::TestRequest::get().uri("/api/vault/tasks?boardId=other").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"], json!([]));
    }

    #[actix_web::test]
    async fn test_create_story_then_move() {
        let (_dir, state) = state(None).await;
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/vault/stories")
            .set_json(json!({ "title": "Add search", "asA": "reader", "tags": ["ui"] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["id"], "add-search");

        let req = test::TestRequest::post()
            .uri("/api/vault/tasks/column")
            .set_json(json!({ "taskId": "add-search", "column": "Review" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["column"], "Review");
        assert_eq!(body["data"]["as_a"], "reader");
    }

    #[actix_web::test]
    async fn test_error_status_codes() {
        let (_dir, state) = state(None).await;
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/vault/boards/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["kind"], "not_found");

        let req = test::TestRequest::post()
            .uri("/api/vault/epics")
            .set_json(json!({ "title": "", "projectId": "ghost" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["missingFields"], json!(["title"]));
        assert_eq!(body["error"]["invalidFields"], json!(["projectId"]));

        let req = test::TestRequest::post()
            .uri("/api/vault/tasks/column")
            .set_json(json!({ "taskId": "ghost", "column": "Done" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_empty_create_bodies_report_missing_title() {
        let (_dir, state) = state(None).await;
        let app = app!(state);

        for uri in ["/api/vault/stories", "/api/vault/epics", "/api/vault/projects"] {
            let req = test::TestRequest::post().uri(uri).set_json(json!({})).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["success"], false, "{uri}");
            assert_eq!(body["error"]["kind"], "validation", "{uri}");
            assert_eq!(body["error"]["missingFields"], json!(["title"]), "{uri}");
        }
        assert_eq!(state.vault.list_tasks(None).await.unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn test_story_errors_use_payload_field_names() {
        let (_dir, state) = state(None).await;
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/vault/stories")
            .set_json(json!({ "title": "Lost", "boardId": "nope", "epicId": "ghost" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["invalidFields"], json!(["boardId", "epicId"]));
    }

    #[::core::prelude::v1::test]
    fn test_wire_field_names() {
        assert_eq!(wire_field("title"), "title");
        assert_eq!(wire_field("project_id"), "projectId");
        assert_eq!(wire_field("acceptance_criteria"), "acceptanceCriteria");
    }

    #[actix_web::test]
    async fn test_broken_vault_is_500() {
        let (dir, state) = state(None).await;
        let app = app!(state);
        std::fs::remove_dir_all(dir.path().join("vault")).unwrap();

        let req = test::TestRequest::post().uri("/api/vault/reload").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["kind"], "io");
    }

    #[actix_web::test]
    async fn test_suggest_without_service_is_503() {
        let (_dir, state) = state(None).await;
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/vault/stories/suggest")
            .set_json(json!({ "description": "Something" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_suggest_fills_and_writes_nothing() {
        let stub = StubSuggester(StoryDraft {
            title: Some("Suggested".to_string()),
            i_want: Some("faster boards".to_string()),
            ..Default::default()
        });
        let (_dir, state) = state(Some(Arc::new(stub))).await;
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/vault/stories/suggest")
            .set_json(json!({ "title": "Mine", "description": "Speed" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["draft"]["title"], "Mine");
        assert_eq!(body["data"]["draft"]["iWant"], "faster boards");
        assert_eq!(body["data"]["filled"], json!(["iWant"]));

        assert_eq!(state.vault.list_tasks(None).await.unwrap().len(), 2);
    }
}
