//! REST endpoints for todos.
//!
//! Handlers only bind payloads, call the service, and map outcomes to status
//! codes. Every error body is `{"error": "..."}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::{error, warn};

use super::model::{
    CreateTodoRequest, ErrorResponse, MessageResponse, TodoId, UpdateTodoRequest,
};
use super::service::TodoService;
use crate::error::TodoError;

/// Shared state for todo routes.
#[derive(Clone)]
pub struct TodoRouteState {
    pub service: TodoService,
}

/// Build the todo REST routes (`/todos`, `/todos/{id}`).
pub fn todo_routes(service: TodoService) -> Router {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/{id}",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .with_state(TodoRouteState { service })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for TodoError {
    fn into_response(self) -> Response {
        match self {
            TodoError::TitleRequired => error_response(StatusCode::BAD_REQUEST, self.to_string()),
            TodoError::TitleExists => error_response(StatusCode::CONFLICT, self.to_string()),
            TodoError::NotFound => error_response(StatusCode::NOT_FOUND, "Todo not found"),
            TodoError::UniquenessCheck(_) | TodoError::Storage(_) => {
                error!(error = %self, "Todo request failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

/// Path ids must be unsigned decimal integers: ASCII digits only, no sign.
fn parse_id(raw: &str) -> Result<TodoId, Response> {
    Some(raw)
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<u64>().ok())
        .and_then(|n| TodoId::try_from(n).ok())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Invalid ID"))
}

fn bad_body(rejection: JsonRejection) -> Response {
    warn!(error = %rejection.body_text(), "Rejected request body");
    error_response(StatusCode::BAD_REQUEST, rejection.body_text())
}

/// POST /todos
async fn create_todo(
    State(state): State<TodoRouteState>,
    payload: Result<Json<CreateTodoRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_body(rejection),
    };

    match state.service.create_todo(req).await {
        Ok(todo) => (StatusCode::CREATED, Json(todo)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /todos
async fn list_todos(State(state): State<TodoRouteState>) -> Response {
    match state.service.get_all_todos().await {
        Ok(todos) => Json(todos).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /todos/{id}
async fn get_todo(State(state): State<TodoRouteState>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.service.get_todo_by_id(id).await {
        Ok(todo) => Json(todo).into_response(),
        Err(e) => e.into_response(),
    }
}

/// PUT /todos/{id}
///
/// The id is validated before the body, so a bad id wins over a bad body.
async fn update_todo(
    State(state): State<TodoRouteState>,
    Path(raw): Path<String>,
    payload: Result<Json<UpdateTodoRequest>, JsonRejection>,
) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_body(rejection),
    };

    match state.service.update_todo(id, req).await {
        Ok(todo) => Json(todo).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /todos/{id}
async fn delete_todo(State(state): State<TodoRouteState>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.service.delete_todo(id).await {
        Ok(()) => Json(MessageResponse {
            message: "Todo deleted successfully".to_string(),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}
