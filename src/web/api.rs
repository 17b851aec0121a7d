//! JSON API handlers.

use super::AppState;
use super::extract::CurrentUser;
use super::forms::{FormError, check_priority, check_title};
use crate::db::tasks::TaskScope;
use crate::error::{ApiError, ApiResult};
use crate::types::{
    HistoryFilter, NewTask, Priority, Task, TaskChanges, TaskFilter, TaskHistory, TaskStatus,
    UserSummary,
};
use axum::extract::{Form, FromRequest, Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::info;

/// Task as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOut {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub status: TaskStatus,
    pub priority: Priority,
    pub user: UserSummary,
}

impl TaskOut {
    fn new(task: Task, user: UserSummary) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            completed: task.completed,
            status: task.status,
            priority: task.priority,
            user,
        }
    }
}

/// History entry as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryOut {
    pub previous_status: TaskStatus,
    pub current_status: TaskStatus,
    pub updated_at: String,
}

fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

impl From<TaskHistory> for HistoryOut {
    fn from(entry: TaskHistory) -> Self {
        Self {
            previous_status: entry.previous_status,
            current_status: entry.current_status,
            updated_at: format_timestamp(entry.updated_at),
        }
    }
}

/// Task fields accepted on create and update. Which ones are required
/// depends on the method.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

impl TaskInput {
    fn validated_priority(&self) -> ApiResult<Option<Priority>> {
        match self.priority {
            Some(priority) => check_priority(priority)
                .map(Some)
                .map_err(|e| ApiError::invalid_value("priority", e.to_string())),
            None => Ok(None),
        }
    }

    fn validated_title(&self) -> ApiResult<Option<String>> {
        match self.title.as_deref().map(str::trim) {
            Some(title) => {
                check_title(title).map_err(|e| match e {
                    FormError::Required => ApiError::missing_field("title"),
                    other => ApiError::invalid_value("title", other.to_string()),
                })?;
                Ok(Some(title.to_string()))
            }
            None => Ok(None),
        }
    }

    /// Create and full update need a title and a description.
    fn into_new_task(self) -> ApiResult<NewTask> {
        let title = self
            .validated_title()?
            .ok_or_else(|| ApiError::missing_field("title"))?;
        let priority = self.validated_priority()?;
        let description = self
            .description
            .ok_or_else(|| ApiError::missing_field("description"))?;
        Ok(NewTask {
            title,
            description,
            priority: priority.unwrap_or(crate::types::PRIORITY_DEFAULT),
            status: self.status.unwrap_or_default(),
            completed: self.completed.unwrap_or(false),
        })
    }

    fn into_changes(self) -> ApiResult<TaskChanges> {
        let title = self.validated_title()?;
        let priority = self.validated_priority()?;
        Ok(TaskChanges {
            title,
            description: self.description,
            priority,
            status: self.status,
            completed: self.completed,
        })
    }
}

// =============================================================================
// Query parsing
// =============================================================================

fn parse_status_param(field: &str, raw: &str) -> ApiResult<TaskStatus> {
    raw.parse()
        .map_err(|e: String| ApiError::invalid_value(field, format!("Select a valid choice. {}", e)))
}

fn parse_bool_param(field: &str, raw: &str) -> ApiResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ApiError::invalid_value(field, "Enter a valid boolean.")),
    }
}

fn parse_datetime_param(field: &str, raw: &str) -> ApiResult<i64> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.timestamp_millis())
        .map_err(|_| ApiError::invalid_value(field, "Enter a valid date/time."))
}

/// Empty query values mean "no filter".
fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

pub fn task_filter(params: &HashMap<String, String>) -> ApiResult<TaskFilter> {
    Ok(TaskFilter {
        title: param(params, "title").map(str::to_string),
        status: param(params, "status")
            .map(|v| parse_status_param("status", v))
            .transpose()?,
        completed: param(params, "completed")
            .map(|v| parse_bool_param("completed", v))
            .transpose()?,
    })
}

pub fn history_filter(params: &HashMap<String, String>) -> ApiResult<HistoryFilter> {
    Ok(HistoryFilter {
        updated_at: param(params, "updated_at")
            .map(|v| parse_datetime_param("updated_at", v))
            .transpose()?,
        previous_status: param(params, "previous_status")
            .map(|v| parse_status_param("previous_status", v))
            .transpose()?,
        current_status: param(params, "current_status")
            .map(|v| parse_status_param("current_status", v))
            .transpose()?,
    })
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /auth-token/`, accepting a form or JSON body.
pub async fn obtain_token(State(state): State<AppState>, req: Request) -> ApiResult<Json<Value>> {
    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    let creds = if is_json {
        let Json(creds) = Json::<Credentials>::from_request(req, &state)
            .await
            .map_err(|e| ApiError::invalid_value("body", e.body_text()))?;
        creds
    } else {
        let Form(creds) = Form::<Credentials>::from_request(req, &state)
            .await
            .map_err(|e| ApiError::invalid_value("body", e.body_text()))?;
        creds
    };

    if creds.username.is_empty() {
        return Err(ApiError::missing_field("username"));
    }
    if creds.password.is_empty() {
        return Err(ApiError::missing_field("password"));
    }

    let user = state
        .db()
        .authenticate(&creds.username, &creds.password)?
        .ok_or_else(ApiError::invalid_credentials)?;
    let token = state.db().get_or_create_token(user.id)?;
    info!(user_id = user.id, "Issued API token");
    Ok(Json(json!({ "token": token })))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<TaskOut>>> {
    let filter = task_filter(&params)?;
    let summary = UserSummary::from(&user);
    let tasks = state.db().list_tasks_filtered(user.id, &filter)?;
    Ok(Json(
        tasks
            .into_iter()
            .map(|task| TaskOut::new(task, summary.clone()))
            .collect(),
    ))
}

pub async fn create_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<TaskInput>,
) -> ApiResult<(StatusCode, Json<TaskOut>)> {
    let new_task = input.into_new_task()?;
    let task = state.db().create_task(user.id, new_task)?;
    Ok((
        StatusCode::CREATED,
        Json(TaskOut::new(task, UserSummary::from(&user))),
    ))
}

pub async fn get_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<TaskOut>> {
    let task = state
        .db()
        .get_task(user.id, task_id)?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;
    Ok(Json(TaskOut::new(task, UserSummary::from(&user))))
}

pub async fn replace_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<i64>,
    Json(input): Json<TaskInput>,
) -> ApiResult<Json<TaskOut>> {
    // Missing task wins over a bad body
    if state.db().get_task(user.id, task_id)?.is_none() {
        return Err(ApiError::task_not_found(task_id));
    }
    let changes = TaskChanges::from(input.into_new_task()?);
    let task = state
        .db()
        .update_task(user.id, task_id, TaskScope::Active, changes)?;
    Ok(Json(TaskOut::new(task, UserSummary::from(&user))))
}

pub async fn patch_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<i64>,
    Json(input): Json<TaskInput>,
) -> ApiResult<Json<TaskOut>> {
    let changes = input.into_changes()?;
    let task = state
        .db()
        .update_task(user.id, task_id, TaskScope::Active, changes)?;
    Ok(Json(TaskOut::new(task, UserSummary::from(&user))))
}

pub async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<i64>,
) -> ApiResult<StatusCode> {
    if state
        .db()
        .soft_delete_task(user.id, task_id, TaskScope::Active)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::task_not_found(task_id))
    }
}

pub async fn task_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<HistoryOut>>> {
    let filter = history_filter(&params)?;
    // Foreign and deleted tasks simply have no visible history
    let history = state.db().task_history(user.id, task_id, &filter)?;
    Ok(Json(history.into_iter().map(HistoryOut::from).collect()))
}

/// `GET /taskapi/`: every non-deleted task with its owner.
pub async fn all_open_tasks(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
) -> ApiResult<Json<Value>> {
    let tasks = state.db().list_all_open_tasks()?;
    let mut owners: HashMap<i64, UserSummary> = HashMap::new();
    let mut out = Vec::with_capacity(tasks.len());
    for task in tasks {
        let summary = match owners.get(&task.user_id) {
            Some(summary) => summary.clone(),
            None => {
                let owner = state
                    .db()
                    .get_user(task.user_id)?
                    .ok_or_else(|| ApiError::user_not_found(task.user_id))?;
                let summary = UserSummary::from(&owner);
                owners.insert(task.user_id, summary.clone());
                summary
            }
        };
        out.push(TaskOut::new(task, summary));
    }
    Ok(Json(json!({ "tasks": out })))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn task_filter_parses_known_values() {
        let filter = task_filter(&params(&[
            ("title", "report"),
            ("status", "IN_PROGRESS"),
            ("completed", "false"),
        ]))
        .unwrap();
        assert_eq!(filter.title.as_deref(), Some("report"));
        assert_eq!(filter.status, Some(TaskStatus::InProgress));
        assert_eq!(filter.completed, Some(false));
    }

    #[test]
    fn task_filter_ignores_empty_values() {
        let filter = task_filter(&params(&[("status", ""), ("completed", "")])).unwrap();
        assert!(filter.status.is_none());
        assert!(filter.completed.is_none());
    }

    #[test]
    fn bad_filter_values_are_rejected() {
        let err = task_filter(&params(&[("status", "DONE")])).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
        assert_eq!(err.field.as_deref(), Some("status"));

        assert!(task_filter(&params(&[("completed", "maybe")])).is_err());
        assert!(history_filter(&params(&[("updated_at", "yesterday")])).is_err());
    }

    #[test]
    fn history_filter_reads_rfc3339() {
        let filter = history_filter(&params(&[("updated_at", "2026-01-02T03:04:05.006Z")])).unwrap();
        assert_eq!(filter.updated_at, Some(1_767_323_045_006));
        assert_eq!(format_timestamp(1_767_323_045_006), "2026-01-02T03:04:05.006Z");
    }

    #[test]
    fn create_requires_title_and_description() {
        let err = TaskInput::default().into_new_task().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("title"));

        let input = TaskInput {
            title: Some("Short".to_string()),
            ..TaskInput::default()
        };
        let err = input.into_new_task().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("description"));
    }

    #[test]
    fn create_defaults_priority_and_status() {
        let input = TaskInput {
            title: Some("Buy milk".to_string()),
            description: Some(String::new()),
            ..TaskInput::default()
        };
        let task = input.into_new_task().unwrap();
        assert_eq!(task.priority, 1);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.completed);
    }

    #[test]
    fn overlong_titles_are_rejected() {
        let input = TaskInput {
            title: Some("x".repeat(101)),
            ..TaskInput::default()
        };
        assert!(input.into_changes().is_err());
    }
}
