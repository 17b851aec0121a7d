//! Server-rendered HTML pages.

use super::AppState;
use super::extract::{LoginRequired, MaybeUser, RequestTime, cookie_value};
use super::forms::{
    EmailPreferencesForm, FormError, FormErrors, LoginForm, SignupForm, TaskForm, safe_redirect,
};
use super::templates::{ABOUT_TEMPLATE, error_list, html_escape, render_page};
use crate::auth::SESSION_COOKIE;
use crate::db::tasks::TaskScope;
use crate::error::{ApiError, ErrorCode};
use crate::types::{HistoryFilter, Page, Task, TaskListKind, TaskStatus, User};
use axum::extract::{Extension, Form, Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use chrono::{DateTime, Local, TimeZone};
use serde::Deserialize;
use tracing::{info, warn};

/// Error rendered as a minimal HTML page.
#[derive(Debug)]
pub struct PageError(ApiError);

impl From<ApiError> for PageError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for PageError {
    fn from(err: anyhow::Error) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.code.status();
        if status.is_server_error() {
            tracing::error!(code = ?self.0.code, message = %self.0.message, "Page failed");
        }
        let reason = status.canonical_reason().unwrap_or("Error");
        let body = format!(
            "<!DOCTYPE html><html><body><h1>{} {}</h1><p>{}</p><p><a href=\"/tasks\">Back to tasks</a></p></body></html>",
            status.as_u16(),
            reason,
            html_escape(&self.0.message)
        );
        (status, Html(body)).into_response()
    }
}

type PageResult = Result<Response, PageError>;

fn page(title: &str, user: Option<&User>, now: DateTime<Local>, content: &str) -> Response {
    Html(render_page(title, user, now, content)).into_response()
}

fn format_ms(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn session_cookie(key: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, key, max_age_secs
    )
}

// =============================================================================
// Task lists
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

/// Page numbers start at 1; `last` jumps to the end; garbage means page 1.
fn page_number(raw: Option<&str>) -> usize {
    match raw {
        Some("last") => usize::MAX,
        Some(n) => n.trim().parse().unwrap_or(1),
        None => 1,
    }
}

fn list_meta(kind: TaskListKind) -> (&'static str, &'static str) {
    match kind {
        TaskListKind::Pending => ("Pending tasks", "/tasks"),
        TaskListKind::Completed => ("Completed tasks", "/completed_tasks"),
        TaskListKind::All => ("All tasks", "/all_tasks"),
    }
}

fn task_row(task: &Task) -> String {
    let state = if task.completed {
        r#"<span class="badge">done</span>"#
    } else {
        ""
    };
    let actions = if task.is_pending() {
        format!(
            r#"<a href="/update-task/{id}">Edit</a> <a href="/complete_task/{id}">Complete</a> <a href="/delete-task/{id}">Delete</a>"#,
            id = task.id
        )
    } else {
        String::new()
    };
    format!(
        r#"<tr><td>{priority}</td><td><a href="/detail-task/{id}">{title}</a> {state}</td><td><span class="badge">{status}</span></td><td>{actions}</td></tr>"#,
        priority = task.priority,
        id = task.id,
        title = html_escape(&task.title),
        status = task.status,
    )
}

fn render_task_list(
    state: &AppState,
    user: &User,
    now: DateTime<Local>,
    params: &ListParams,
    kind: TaskListKind,
) -> PageResult {
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let tasks = state.db().list_tasks(user.id, kind, search)?;
    let progress = state.db().task_progress(user.id)?;
    let page_size = state.config().page_size;
    let current = Page::paginate(tasks, page_number(params.page.as_deref()), page_size);

    let (title, path) = list_meta(kind);
    let search_value = html_escape(search.unwrap_or(""));
    let search_query = search
        .map(|s| format!("&search={}", urlencoding::encode(s)))
        .unwrap_or_default();

    let mut html = format!(
        r#"<p class="progress">{} of {} tasks completed</p>
        <form method="get" action="{}"><input type="text" name="search" placeholder="Search titles" value="{}"></form>"#,
        progress.completed_count, progress.total_count, path, search_value
    );

    if current.items.is_empty() {
        html.push_str(r#"<p class="empty-state">No tasks found</p>"#);
    } else {
        html.push_str("<table><thead><tr><th>Priority</th><th>Title</th><th>Status</th><th></th></tr></thead><tbody>");
        for task in &current.items {
            html.push_str(&task_row(task));
        }
        html.push_str("</tbody></table>");
    }

    html.push_str(r#"<div class="pagination">"#);
    if current.has_previous() {
        html.push_str(&format!(
            r#"<a href="{}?page={}{}">&laquo; previous</a>"#,
            path,
            current.number - 1,
            search_query
        ));
    }
    html.push_str(&format!(
        "<span>Page {} of {}</span>",
        current.number, current.num_pages
    ));
    if current.has_next() {
        html.push_str(&format!(
            r#"<a href="{}?page={}{}">next &raquo;</a>"#,
            path,
            current.number + 1,
            search_query
        ));
    }
    html.push_str("</div>");

    Ok(page(title, Some(user), now, &html))
}

pub async fn pending_tasks(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Query(params): Query<ListParams>,
) -> PageResult {
    render_task_list(&state, &user, now, &params, TaskListKind::Pending)
}

pub async fn completed_tasks(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Query(params): Query<ListParams>,
) -> PageResult {
    render_task_list(&state, &user, now, &params, TaskListKind::Completed)
}

pub async fn all_tasks(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Query(params): Query<ListParams>,
) -> PageResult {
    render_task_list(&state, &user, now, &params, TaskListKind::All)
}

// =============================================================================
// Create / update / detail
// =============================================================================

fn task_form_html(action: &str, form: &TaskForm, errors: &FormErrors, submit: &str) -> String {
    let status_options: String = TaskStatus::ALL
        .iter()
        .map(|status| {
            let selected = if form.status == status.as_str() {
                " selected"
            } else {
                ""
            };
            format!(r#"<option value="{0}"{1}>{0}</option>"#, status, selected)
        })
        .collect();
    let checked = if form.completed.is_some() { " checked" } else { "" };

    format!(
        r#"<form method="post" action="{action}">
            <label for="title">Title</label>
            <input id="title" type="text" name="title" maxlength="100" value="{title}">
            {title_errors}
            <label for="description">Description</label>
            <textarea id="description" name="description" cols="30" rows="5">{description}</textarea>
            {description_errors}
            <label for="priority">Priority</label>
            <input id="priority" type="number" min="0" name="priority" value="{priority}">
            {priority_errors}
            <label for="status">Status</label>
            <select id="status" name="status">{status_options}</select>
            {status_errors}
            <label>Completed<input type="checkbox" name="completed"{checked}></label>
            <p><button type="submit">{submit}</button></p>
        </form>"#,
        title = html_escape(&form.title),
        title_errors = error_list(&errors.for_field("title")),
        description = html_escape(&form.description),
        description_errors = error_list(&errors.for_field("description")),
        priority = html_escape(&form.priority),
        priority_errors = error_list(&errors.for_field("priority")),
        status_errors = error_list(&errors.for_field("status")),
    )
}

fn form_from_task(task: &Task) -> TaskForm {
    TaskForm {
        title: task.title.clone(),
        description: task.description.clone(),
        priority: task.priority.to_string(),
        status: task.status.to_string(),
        completed: task.completed.then(|| "on".to_string()),
    }
}

pub async fn create_task_page(
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
) -> Response {
    let form = TaskForm {
        priority: "1".to_string(),
        status: TaskStatus::Pending.to_string(),
        ..TaskForm::default()
    };
    let html = task_form_html("/create-task", &form, &FormErrors::default(), "Create");
    page("Add a task", Some(&user), now, &html)
}

pub async fn create_task_submit(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Form(form): Form<TaskForm>,
) -> PageResult {
    match form.validate() {
        Ok(new_task) => {
            state.db().create_task(user.id, new_task)?;
            Ok(Redirect::to("/tasks").into_response())
        }
        Err(errors) => {
            let html = task_form_html("/create-task", &form, &errors, "Create");
            Ok(page("Add a task", Some(&user), now, &html))
        }
    }
}

pub async fn update_task_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Path(task_id): Path<i64>,
) -> PageResult {
    let task = state
        .db()
        .get_task_in_scope(user.id, task_id, TaskScope::Pending)?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;
    let action = format!("/update-task/{}", task.id);
    let html = task_form_html(&action, &form_from_task(&task), &FormErrors::default(), "Save");
    Ok(page("Update task", Some(&user), now, &html))
}

pub async fn update_task_submit(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Path(task_id): Path<i64>,
    Form(form): Form<TaskForm>,
) -> PageResult {
    // 404 before validation, as for a GET
    if state
        .db()
        .get_task_in_scope(user.id, task_id, TaskScope::Pending)?
        .is_none()
    {
        return Err(ApiError::task_not_found(task_id).into());
    }

    match form.validate() {
        Ok(new_task) => {
            state
                .db()
                .update_task(user.id, task_id, TaskScope::Pending, new_task.into())?;
            Ok(Redirect::to("/tasks").into_response())
        }
        Err(errors) => {
            let action = format!("/update-task/{}", task_id);
            let html = task_form_html(&action, &form, &errors, "Save");
            Ok(page("Update task", Some(&user), now, &html))
        }
    }
}

pub async fn task_detail_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Path(task_id): Path<i64>,
) -> PageResult {
    let task = state
        .db()
        .get_task(user.id, task_id)?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;
    let history = state
        .db()
        .task_history(user.id, task_id, &HistoryFilter::default())?;

    let mut html = format!(
        r#"<dl>
            <dt>Title</dt><dd>{title}</dd>
            <dt>Description</dt><dd>{description}</dd>
            <dt>Priority</dt><dd>{priority}</dd>
            <dt>Status</dt><dd>{status}</dd>
            <dt>Completed</dt><dd>{completed}</dd>
            <dt>Created</dt><dd>{created}</dd>
        </dl>"#,
        title = html_escape(&task.title),
        description = html_escape(&task.description),
        priority = task.priority,
        status = task.status,
        completed = if task.completed { "yes" } else { "no" },
        created = format_ms(task.created_at),
    );

    html.push_str("<h2>History</h2>");
    if history.is_empty() {
        html.push_str(r#"<p class="empty-state">No status changes yet</p>"#);
    } else {
        html.push_str("<table><thead><tr><th>From</th><th>To</th><th>When</th></tr></thead><tbody>");
        for entry in &history {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                entry.previous_status,
                entry.current_status,
                format_ms(entry.updated_at)
            ));
        }
        html.push_str("</tbody></table>");
    }

    Ok(page("Task detail", Some(&user), now, &html))
}

// =============================================================================
// Delete / complete
// =============================================================================

fn confirm_html(action: &str, question: &str, button: &str, danger: bool) -> String {
    format!(
        r#"<form method="post" action="{}"><p>{}</p><button type="submit"{}>{}</button> <a href="/tasks">Cancel</a></form>"#,
        action,
        question,
        if danger { r#" class="danger""# } else { "" },
        button
    )
}

pub async fn delete_task_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Path(task_id): Path<i64>,
) -> PageResult {
    let task = state
        .db()
        .get_task_in_scope(user.id, task_id, TaskScope::Pending)?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;
    let html = confirm_html(
        &format!("/delete-task/{}", task.id),
        &format!("Delete \"{}\"?", html_escape(&task.title)),
        "Delete",
        true,
    );
    Ok(page("Delete task", Some(&user), now, &html))
}

pub async fn delete_task_submit(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(task_id): Path<i64>,
) -> PageResult {
    if !state
        .db()
        .soft_delete_task(user.id, task_id, TaskScope::Pending)?
    {
        return Err(ApiError::task_not_found(task_id).into());
    }
    Ok(Redirect::to("/tasks").into_response())
}

pub async fn complete_task_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Path(task_id): Path<i64>,
) -> PageResult {
    let task = state
        .db()
        .get_task_in_scope(user.id, task_id, TaskScope::Pending)?
        .ok_or_else(|| ApiError::task_not_found(task_id))?;
    let html = confirm_html(
        &format!("/complete_task/{}", task.id),
        &format!("Mark \"{}\" as complete?", html_escape(&task.title)),
        "Complete",
        false,
    );
    Ok(page("Complete task", Some(&user), now, &html))
}

pub async fn complete_task_submit(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Path(task_id): Path<i64>,
) -> PageResult {
    if !state.db().complete_task(user.id, task_id)? {
        return Err(ApiError::task_not_found(task_id).into());
    }
    Ok(Redirect::to("/tasks").into_response())
}

// =============================================================================
// Accounts
// =============================================================================

fn signup_html(form: &SignupForm, errors: &FormErrors) -> String {
    format!(
        r#"<form method="post" action="/user/signup">
            <label for="username">Username</label>
            <input id="username" type="text" name="username" maxlength="150" value="{username}">
            {username_errors}
            <label for="email">Email</label>
            <input id="email" type="email" name="email" value="{email}">
            {email_errors}
            <label for="password1">Password</label>
            <input id="password1" type="password" name="password1">
            {password1_errors}
            <label for="password2">Password confirmation</label>
            <input id="password2" type="password" name="password2">
            {password2_errors}
            <p><button type="submit">Sign up</button></p>
        </form>"#,
        username = html_escape(&form.username),
        username_errors = error_list(&errors.for_field("username")),
        email = html_escape(&form.email),
        email_errors = error_list(&errors.for_field("email")),
        password1_errors = error_list(&errors.for_field("password1")),
        password2_errors = error_list(&errors.for_field("password2")),
    )
}

pub async fn signup_page(
    MaybeUser(user): MaybeUser,
    Extension(RequestTime(now)): Extension<RequestTime>,
) -> Response {
    let html = signup_html(&SignupForm::default(), &FormErrors::default());
    page("Sign up", user.as_ref(), now, &html)
}

pub async fn signup_submit(
    State(state): State<AppState>,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Form(form): Form<SignupForm>,
) -> PageResult {
    let errors = match form.validate() {
        Ok(new_user) => match state.db().create_user(new_user) {
            Ok(_) => return Ok(Redirect::to("/user/login").into_response()),
            Err(e) => {
                let err = ApiError::from(e);
                if err.code != ErrorCode::AlreadyExists {
                    return Err(err.into());
                }
                FormErrors::single("username", FormError::UsernameTaken)
            }
        },
        Err(errors) => errors,
    };

    let html = signup_html(&form, &errors);
    Ok(page("Sign up", None, now, &html))
}

fn login_html(form: &LoginForm, errors: &FormErrors) -> String {
    let next = form
        .next
        .as_deref()
        .map(|n| format!(r#"<input type="hidden" name="next" value="{}">"#, html_escape(n)))
        .unwrap_or_default();
    format!(
        r#"<form method="post" action="/user/login">
            {all_errors}
            <label for="username">Username</label>
            <input id="username" type="text" name="username" value="{username}">
            {username_errors}
            <label for="password">Password</label>
            <input id="password" type="password" name="password">
            {password_errors}
            {next}
            <p><button type="submit">Log in</button></p>
        </form>"#,
        all_errors = error_list(&errors.for_field("__all__")),
        username = html_escape(&form.username),
        username_errors = error_list(&errors.for_field("username")),
        password_errors = error_list(&errors.for_field("password")),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    #[serde(default)]
    pub next: Option<String>,
}

pub async fn login_page(
    MaybeUser(user): MaybeUser,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Query(params): Query<LoginParams>,
) -> Response {
    let form = LoginForm {
        next: params.next,
        ..LoginForm::default()
    };
    let html = login_html(&form, &FormErrors::default());
    page("Log in", user.as_ref(), now, &html)
}

pub async fn login_submit(
    State(state): State<AppState>,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Form(form): Form<LoginForm>,
) -> PageResult {
    if let Err(errors) = form.validate() {
        return Ok(page("Log in", None, now, &login_html(&form, &errors)));
    }

    let Some(user) = state.db().authenticate(form.username.trim(), &form.password)? else {
        warn!(username = %form.username.trim(), "Failed login");
        let errors = FormErrors::single("__all__", FormError::InvalidLogin);
        return Ok(page("Log in", None, now, &login_html(&form, &errors)));
    };

    let ttl_ms = state.config().session_ttl_ms();
    let key = state.db().create_session(user.id, ttl_ms)?;
    info!(user_id = user.id, "User logged in");

    let target = safe_redirect(form.next.as_deref()).to_string();
    Ok((
        [(header::SET_COOKIE, session_cookie(&key, ttl_ms / 1000))],
        Redirect::to(&target),
    )
        .into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> PageResult {
    if let Some(key) = cookie_value(&headers, SESSION_COOKIE) {
        state.db().delete_session(key)?;
    }
    Ok((
        [(header::SET_COOKIE, session_cookie("", 0))],
        Redirect::to("/user/login"),
    )
        .into_response())
}

// =============================================================================
// Email preferences
// =============================================================================

fn email_preferences_html(user_id: i64, form: &EmailPreferencesForm, errors: &FormErrors) -> String {
    format!(
        r#"<form method="post" action="/update-email-pref/{user_id}">
            <label for="selected_email_hour">Send my daily report after this hour (0-23)</label>
            <input id="selected_email_hour" type="number" min="0" max="23" name="selected_email_hour" value="{hour}">
            {errors}
            <p><button type="submit">Save</button></p>
        </form>"#,
        hour = html_escape(&form.selected_email_hour),
        errors = error_list(&errors.for_field("selected_email_hour")),
    )
}

pub async fn email_preferences_page(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Path(user_id): Path<i64>,
) -> PageResult {
    if user_id != user.id {
        return Err(ApiError::user_not_found(user_id).into());
    }
    let prefs = state
        .db()
        .email_preferences(user.id)?
        .ok_or_else(|| ApiError::user_not_found(user_id))?;
    let form = EmailPreferencesForm {
        selected_email_hour: prefs.selected_email_hour.to_string(),
    };
    let html = email_preferences_html(user.id, &form, &FormErrors::default());
    Ok(page("Email preferences", Some(&user), now, &html))
}

pub async fn email_preferences_submit(
    State(state): State<AppState>,
    LoginRequired(user): LoginRequired,
    Extension(RequestTime(now)): Extension<RequestTime>,
    Path(user_id): Path<i64>,
    Form(form): Form<EmailPreferencesForm>,
) -> PageResult {
    if user_id != user.id {
        return Err(ApiError::user_not_found(user_id).into());
    }
    match form.validate() {
        Ok(hour) => {
            state.db().update_email_hour(user.id, hour)?;
            Ok(Redirect::to("/tasks").into_response())
        }
        Err(errors) => {
            let html = email_preferences_html(user.id, &form, &errors);
            Ok(page("Email preferences", Some(&user), now, &html))
        }
    }
}

// =============================================================================
// Misc
// =============================================================================

pub async fn about_page(
    MaybeUser(user): MaybeUser,
    Extension(RequestTime(now)): Extension<RequestTime>,
) -> Response {
    page("About", user.as_ref(), now, ABOUT_TEMPLATE)
}

pub async fn home() -> Redirect {
    Redirect::to("/tasks")
}

/// Fallback for unknown paths.
pub async fn not_found() -> Response {
    PageError(ApiError::not_found("Page")).into_response()
}
