//! Task CRUD, listings and priority cascading.

use super::history::record_status_change;
use super::{Database, now_ms};
use crate::error::ApiError;
use crate::priority::plan_cascade;
use crate::types::{
    NewTask, Priority, Task, TaskChanges, TaskFilter, TaskListKind, TaskProgress, TaskStatus,
};
use anyhow::Result;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, TransactionBehavior, params};
use tracing::{debug, info};

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Which tasks an operation may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// Not completed and not deleted.
    Pending,
    /// Not deleted.
    Active,
}

impl TaskScope {
    fn condition(&self) -> &'static str {
        match self {
            TaskScope::Pending => "deleted = 0 AND completed = 0",
            TaskScope::Active => "deleted = 0",
        }
    }
}

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        completed: row.get("completed")?,
        deleted: row.get("deleted")?,
        priority: row.get("priority")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Build a LIKE pattern matching `term` anywhere, with wildcards escaped.
fn contains_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
fn get_task_internal(
    conn: &Connection,
    user_id: i64,
    task_id: i64,
    scope: TaskScope,
) -> Result<Option<Task>> {
    let sql = format!(
        "SELECT * FROM tasks WHERE id = ?1 AND user_id = ?2 AND {}",
        scope.condition()
    );
    let task = conn
        .query_row(&sql, params![task_id, user_id], parse_task_row)
        .optional()?;
    Ok(task)
}

/// Shift the user's pending tasks so `new_priority` is free.
///
/// Must run inside a transaction that already holds the write lock, so no
/// other writer can interleave between reading priorities and applying the
/// shifts. `exclude_task_id` is the task being saved.
pub(crate) fn cascade_priorities(
    conn: &Connection,
    user_id: i64,
    exclude_task_id: Option<i64>,
    new_priority: Priority,
) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, priority FROM tasks
         WHERE user_id = ?1 AND completed = 0 AND deleted = 0 AND id != ?2",
    )?;
    // Row ids start at 1, so 0 excludes nothing for new tasks
    let pending: Vec<(i64, Priority)> = stmt
        .query_map(params![user_id, exclude_task_id.unwrap_or(0)], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let shifts = plan_cascade(&pending, new_priority)?;
    if shifts.is_empty() {
        return Ok(0);
    }

    let now = now_ms();
    let mut update =
        conn.prepare("UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE id = ?3")?;
    for (task_id, priority) in &shifts {
        update.execute(params![priority, now, task_id])?;
    }

    debug!(
        user_id,
        new_priority,
        shifted = shifts.len(),
        "Cascaded task priorities"
    );

    Ok(shifts.len())
}

impl Database {
    /// Create a task for the user, shifting colliding pending priorities.
    pub fn create_task(&self, user_id: i64, new_task: NewTask) -> Result<Task> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            cascade_priorities(&tx, user_id, None, new_task.priority)?;

            tx.execute(
                "INSERT INTO tasks (
                    user_id, title, description, completed, priority, status, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user_id,
                    &new_task.title,
                    &new_task.description,
                    new_task.completed,
                    new_task.priority,
                    new_task.status,
                    now,
                    now,
                ],
            )?;
            let task_id = tx.last_insert_rowid();

            tx.commit()?;

            info!(user_id, task_id, priority = new_task.priority, "Task created");

            Ok(Task {
                id: task_id,
                user_id,
                title: new_task.title,
                description: new_task.description,
                completed: new_task.completed,
                deleted: false,
                priority: new_task.priority,
                status: new_task.status,
                created_at: now,
                updated_at: now,
            })
        })
    }

    /// Get one of the user's non-deleted tasks.
    pub fn get_task(&self, user_id: i64, task_id: i64) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, user_id, task_id, TaskScope::Active))
    }

    /// Get one of the user's tasks restricted to `scope`.
    pub fn get_task_in_scope(
        &self,
        user_id: i64,
        task_id: i64,
        scope: TaskScope,
    ) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, user_id, task_id, scope))
    }

    /// Update a task.
    ///
    /// Cascades priorities when the priority changes or a closed task is
    /// reopened, and records a history entry when the status changes, all in
    /// one transaction.
    pub fn update_task(
        &self,
        user_id: i64,
        task_id: i64,
        scope: TaskScope,
        changes: TaskChanges,
    ) -> Result<Task> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let task = get_task_internal(&tx, user_id, task_id, scope)?
                .ok_or_else(|| ApiError::task_not_found(task_id))?;

            let new_title = changes.title.unwrap_or(task.title.clone());
            let new_description = changes.description.unwrap_or(task.description.clone());
            let new_priority = changes.priority.unwrap_or(task.priority);
            let new_status = changes.status.unwrap_or(task.status);
            let new_completed = changes.completed.unwrap_or(task.completed);

            let reopened = task.completed && !new_completed;
            if new_priority != task.priority || reopened {
                cascade_priorities(&tx, user_id, Some(task_id), new_priority)?;
            }

            if new_status != task.status {
                record_status_change(&tx, task_id, task.status, new_status)?;
                debug!(
                    task_id,
                    from = %task.status,
                    to = %new_status,
                    "Task status changed"
                );
            }

            tx.execute(
                "UPDATE tasks SET title = ?1, description = ?2, priority = ?3, status = ?4,
                 completed = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    &new_title,
                    &new_description,
                    new_priority,
                    new_status,
                    new_completed,
                    now,
                    task_id,
                ],
            )?;

            tx.commit()?;

            Ok(Task {
                title: new_title,
                description: new_description,
                priority: new_priority,
                status: new_status,
                completed: new_completed,
                updated_at: now,
                ..task
            })
        })
    }

    /// Soft-delete a task. Returns false if no matching task exists.
    pub fn soft_delete_task(&self, user_id: i64, task_id: i64, scope: TaskScope) -> Result<bool> {
        let now = now_ms();

        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE tasks SET deleted = 1, updated_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND {}",
                scope.condition()
            );
            let updated = conn.execute(&sql, params![now, task_id, user_id])?;
            if updated > 0 {
                info!(user_id, task_id, "Task deleted");
            }
            Ok(updated > 0)
        })
    }

    /// Mark a pending task as completed. Returns false if no pending task matches.
    pub fn complete_task(&self, user_id: i64, task_id: i64) -> Result<bool> {
        let now = now_ms();

        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE tasks SET completed = 1, updated_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND deleted = 0 AND completed = 0",
                params![now, task_id, user_id],
            )?;
            if updated > 0 {
                info!(user_id, task_id, "Task completed");
            }
            Ok(updated > 0)
        })
    }

    /// List one of the user's task views ordered by priority.
    ///
    /// The completed view also shows completed tasks that were later deleted;
    /// the all view is pending tasks followed by completed ones.
    pub fn list_tasks(
        &self,
        user_id: i64,
        kind: TaskListKind,
        search: Option<&str>,
    ) -> Result<Vec<Task>> {
        match kind {
            TaskListKind::Pending => {
                self.query_tasks(user_id, "deleted = 0 AND completed = 0", search)
            }
            TaskListKind::Completed => self.query_tasks(user_id, "completed = 1", search),
            TaskListKind::All => {
                let mut tasks =
                    self.query_tasks(user_id, "deleted = 0 AND completed = 0", search)?;
                tasks.extend(self.query_tasks(user_id, "completed = 1", search)?);
                Ok(tasks)
            }
        }
    }

    fn query_tasks(&self, user_id: i64, condition: &str, search: Option<&str>) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT * FROM tasks WHERE user_id = ?1 AND {}", condition);
            let mut param_values: Vec<Box<dyn ToSql>> = vec![Box::new(user_id)];

            if let Some(term) = search.filter(|t| !t.is_empty()) {
                sql.push_str(&format!(
                    " AND title LIKE ?{} ESCAPE '\\'",
                    param_values.len() + 1
                ));
                param_values.push(Box::new(contains_pattern(term)));
            }

            sql.push_str(" ORDER BY priority ASC, id ASC");

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn ToSql> = param_values.iter().map(|b| b.as_ref()).collect();
            let tasks = stmt
                .query_map(param_refs.as_slice(), parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Completed and total task counts for the progress bar.
    pub fn task_progress(&self, user_id: i64) -> Result<TaskProgress> {
        self.with_conn(|conn| {
            let (completed_count, pending_count): (i64, i64) = conn.query_row(
                "SELECT
                    COALESCE(SUM(CASE WHEN completed = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN completed = 0 AND deleted = 0 THEN 1 ELSE 0 END), 0)
                 FROM tasks WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            Ok(TaskProgress {
                completed_count,
                total_count: completed_count + pending_count,
            })
        })
    }

    /// List the user's non-deleted tasks matching the API filters.
    pub fn list_tasks_filtered(&self, user_id: i64, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut sql = String::from("SELECT * FROM tasks WHERE user_id = ?1 AND deleted = 0");
            let mut param_values: Vec<Box<dyn ToSql>> = vec![Box::new(user_id)];

            if let Some(ref title) = filter.title {
                sql.push_str(&format!(
                    " AND title LIKE ?{} ESCAPE '\\'",
                    param_values.len() + 1
                ));
                param_values.push(Box::new(contains_pattern(title)));
            }

            if let Some(status) = filter.status {
                sql.push_str(&format!(" AND status = ?{}", param_values.len() + 1));
                param_values.push(Box::new(status));
            }

            if let Some(completed) = filter.completed {
                sql.push_str(&format!(" AND completed = ?{}", param_values.len() + 1));
                param_values.push(Box::new(completed));
            }

            sql.push_str(" ORDER BY id ASC");

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn ToSql> = param_values.iter().map(|b| b.as_ref()).collect();
            let tasks = stmt
                .query_map(param_refs.as_slice(), parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Every non-deleted task, across users.
    pub fn list_all_open_tasks(&self) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM tasks WHERE deleted = 0 ORDER BY id ASC")?;
            let tasks = stmt
                .query_map([], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Count the user's non-deleted tasks with the given status.
    pub fn count_by_status(&self, user_id: i64, status: TaskStatus) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE user_id = ?1 AND deleted = 0 AND status = ?2",
                params![user_id, status],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}
