//! Status transition history.

use super::{Database, now_ms};
use crate::types::{HistoryFilter, TaskHistory, TaskStatus};
use anyhow::Result;
use rusqlite::{Connection, params};

/// Record a status change for a task.
///
/// Called from the task update path inside its transaction, only when the
/// stored status differs from the one being saved.
pub(crate) fn record_status_change(
    conn: &Connection,
    task_id: i64,
    previous: TaskStatus,
    current: TaskStatus,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO task_history (task_id, previous_status, current_status, updated_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![task_id, previous, current, now_ms()],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    /// Get the status history of one of the user's non-deleted tasks.
    ///
    /// Tasks that are deleted or owned by someone else yield an empty list.
    pub fn task_history(
        &self,
        user_id: i64,
        task_id: i64,
        filter: &HistoryFilter,
    ) -> Result<Vec<TaskHistory>> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT h.id, h.task_id, h.previous_status, h.current_status, h.updated_at
                 FROM task_history h
                 INNER JOIN tasks t ON t.id = h.task_id
                 WHERE h.task_id = ?1 AND t.user_id = ?2 AND t.deleted = 0",
            );
            let mut param_values: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(task_id), Box::new(user_id)];

            if let Some(ts) = filter.updated_at {
                sql.push_str(&format!(" AND h.updated_at = ?{}", param_values.len() + 1));
                param_values.push(Box::new(ts));
            }

            if let Some(status) = filter.previous_status {
                sql.push_str(&format!(
                    " AND h.previous_status = ?{}",
                    param_values.len() + 1
                ));
                param_values.push(Box::new(status));
            }

            if let Some(status) = filter.current_status {
                sql.push_str(&format!(
                    " AND h.current_status = ?{}",
                    param_values.len() + 1
                ));
                param_values.push(Box::new(status));
            }

            sql.push_str(" ORDER BY h.id ASC");

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::ToSql> =
                param_values.iter().map(|b| b.as_ref()).collect();

            let events = stmt
                .query_map(param_refs.as_slice(), |row| {
                    Ok(TaskHistory {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        previous_status: row.get(2)?,
                        current_status: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(events)
        })
    }
}
