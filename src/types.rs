//! Core types for the task manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Task priority. Lower numbers are listed first.
pub type Priority = u32;

/// Priority given to tasks created without one.
pub const PRIORITY_DEFAULT: Priority = 1;

/// Largest priority a task may hold.
pub const PRIORITY_MAX: Priority = i32::MAX as Priority;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Every status, in the order reports and choice lists show them.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "CANCELLED" => Ok(TaskStatus::Cancelled),
            other => Err(format!("\"{}\" is not a valid choice", other)),
        }
    }
}

/// A task owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub deleted: bool,
    pub priority: Priority,
    pub status: TaskStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Pending tasks are neither completed nor deleted.
    pub fn is_pending(&self) -> bool {
        !self.completed && !self.deleted
    }
}

/// Fields for a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub completed: bool,
}

fn default_priority() -> Priority {
    PRIORITY_DEFAULT
}

/// Partial update of a task. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub completed: Option<bool>,
}

impl From<NewTask> for TaskChanges {
    fn from(task: NewTask) -> Self {
        Self {
            title: Some(task.title),
            description: Some(task.description),
            priority: Some(task.priority),
            status: Some(task.status),
            completed: Some(task.completed),
        }
    }
}

/// A recorded status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHistory {
    pub id: i64,
    pub task_id: i64,
    pub previous_status: TaskStatus,
    pub current_status: TaskStatus,
    pub updated_at: i64,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_joined: i64,
}

/// Public subset of a user embedded in API task output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
        }
    }
}

/// Fields for registering a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Per-user report schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailPreferences {
    pub user_id: i64,
    /// Local hour (0-23) after which the daily report may be sent.
    pub selected_email_hour: u32,
    /// Day of month the last report went out, 0 if never.
    pub previous_report_day: u32,
}

/// Completion counts shown alongside task lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub completed_count: i64,
    pub total_count: i64,
}

/// Filters accepted by the task API listing.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Case-insensitive substring match on the title.
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub completed: Option<bool>,
}

/// Filters accepted by the history API listing.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Exact match on the transition timestamp (ms).
    pub updated_at: Option<i64>,
    pub previous_status: Option<TaskStatus>,
    pub current_status: Option<TaskStatus>,
}

/// Which of a user's task lists to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskListKind {
    Pending,
    Completed,
    All,
}

/// One page of a list.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub total: usize,
}

impl<T> Page<T> {
    /// Slice `items` into pages of `page_size`. Out-of-range page numbers
    /// clamp to the last page; page numbers start at 1.
    pub fn paginate(items: Vec<T>, page: usize, page_size: usize) -> Self {
        let total = items.len();
        let page_size = page_size.max(1);
        let num_pages = total.div_ceil(page_size).max(1);
        let number = page.clamp(1, num_pages);
        let items = items
            .into_iter()
            .skip((number - 1) * page_size)
            .take(page_size)
            .collect();
        Self {
            items,
            number,
            num_pages,
            total,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<TaskStatus>().is_err());
        assert!("pending".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn paginate_clamps_page_numbers() {
        let page = Page::paginate((1..=12).collect::<Vec<_>>(), 9, 5);
        assert_eq!(page.number, 3);
        assert_eq!(page.num_pages, 3);
        assert_eq!(page.items, vec![11, 12]);
        assert!(page.has_previous());
        assert!(!page.has_next());

        let first = Page::paginate((1..=12).collect::<Vec<_>>(), 0, 5);
        assert_eq!(first.number, 1);
        assert_eq!(first.items, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn paginate_empty_list_has_one_page() {
        let page: Page<i32> = Page::paginate(Vec::new(), 1, 5);
        assert_eq!(page.num_pages, 1);
        assert!(page.items.is_empty());
        assert!(!page.has_next());
    }
}
