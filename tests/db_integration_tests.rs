//! Integration tests for the database layer.
//!
//! These tests verify the core database operations using an in-memory SQLite database.
//! Tests are organized by module and functionality.

use task_manager::db::Database;
use task_manager::db::tasks::TaskScope;
use task_manager::error::{ApiError, ErrorCode};
use task_manager::types::{
    HistoryFilter, NewTask, NewUser, PRIORITY_MAX, TaskChanges, TaskFilter, TaskListKind,
    TaskStatus, User,
};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn add_user(db: &Database, username: &str) -> User {
    db.create_user(NewUser {
        username: username.to_string(),
        password: "s3cure-pass".to_string(),
        email: format!("{}@example.com", username),
        ..NewUser::default()
    })
    .expect("Failed to create user")
}

fn new_task(title: &str, priority: u32) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: "description".to_string(),
        priority,
        status: TaskStatus::Pending,
        completed: false,
    }
}

fn priority_of(db: &Database, user: &User, task_id: i64) -> u32 {
    db.get_task(user.id, task_id)
        .unwrap()
        .expect("task should exist")
        .priority
}

mod cascade_tests {
    use super::*;

    #[test]
    fn create_without_collision_keeps_priorities() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let a = db.create_task(user.id, new_task("A", 1)).unwrap();
        let b = db.create_task(user.id, new_task("B", 3)).unwrap();

        assert_eq!(priority_of(&db, &user, a.id), 1);
        assert_eq!(priority_of(&db, &user, b.id), 3);
    }

    #[test]
    fn create_shifts_contiguous_run_until_gap() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let a = db.create_task(user.id, new_task("A", 1)).unwrap();
        let b = db.create_task(user.id, new_task("B", 2)).unwrap();
        let c = db.create_task(user.id, new_task("C", 4)).unwrap();

        let d = db.create_task(user.id, new_task("D", 1)).unwrap();

        assert_eq!(priority_of(&db, &user, d.id), 1);
        assert_eq!(priority_of(&db, &user, a.id), 2);
        assert_eq!(priority_of(&db, &user, b.id), 3);
        assert_eq!(priority_of(&db, &user, c.id), 4);
    }

    #[test]
    fn cascade_ignores_other_users_and_closed_tasks() {
        let db = setup_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let bobs = db.create_task(bob.id, new_task("Bob's", 1)).unwrap();
        let done = db.create_task(alice.id, new_task("Done", 1)).unwrap();
        assert!(db.complete_task(alice.id, done.id).unwrap());
        let gone = db.create_task(alice.id, new_task("Gone", 2)).unwrap();
        assert!(db.soft_delete_task(alice.id, gone.id, TaskScope::Pending).unwrap());

        db.create_task(alice.id, new_task("Fresh", 1)).unwrap();

        assert_eq!(priority_of(&db, &bob, bobs.id), 1);
        assert_eq!(priority_of(&db, &alice, done.id), 1);
        let gone = db.get_task_in_scope(alice.id, gone.id, TaskScope::Active).unwrap();
        assert!(gone.is_none());
    }

    #[test]
    fn update_priority_cascades_but_not_onto_itself() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let a = db.create_task(user.id, new_task("A", 1)).unwrap();
        let b = db.create_task(user.id, new_task("B", 2)).unwrap();

        // Moving A onto B pushes B up
        let changes = TaskChanges {
            priority: Some(2),
            ..TaskChanges::default()
        };
        db.update_task(user.id, a.id, TaskScope::Pending, changes).unwrap();
        assert_eq!(priority_of(&db, &user, a.id), 2);
        assert_eq!(priority_of(&db, &user, b.id), 3);

        // Saving A with its current priority shifts nothing
        let changes = TaskChanges {
            priority: Some(2),
            title: Some("A renamed".to_string()),
            ..TaskChanges::default()
        };
        db.update_task(user.id, a.id, TaskScope::Pending, changes).unwrap();
        assert_eq!(priority_of(&db, &user, b.id), 3);
    }

    #[test]
    fn reopening_a_completed_task_cascades() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let a = db.create_task(user.id, new_task("A", 1)).unwrap();
        assert!(db.complete_task(user.id, a.id).unwrap());
        let b = db.create_task(user.id, new_task("B", 1)).unwrap();

        let changes = TaskChanges {
            completed: Some(false),
            ..TaskChanges::default()
        };
        db.update_task(user.id, a.id, TaskScope::Active, changes).unwrap();

        assert_eq!(priority_of(&db, &user, a.id), 1);
        assert_eq!(priority_of(&db, &user, b.id), 2);
        let pending: Vec<u32> = db
            .list_tasks(user.id, TaskListKind::Pending, None)
            .unwrap()
            .iter()
            .map(|t| t.priority)
            .collect();
        assert_eq!(pending, vec![1, 2]);
    }

    #[test]
    fn cascade_past_the_ceiling_fails_without_changes() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let top = db.create_task(user.id, new_task("Top", PRIORITY_MAX)).unwrap();
        let err = db
            .create_task(user.id, new_task("Also top", PRIORITY_MAX))
            .unwrap_err();
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::InvalidFieldValue);

        assert_eq!(priority_of(&db, &user, top.id), PRIORITY_MAX);
        let pending = db.list_tasks(user.id, TaskListKind::Pending, None).unwrap();
        assert_eq!(pending.len(), 1);
    }
}

mod task_tests {
    use super::*;

    #[test]
    fn update_of_missing_task_is_not_found() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let err = db
            .update_task(user.id, 999, TaskScope::Active, TaskChanges::default())
            .unwrap_err();
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::TaskNotFound);
    }

    #[test]
    fn tasks_are_private_to_their_owner() {
        let db = setup_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let task = db.create_task(alice.id, new_task("Secret", 1)).unwrap();

        assert!(db.get_task(bob.id, task.id).unwrap().is_none());
        assert!(!db.soft_delete_task(bob.id, task.id, TaskScope::Active).unwrap());
        assert!(!db.complete_task(bob.id, task.id).unwrap());
    }

    #[test]
    fn pending_scope_excludes_completed_tasks() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let task = db.create_task(user.id, new_task("Finish me", 1)).unwrap();
        assert!(db.complete_task(user.id, task.id).unwrap());
        assert!(!db.complete_task(user.id, task.id).unwrap());

        let pending = db
            .get_task_in_scope(user.id, task.id, TaskScope::Pending)
            .unwrap();
        assert!(pending.is_none());
        assert!(db.get_task(user.id, task.id).unwrap().unwrap().completed);
    }

    #[test]
    fn soft_delete_keeps_the_row() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let task = db.create_task(user.id, new_task("Delete me", 1)).unwrap();
        assert!(db.soft_delete_task(user.id, task.id, TaskScope::Active).unwrap());
        assert!(!db.soft_delete_task(user.id, task.id, TaskScope::Active).unwrap());

        assert!(db.get_task(user.id, task.id).unwrap().is_none());
        let all = db.list_tasks(user.id, TaskListKind::All, None).unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn lists_order_by_priority_and_split_by_state() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let low = db.create_task(user.id, new_task("Low", 5)).unwrap();
        let high = db.create_task(user.id, new_task("High", 1)).unwrap();
        let done = db.create_task(user.id, new_task("Done", 3)).unwrap();
        db.complete_task(user.id, done.id).unwrap();

        let pending: Vec<i64> = db
            .list_tasks(user.id, TaskListKind::Pending, None)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(pending, vec![high.id, low.id]);

        let completed = db.list_tasks(user.id, TaskListKind::Completed, None).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done.id);

        let all: Vec<i64> = db
            .list_tasks(user.id, TaskListKind::All, None)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(all, vec![high.id, low.id, done.id]);
    }

    #[test]
    fn completed_list_keeps_deleted_completed_tasks() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let task = db.create_task(user.id, new_task("Archived", 1)).unwrap();
        db.complete_task(user.id, task.id).unwrap();
        db.soft_delete_task(user.id, task.id, TaskScope::Active).unwrap();

        let completed = db.list_tasks(user.id, TaskListKind::Completed, None).unwrap();
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn search_matches_substrings_case_insensitively() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        db.create_task(user.id, new_task("WRITE THE REPORT", 1)).unwrap();
        db.create_task(user.id, new_task("BUY 100% JUICE", 2)).unwrap();

        let found = db
            .list_tasks(user.id, TaskListKind::Pending, Some("report"))
            .unwrap();
        assert_eq!(found.len(), 1);

        let found = db
            .list_tasks(user.id, TaskListKind::Pending, Some("%"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "BUY 100% JUICE");
    }

    #[test]
    fn progress_counts_completed_and_pending() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let a = db.create_task(user.id, new_task("A", 1)).unwrap();
        db.create_task(user.id, new_task("B", 2)).unwrap();
        let c = db.create_task(user.id, new_task("C", 3)).unwrap();
        db.complete_task(user.id, a.id).unwrap();
        db.soft_delete_task(user.id, c.id, TaskScope::Active).unwrap();

        let progress = db.task_progress(user.id).unwrap();
        assert_eq!(progress.completed_count, 1);
        assert_eq!(progress.total_count, 2);
    }

    #[test]
    fn filtered_listing_applies_every_filter() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let mut started = new_task("Started work", 1);
        started.status = TaskStatus::InProgress;
        let started = db.create_task(user.id, started).unwrap();
        db.create_task(user.id, new_task("Other work", 2)).unwrap();

        let filter = TaskFilter {
            title: Some("work".to_string()),
            status: Some(TaskStatus::InProgress),
            completed: Some(false),
        };
        let tasks = db.list_tasks_filtered(user.id, &filter).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, started.id);
    }

    #[test]
    fn open_tasks_span_users() {
        let db = setup_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        db.create_task(alice.id, new_task("A", 1)).unwrap();
        let gone = db.create_task(bob.id, new_task("B", 1)).unwrap();
        db.create_task(bob.id, new_task("C", 2)).unwrap();
        db.soft_delete_task(bob.id, gone.id, TaskScope::Active).unwrap();

        assert_eq!(db.list_all_open_tasks().unwrap().len(), 2);
    }

    #[test]
    fn count_by_status_skips_deleted() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        db.create_task(user.id, new_task("A", 1)).unwrap();
        let b = db.create_task(user.id, new_task("B", 2)).unwrap();
        db.soft_delete_task(user.id, b.id, TaskScope::Active).unwrap();

        assert_eq!(db.count_by_status(user.id, TaskStatus::Pending).unwrap(), 1);
        assert_eq!(db.count_by_status(user.id, TaskStatus::Cancelled).unwrap(), 0);
    }
}

mod history_tests {
    use super::*;

    fn set_status(db: &Database, user: &User, task_id: i64, status: TaskStatus) {
        let changes = TaskChanges {
            status: Some(status),
            ..TaskChanges::default()
        };
        db.update_task(user.id, task_id, TaskScope::Active, changes)
            .unwrap();
    }

    #[test]
    fn status_changes_are_recorded_in_order() {
        let db = setup_db();
        let user = add_user(&db, "alice");
        let task = db.create_task(user.id, new_task("Track me", 1)).unwrap();

        set_status(&db, &user, task.id, TaskStatus::InProgress);
        set_status(&db, &user, task.id, TaskStatus::Completed);

        let history = db
            .task_history(user.id, task.id, &HistoryFilter::default())
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].previous_status, TaskStatus::Pending);
        assert_eq!(history[0].current_status, TaskStatus::InProgress);
        assert_eq!(history[1].previous_status, TaskStatus::InProgress);
        assert_eq!(history[1].current_status, TaskStatus::Completed);
    }

    #[test]
    fn creation_and_unchanged_status_record_nothing() {
        let db = setup_db();
        let user = add_user(&db, "alice");
        let task = db.create_task(user.id, new_task("Quiet", 1)).unwrap();

        set_status(&db, &user, task.id, TaskStatus::Pending);
        let changes = TaskChanges {
            title: Some("Still quiet".to_string()),
            ..TaskChanges::default()
        };
        db.update_task(user.id, task.id, TaskScope::Active, changes)
            .unwrap();

        let history = db
            .task_history(user.id, task.id, &HistoryFilter::default())
            .unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn history_filters_and_visibility() {
        let db = setup_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let task = db.create_task(alice.id, new_task("Filter me", 1)).unwrap();

        set_status(&db, &alice, task.id, TaskStatus::InProgress);
        set_status(&db, &alice, task.id, TaskStatus::Cancelled);

        let filter = HistoryFilter {
            current_status: Some(TaskStatus::Cancelled),
            ..HistoryFilter::default()
        };
        let history = db.task_history(alice.id, task.id, &filter).unwrap();
        assert_eq!(history.len(), 1);

        let exact = HistoryFilter {
            updated_at: Some(history[0].updated_at),
            previous_status: Some(TaskStatus::InProgress),
            ..HistoryFilter::default()
        };
        assert_eq!(db.task_history(alice.id, task.id, &exact).unwrap().len(), 1);

        let bobs_view = db
            .task_history(bob.id, task.id, &HistoryFilter::default())
            .unwrap();
        assert!(bobs_view.is_empty());

        db.soft_delete_task(alice.id, task.id, TaskScope::Active).unwrap();
        let after_delete = db
            .task_history(alice.id, task.id, &HistoryFilter::default())
            .unwrap();
        assert!(after_delete.is_empty());
    }
}

mod user_tests {
    use super::*;

    #[test]
    fn duplicate_username_is_rejected() {
        let db = setup_db();
        add_user(&db, "alice");

        let err = db
            .create_user(NewUser {
                username: "alice".to_string(),
                password: "another-pass".to_string(),
                ..NewUser::default()
            })
            .unwrap_err();
        let api: ApiError = err.into();
        assert_eq!(api.code, ErrorCode::AlreadyExists);
        assert_eq!(api.field.as_deref(), Some("username"));
    }

    #[test]
    fn authenticate_checks_password() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let found = db.authenticate("alice", "s3cure-pass").unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(db.authenticate("alice", "wrong-pass").unwrap().is_none());
        assert!(db.authenticate("nobody", "s3cure-pass").unwrap().is_none());
    }

    #[test]
    fn sessions_resolve_until_deleted_or_expired() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let key = db.create_session(user.id, 60_000).unwrap();
        assert_eq!(db.session_user(&key).unwrap().map(|u| u.id), Some(user.id));
        assert!(db.delete_session(&key).unwrap());
        assert!(db.session_user(&key).unwrap().is_none());

        let expired = db.create_session(user.id, -1).unwrap();
        assert!(db.session_user(&expired).unwrap().is_none());
    }

    #[test]
    fn token_is_stable_per_user() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let first = db.get_or_create_token(user.id).unwrap();
        let second = db.get_or_create_token(user.id).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.token_user(&first).unwrap().map(|u| u.id), Some(user.id));
        assert!(db.token_user("bogus").unwrap().is_none());
    }

    #[test]
    fn lookup_by_username() {
        let db = setup_db();
        let user = add_user(&db, "alice");
        assert_eq!(db.get_user_by_username("alice").unwrap(), Some(user));
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }
}

mod preference_tests {
    use super::*;

    #[test]
    fn new_users_get_default_preferences() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let prefs = db.email_preferences(user.id).unwrap().unwrap();
        assert_eq!(prefs.selected_email_hour, 0);
        assert_eq!(prefs.previous_report_day, 0);
    }

    #[test]
    fn update_hour_validates_range_and_user() {
        let db = setup_db();
        let user = add_user(&db, "alice");

        let prefs = db.update_email_hour(user.id, 17).unwrap();
        assert_eq!(prefs.selected_email_hour, 17);

        let api: ApiError = db.update_email_hour(user.id, 24).unwrap_err().into();
        assert_eq!(api.code, ErrorCode::InvalidFieldValue);

        let api: ApiError = db.update_email_hour(999, 5).unwrap_err().into();
        assert_eq!(api.code, ErrorCode::UserNotFound);
    }

    #[test]
    fn due_preferences_respect_hour_and_day() {
        let db = setup_db();
        let early = add_user(&db, "early");
        let late = add_user(&db, "late");
        db.update_email_hour(early.id, 8).unwrap();
        db.update_email_hour(late.id, 20).unwrap();

        let due: Vec<i64> = db
            .due_report_preferences(9, 15)
            .unwrap()
            .iter()
            .map(|p| p.user_id)
            .collect();
        assert_eq!(due, vec![early.id]);

        db.mark_report_sent(early.id, 15).unwrap();
        assert!(db.due_report_preferences(9, 15).unwrap().is_empty());
        assert_eq!(db.due_report_preferences(9, 16).unwrap().len(), 1);
    }
}
