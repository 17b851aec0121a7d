//! Daily task report emails and the hourly job that sends them.

pub mod mailer;

pub use mailer::{EmailMessage, LogMailer, Mailer, MemoryMailer};

use crate::config::EmailConfig;
use crate::db::Database;
use crate::types::{TaskStatus, User};
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, TimeZone, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Build the report email for a user.
pub fn compose_report(db: &Database, user: &User, email: &EmailConfig) -> Result<EmailMessage> {
    let mut body = String::from("Task Manager Report\n");
    for status in TaskStatus::ALL {
        let count = db.count_by_status(user.id, status)?;
        body.push_str(&format!("{} tasks: {}\n", status, count));
    }

    Ok(EmailMessage {
        subject: email.subject.clone(),
        body,
        from: email.from_address.clone(),
        to: vec![user.email.clone()],
    })
}

/// Send every report due at `hour` on day-of-month `day`.
///
/// Returns the number of reports delivered. A report that cannot be built or
/// delivered leaves the preference untouched so the next run tries again.
pub async fn run_due_reports(
    db: &Database,
    mailer: &dyn Mailer,
    email: &EmailConfig,
    hour: u32,
    day: u32,
) -> Result<usize> {
    let due = db.due_report_preferences(hour, day)?;
    debug!(hour, day, due = due.len(), "Checking email preferences");

    let mut sent = 0;
    for prefs in due {
        let Some(user) = db.get_user(prefs.user_id)? else {
            continue;
        };

        if user.email.is_empty() {
            warn!(user_id = user.id, "Skipping report for user without email address");
            db.mark_report_sent(user.id, day)?;
            continue;
        }

        info!(user_id = user.id, username = %user.username, "Starting to send report");
        let message = match compose_report(db, &user, email) {
            Ok(message) => message,
            Err(e) => {
                error!(user_id = user.id, error = %e, "Failed to build report");
                continue;
            }
        };
        match mailer.send(&message).await {
            Ok(()) => {
                db.mark_report_sent(user.id, day)?;
                sent += 1;
                info!(user_id = user.id, "Report sent");
            }
            Err(e) => {
                error!(user_id = user.id, error = %e, "Failed to send report");
            }
        }
    }

    Ok(sent)
}

/// Run the report check for the given local time.
pub async fn run_reports_at(
    db: &Database,
    mailer: &dyn Mailer,
    email: &EmailConfig,
    now: DateTime<Local>,
) -> Result<usize> {
    run_due_reports(db, mailer, email, now.hour(), now.day()).await
}

/// Time left until the next full hour.
pub fn until_next_hour<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let into_hour = ChronoDuration::minutes(now.minute() as i64)
        + ChronoDuration::seconds(now.second() as i64)
        + ChronoDuration::nanoseconds(now.nanosecond() as i64 % 1_000_000_000);
    (ChronoDuration::hours(1) - into_hour)
        .to_std()
        .unwrap_or(Duration::from_secs(3600))
}

/// Handle for the background report job.
pub struct ReportSchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ReportSchedulerHandle {
    /// Stop the job and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

/// Start the hourly report job. It wakes at the top of every hour and sends
/// the reports that are due.
pub fn start_report_scheduler(
    db: Arc<Database>,
    mailer: Arc<dyn Mailer>,
    email: EmailConfig,
) -> ReportSchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        info!("Report scheduler started");
        loop {
            let delay = until_next_hour(&Local::now());
            debug!(secs = delay.as_secs(), "Report scheduler sleeping");

            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Report scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match run_reports_at(&db, mailer.as_ref(), &email, Local::now()).await {
                Ok(sent) => info!(sent, "Hourly report check finished"),
                Err(e) => error!(error = %e, "Hourly report check failed"),
            }
        }
    });

    ReportSchedulerHandle {
        shutdown_tx: Some(shutdown_tx),
        join,
    }
}
