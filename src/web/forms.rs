//! Form input and validation for the HTML pages.

use crate::db::preferences::MAX_EMAIL_HOUR;
use crate::error::ApiError;
use crate::types::{NewTask, NewUser, PRIORITY_MAX, Priority, TaskStatus};
use serde::Deserialize;
use thiserror::Error;

/// Longest title a task may have.
pub const TITLE_MAX_LEN: usize = 100;
/// Shortest title the task form accepts.
pub const TITLE_MIN_LEN: usize = 10;
/// Longest username.
pub const USERNAME_MAX_LEN: usize = 150;
/// Shortest password.
pub const PASSWORD_MIN_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("This field is required.")]
    Required,
    #[error("Ensure this value has at most {0} characters.")]
    TooLong(usize),
    #[error("Error: Length must be 10 characters")]
    TitleTooShort,
    #[error("Enter a whole number.")]
    NotAnInteger,
    #[error("Ensure this value is greater than or equal to 0.")]
    Negative,
    #[error("Ensure this value is less than or equal to {0}.")]
    TooLarge(Priority),
    #[error("Select a valid choice. {0} is not one of the available choices.")]
    InvalidChoice(String),
    #[error("Error: hour must be from 0 to 23")]
    HourOutOfRange,
    #[error("Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.")]
    InvalidUsername,
    #[error("A user with that username already exists.")]
    UsernameTaken,
    #[error("This password is too short. It must contain at least 8 characters.")]
    PasswordTooShort,
    #[error("This password is entirely numeric.")]
    PasswordNumeric,
    #[error("The password is too similar to the username.")]
    PasswordTooSimilar,
    #[error("The two password fields didn't match.")]
    PasswordMismatch,
    #[error("Enter a valid email address.")]
    InvalidEmail,
    #[error("Please enter a correct username and password. Note that both fields may be case-sensitive.")]
    InvalidLogin,
}

/// Validation errors keyed by field name. `__all__` holds form-wide errors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors {
    errors: Vec<(&'static str, FormError)>,
}

impl FormErrors {
    pub fn add(&mut self, field: &'static str, error: FormError) {
        self.errors.push((field, error));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Messages for one field.
    pub fn for_field(&self, field: &str) -> Vec<String> {
        self.errors
            .iter()
            .filter(|(name, _)| *name == field)
            .map(|(_, error)| error.to_string())
            .collect()
    }

    pub fn contains(&self, field: &str, error: &FormError) -> bool {
        self.errors.iter().any(|(name, e)| *name == field && e == error)
    }

    pub fn single(field: &'static str, error: FormError) -> Self {
        let mut errors = Self::default();
        errors.add(field, error);
        errors
    }
}

impl From<FormErrors> for ApiError {
    fn from(errors: FormErrors) -> Self {
        match errors.errors.into_iter().next() {
            Some((field, FormError::Required)) => ApiError::missing_field(field),
            Some((field, error)) => ApiError::invalid_value(field, error.to_string()),
            None => ApiError::internal("empty validation error"),
        }
    }
}

/// Check the length limits every stored title must respect.
pub fn check_title(title: &str) -> Result<(), FormError> {
    let len = title.chars().count();
    if len == 0 {
        Err(FormError::Required)
    } else if len > TITLE_MAX_LEN {
        Err(FormError::TooLong(TITLE_MAX_LEN))
    } else {
        Ok(())
    }
}

/// Check the upper bound every stored priority must respect.
pub fn check_priority(priority: Priority) -> Result<Priority, FormError> {
    if priority > PRIORITY_MAX {
        Err(FormError::TooLarge(PRIORITY_MAX))
    } else {
        Ok(priority)
    }
}

fn parse_priority(raw: &str) -> Result<Priority, FormError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FormError::Required);
    }
    let value: i64 = raw.parse().map_err(|_| FormError::NotAnInteger)?;
    if value < 0 {
        return Err(FormError::Negative);
    }
    if value > PRIORITY_MAX as i64 {
        return Err(FormError::TooLarge(PRIORITY_MAX));
    }
    check_priority(value as Priority)
}

fn parse_status(raw: &str) -> Result<TaskStatus, FormError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FormError::Required);
    }
    raw.parse()
        .map_err(|_| FormError::InvalidChoice(raw.to_string()))
}

fn checkbox(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some("on" | "true" | "1"))
}

/// Submitted task create/update form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub status: String,
    /// Browsers omit unchecked checkboxes.
    #[serde(default)]
    pub completed: Option<String>,
}

impl TaskForm {
    /// Validate the form. Titles must be at least ten characters and are
    /// stored upper-cased.
    pub fn validate(&self) -> Result<NewTask, FormErrors> {
        let mut errors = FormErrors::default();

        let title = self.title.trim();
        let title = match check_title(title) {
            Ok(()) if title.chars().count() < TITLE_MIN_LEN => {
                errors.add("title", FormError::TitleTooShort);
                None
            }
            Ok(()) => Some(title.to_uppercase()),
            Err(e) => {
                errors.add("title", e);
                None
            }
        };

        let description = self.description.trim();
        if description.is_empty() {
            errors.add("description", FormError::Required);
        }

        let priority = parse_priority(&self.priority)
            .map_err(|e| errors.add("priority", e))
            .ok();

        let status = parse_status(&self.status)
            .map_err(|e| errors.add("status", e))
            .ok();

        match (title, priority, status) {
            (Some(title), Some(priority), Some(status)) if errors.is_empty() => Ok(NewTask {
                title,
                description: description.to_string(),
                priority,
                status,
                completed: checkbox(&self.completed),
            }),
            _ => Err(errors),
        }
    }
}

/// Submitted report preferences form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailPreferencesForm {
    #[serde(default)]
    pub selected_email_hour: String,
}

impl EmailPreferencesForm {
    pub fn validate(&self) -> Result<u32, FormErrors> {
        let raw = self.selected_email_hour.trim();
        if raw.is_empty() {
            return Err(FormErrors::single("selected_email_hour", FormError::Required));
        }
        let hour: i64 = raw
            .parse()
            .map_err(|_| FormErrors::single("selected_email_hour", FormError::NotAnInteger))?;
        if !(0..=MAX_EMAIL_HOUR as i64).contains(&hour) {
            return Err(FormErrors::single(
                "selected_email_hour",
                FormError::HourOutOfRange,
            ));
        }
        Ok(hour as u32)
    }
}

/// Submitted login form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();
        if self.username.trim().is_empty() {
            errors.add("username", FormError::Required);
        }
        if self.password.is_empty() {
            errors.add("password", FormError::Required);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Only same-site absolute paths are followed after login. Browsers read a
/// backslash as a slash, so any path containing one is refused.
pub fn safe_redirect(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path
        }
        _ => "/tasks",
    }
}

/// Submitted signup form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

fn valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

impl SignupForm {
    /// Validate everything except username uniqueness, which needs the database.
    pub fn validate(&self) -> Result<NewUser, FormErrors> {
        let mut errors = FormErrors::default();

        let username = self.username.trim();
        if username.is_empty() {
            errors.add("username", FormError::Required);
        } else if username.chars().count() > USERNAME_MAX_LEN {
            errors.add("username", FormError::TooLong(USERNAME_MAX_LEN));
        } else if !valid_username(username) {
            errors.add("username", FormError::InvalidUsername);
        }

        let email = self.email.trim();
        if !email.is_empty() && !email.contains('@') {
            errors.add("email", FormError::InvalidEmail);
        }

        if self.password1.is_empty() {
            errors.add("password1", FormError::Required);
        }
        if self.password2.is_empty() {
            errors.add("password2", FormError::Required);
        }

        if !self.password1.is_empty() && !self.password2.is_empty() {
            if self.password1 != self.password2 {
                errors.add("password2", FormError::PasswordMismatch);
            } else {
                let password = &self.password1;
                if password.chars().count() < PASSWORD_MIN_LEN {
                    errors.add("password2", FormError::PasswordTooShort);
                }
                if password.chars().all(|c| c.is_ascii_digit()) {
                    errors.add("password2", FormError::PasswordNumeric);
                }
                let lower_user = username.to_lowercase();
                let lower_pass = password.to_lowercase();
                if lower_user.chars().count() >= 3
                    && (lower_pass.contains(&lower_user) || lower_user.contains(&lower_pass))
                {
                    errors.add("password2", FormError::PasswordTooSimilar);
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(NewUser {
            username: username.to_string(),
            password: self.password1.clone(),
            email: email.to_string(),
            ..NewUser::default()
        })
    }
}
