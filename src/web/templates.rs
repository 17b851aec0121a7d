//! HTML templates for the web pages.
//!
//! Templates are embedded at compile time using `include_str!` and filled by
//! plain placeholder substitution.

use crate::types::User;
use chrono::{DateTime, Local};

/// The base HTML template with navigation and layout.
pub const BASE_TEMPLATE: &str = include_str!("templates/base.html");

/// The static about page body.
pub const ABOUT_TEMPLATE: &str = include_str!("templates/about.html");

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn nav(user: Option<&User>) -> String {
    match user {
        Some(user) => format!(
            r#"<a href="/tasks">Pending</a><a href="/completed_tasks">Completed</a><a href="/all_tasks">All</a><a href="/create-task">New task</a><a href="/update-email-pref/{}">Email report</a><a href="/about">About</a>"#,
            user.id
        ),
        None => r#"<a href="/user/login">Log in</a><a href="/user/signup">Sign up</a><a href="/about">About</a>"#
            .to_string(),
    }
}

fn user_box(user: Option<&User>) -> String {
    match user {
        Some(user) => format!(
            r#"{} <form method="post" action="/user/logout" style="display:inline"><button type="submit">Log out</button></form>"#,
            html_escape(&user.username)
        ),
        None => String::new(),
    }
}

/// Render a full page around `content`, which must already be escaped.
pub fn render_page(
    title: &str,
    user: Option<&User>,
    now: DateTime<Local>,
    content: &str,
) -> String {
    BASE_TEMPLATE
        .replace("{{title}}", &html_escape(title))
        .replace("{{nav}}", &nav(user))
        .replace("{{user}}", &user_box(user))
        .replace(
            "{{current_time}}",
            &now.format("%Y-%m-%d %H:%M:%S").to_string(),
        )
        .replace("{{content}}", content)
}

/// Render a `<ul class="errorlist">` for a field, or nothing.
pub fn error_list(messages: &[String]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let items: String = messages
        .iter()
        .map(|m| format!("<li>{}</li>", html_escape(m)))
        .collect();
    format!(r#"<ul class="errorlist">{}</ul>"#, items)
}
