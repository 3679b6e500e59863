//! Phone notification payloads: validation, clipping, and desktop formatting.

use serde::Deserialize;

use crate::{error::ApiError, system::DesktopNotification};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_TEXT_CHARS: usize = 500;
pub const MAX_APP_NAME_CHARS: usize = 200;

const UNKNOWN_APP: &str = "unknown_app";

/// Body of `POST /phone-notification`. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationPayload {
    pub package_name: Option<String>,
    pub title: Option<String>,
    pub text: Option<String>,
    /// Opaque to the daemon; only logged.
    pub posted_at: Option<serde_json::Value>,
}

/// A notification that passed validation. Fields are trimmed and clipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNotification {
    pub app_name: String,
    pub title: String,
    pub text: String,
}

impl NotificationPayload {
    pub fn validate(&self) -> Result<PhoneNotification, ApiError> {
        let app_name = clip(self.package_name.as_deref(), MAX_APP_NAME_CHARS);
        let title = clip(self.title.as_deref(), MAX_TITLE_CHARS);
        let text = clip(self.text.as_deref(), MAX_TEXT_CHARS);

        if title.is_empty() && text.is_empty() {
            return Err(ApiError::bad_request("Missing title/text"));
        }

        Ok(PhoneNotification {
            app_name: if app_name.is_empty() {
                UNKNOWN_APP.to_owned()
            } else {
                app_name
            },
            title,
            text,
        })
    }
}

impl PhoneNotification {
    /// Desktop popup: `Phone: <title>` over the text, falling back to the
    /// app name when the phone sent a title only.
    pub fn to_desktop(&self) -> DesktopNotification {
        let summary = if self.title.is_empty() {
            "Phone notification".to_owned()
        } else {
            format!("Phone: {}", self.title)
        };
        let body = if self.text.is_empty() {
            &self.app_name
        } else {
            &self.text
        };
        DesktopNotification::new(summary, body.as_str())
    }
}

fn clip(value: Option<&str>, max_chars: usize) -> String {
    truncate_chars(value.unwrap_or_default().trim(), max_chars).to_owned()
}

/// Keep at most `max_chars` Unicode scalar values of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
