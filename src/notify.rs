//! Local notifications: replay outcomes, push messages, and click routing.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::NotificationConfig;
use crate::queue::{QueueCategory, QueuedOperation};

const GENERIC_TITLE: &str = "Storefront";
const GENERIC_BODY: &str = "You have a new update.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  /// Notifications with the same tag replace each other
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,
  #[serde(skip_serializing_if = "Value::is_null")]
  pub data: Value,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// Incoming push message. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub data: Option<Value>,
}

impl PushPayload {
  /// Decode a push body field by field. A field of the wrong type is treated
  /// as absent; empty or malformed payloads decode to all-absent fields.
  pub fn decode(raw: &[u8]) -> Self {
    if raw.iter().all(u8::is_ascii_whitespace) {
      return Self::default();
    }
    let value: Value = match serde_json::from_slice(raw) {
      Ok(value) => value,
      Err(e) => {
        warn!(error = %e, "undecodable push payload, using generic message");
        return Self::default();
      }
    };

    let text = |field: &str| match value.get(field) {
      Some(Value::String(s)) => Some(s.clone()),
      Some(other) => {
        warn!(field, value = %other, "push field is not a string, ignored");
        None
      }
      None => None,
    };

    Self {
      title: text("title"),
      body: text("body"),
      data: value.get("data").filter(|d| !d.is_null()).cloned(),
    }
  }
}

/// Action chosen on a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
  Explore,
  Close,
  Default,
}

impl ClickAction {
  pub fn parse(action: Option<&str>) -> Self {
    match action {
      Some("explore") => ClickAction::Explore,
      Some("close") => ClickAction::Close,
      _ => ClickAction::Default,
    }
  }
}

/// What the host should do after a notification click. The notification is always closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
  /// Only dismiss the notification
  Dismiss,
  /// Focus an open window on this path, or open one
  FocusOrOpen { path: String },
}

pub struct NotificationEmitter {
  config: NotificationConfig,
}

impl NotificationEmitter {
  pub fn new(config: NotificationConfig) -> Self {
    Self { config }
  }

  /// Notification for one confirmed replay.
  pub fn replay_success(&self, op: &QueuedOperation) -> Notification {
    let (title, body) = match op.category {
      QueueCategory::Cart => ("Cart synced", "Your cart changes have been saved."),
      QueueCategory::Order => ("Order placed", "Your order was sent successfully."),
      QueueCategory::Wishlist => {
        ("Wishlist synced", "Your wishlist changes have been saved.")
      }
    };

    Notification {
      title: title.to_string(),
      body: body.to_string(),
      icon: self.config.icon.clone(),
      tag: Some(op.category.sync_tag().to_string()),
      data: serde_json::json!({ "operationId": op.id }),
      actions: Vec::new(),
    }
  }

  pub fn push(&self, payload: PushPayload) -> Notification {
    Notification {
      title: payload.title.unwrap_or_else(|| GENERIC_TITLE.to_string()),
      body: payload.body.unwrap_or_else(|| GENERIC_BODY.to_string()),
      icon: self.config.icon.clone(),
      tag: None,
      data: payload.data.unwrap_or(Value::Null),
      actions: vec![
        NotificationAction {
          action: "explore".to_string(),
          title: "Open".to_string(),
        },
        NotificationAction {
          action: "close".to_string(),
          title: "Close".to_string(),
        },
      ],
    }
  }

  /// Route a click. `data` is the clicked notification's data, if any.
  pub fn click(&self, action: &ClickAction, data: Option<&Value>) -> ClickEffect {
    match action {
      ClickAction::Close => ClickEffect::Dismiss,
      ClickAction::Explore => {
        let path = data
          .and_then(|d| d.get("url"))
          .and_then(Value::as_str)
          .unwrap_or(self.config.explore_path.as_str());
        ClickEffect::FocusOrOpen {
          path: path.to_string(),
        }
      }
      ClickAction::Default => ClickEffect::FocusOrOpen {
        path: self.config.app_root.clone(),
      },
    }
  }
}
