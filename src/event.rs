//! Host events delivered to the agent and the effects it answers with.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::Served;
use crate::lifecycle::{ActivateOutcome, InstallOutcome};
use crate::net::Request;
use crate::notify::{ClickEffect, Notification};
use crate::queue::{QueueCategory, ReplayReport, ReplayRequest, SyncTag};

/// Agent events, one per host callback
#[derive(Debug)]
pub enum Event {
  Install,
  Activate,
  /// Outbound request from a controlled page
  Fetch(Request),
  /// Background-sync trigger with its raw tag
  Sync(String),
  /// Push message with its raw payload
  Push(Vec<u8>),
  NotificationClick {
    action: Option<String>,
    data: Option<Value>,
  },
  Message(ClientMessage),
}

impl Event {
  pub fn kind(&self) -> &'static str {
    match self {
      Event::Install => "install",
      Event::Activate => "activate",
      Event::Fetch(_) => "fetch",
      Event::Sync(_) => "sync",
      Event::Push(_) => "push",
      Event::NotificationClick { .. } => "notificationclick",
      Event::Message(_) => "message",
    }
  }
}

/// Messages posted by the foreground app.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
  SkipWaiting,
  /// Warm the dynamic tier with these same-origin URLs
  CacheUrls { urls: Vec<String> },
  /// Queue a mutation explicitly
  Queue {
    category: QueueCategory,
    request: ReplayRequest,
  },
}

/// What the host should do once a handler finishes.
#[derive(Debug)]
pub enum Effect {
  /// Answer the intercepted request
  Respond(Served),
  /// The request fails as a network error in the page
  NetworkError(String),
  Installed(InstallOutcome),
  Activated(ActivateOutcome),
  /// A lifecycle step failed; the previous generation stays authoritative
  Failed {
    event: &'static str,
    reason: String,
  },
  Replayed {
    category: QueueCategory,
    report: ReplayReport,
    notifications: Vec<Notification>,
  },
  /// Show a notification
  Notify(Notification),
  /// Close the clicked notification, then apply the effect
  Click(ClickEffect),
  /// Enqueue scheduled; the host should register this sync tag
  Queued(SyncTag),
  /// Nothing for the host to do
  Ack,
}
