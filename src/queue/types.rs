use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::net::Method;

/// Partition of the offline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueCategory {
  Cart,
  Order,
  Wishlist,
}

impl QueueCategory {
  pub const ALL: [QueueCategory; 3] = [
    QueueCategory::Cart,
    QueueCategory::Order,
    QueueCategory::Wishlist,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      QueueCategory::Cart => "cart",
      QueueCategory::Order => "order",
      QueueCategory::Wishlist => "wishlist",
    }
  }

  pub fn sync_tag(&self) -> SyncTag {
    SyncTag(*self)
  }
}

impl fmt::Display for QueueCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for QueueCategory {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "cart" => Ok(QueueCategory::Cart),
      "order" => Ok(QueueCategory::Order),
      "wishlist" => Ok(QueueCategory::Wishlist),
      other => Err(format!("unknown queue category {}", other)),
    }
  }
}

/// Background-sync tag; maps 1:1 to a queue category ("cart-sync" ↔ cart).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncTag(QueueCategory);

impl SyncTag {
  pub fn category(&self) -> QueueCategory {
    self.0
  }

  /// Parse a tag from the fixed vocabulary; anything else is None.
  pub fn parse(tag: &str) -> Option<Self> {
    let category = tag.strip_suffix("-sync")?;
    category.parse().ok().map(SyncTag)
  }
}

impl fmt::Display for SyncTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-sync", self.0)
  }
}

/// What is needed to re-issue a mutating call. Headers and auth are ambient at replay time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRequest {
  pub method: Method,
  /// Origin-relative path, including any query string
  pub path: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<String>,
}

/// A durably queued mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOperation {
  /// Monotonic across all categories; never reused
  pub id: i64,
  pub category: QueueCategory,
  pub payload: ReplayRequest,
  pub enqueued_at: DateTime<Utc>,
}
