//! Failure kinds the agent absorbs and turns into effects.

/// Error taxonomy for request handling, install and replay.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
  /// The live call failed, was refused, or exceeded the fetch timeout.
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// A fallback lookup found nothing for the request key.
  #[error("no cached entry for {0}")]
  CacheMiss(String),

  /// A precache insert failed; the previous generation stays authoritative.
  #[error("install failed for {path}: {reason}")]
  InstallFailure { path: String, reason: String },

  /// A queued operation could not be replayed; it stays queued.
  #[error("replay of operation {id} failed: {reason}")]
  ReplayFailure { id: i64, reason: String },

  /// The tier or queue store could not be read or written.
  #[error("storage error: {0}")]
  Storage(String),
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

impl From<color_eyre::Report> for AgentError {
  fn from(e: color_eyre::Report) -> Self {
    AgentError::Storage(e.to_string())
  }
}
