//! The agent: one router from host events to effect descriptors.

use color_eyre::Result;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::background::BackgroundTasks;
use crate::cache::{
  CacheLayer, CacheStorage, CacheTierRegistry, CachedEntry, Fallback, Served, SqliteStorage,
  TierKind,
};
use crate::classify::{Category, Classifier};
use crate::config::Config;
use crate::db::Database;
use crate::error::AgentError;
use crate::event::{ClientMessage, Effect, Event};
use crate::lifecycle;
use crate::net::{Request, Response, Transport};
use crate::notify::{ClickAction, NotificationEmitter, PushPayload};
use crate::queue::{
  replay_category, OfflineQueue, QueueCategory, QueueWriter, ReplayRequest, SyncTag,
};

/// Snapshot of durable agent state, for `status`.
#[derive(Debug, Clone)]
pub struct Status {
  pub generation: String,
  pub active_generation: Option<String>,
  /// Every stored tier with its entry count
  pub tiers: Vec<(String, usize)>,
  pub queued: Vec<(QueueCategory, usize)>,
}

pub struct Agent {
  config: Config,
  origin: Url,
  /// Key of the precached offline page in the static tier
  offline_page_key: String,
  db: Arc<Database>,
  cache: CacheLayer<SqliteStorage>,
  classifier: Classifier,
  queue: Arc<OfflineQueue>,
  writer: QueueWriter,
  transport: Arc<dyn Transport>,
  emitter: NotificationEmitter,
  background: BackgroundTasks,
}

impl Agent {
  /// Must be called inside a tokio runtime; it starts the queue writer.
  pub fn new(config: Config, db: Arc<Database>, transport: Arc<dyn Transport>) -> Result<Self> {
    let origin = config.origin_url()?;
    let offline_page_key = Request::get(config.resolve(&config.offline_page)?).cache_key();
    let classifier = Classifier::new(&config)?;
    let background = BackgroundTasks::new();
    let cache = CacheLayer::new(
      Arc::new(SqliteStorage::new(Arc::clone(&db))),
      CacheTierRegistry::new(config.generation.clone()),
      background.clone(),
    )
    .with_fetch_timeout(config.fetch_timeout());
    let queue = Arc::new(OfflineQueue::new(Arc::clone(&db)));
    let writer = QueueWriter::spawn(Arc::clone(&queue));
    let emitter = NotificationEmitter::new(config.notifications.clone());

    Ok(Self {
      config,
      origin,
      offline_page_key,
      db,
      cache,
      classifier,
      queue,
      writer,
      transport,
      emitter,
      background,
    })
  }

  /// Dispatch one host event. Never fails: every failure becomes an effect.
  pub async fn handle(&self, event: Event) -> Effect {
    debug!(kind = event.kind(), "event");
    match event {
      Event::Install => self.install().await,
      Event::Activate => self.activate(),
      Event::Fetch(request) => self.fetch(request).await,
      Event::Sync(tag) => self.sync(&tag).await,
      Event::Push(raw) => self.push(&raw),
      Event::NotificationClick { action, data } => self.click(action.as_deref(), data.as_ref()),
      Event::Message(message) => self.message(message).await,
    }
  }

  pub async fn install(&self) -> Effect {
    match lifecycle::install(
      &self.cache,
      self.transport.as_ref(),
      &self.config,
      self.config.fetch_timeout(),
    )
    .await
    {
      Ok(outcome) => Effect::Installed(outcome),
      Err(e) => Effect::Failed {
        event: "install",
        reason: e.to_string(),
      },
    }
  }

  pub fn activate(&self) -> Effect {
    match lifecycle::activate(&self.cache, &self.db) {
      Ok(outcome) => Effect::Activated(outcome),
      Err(e) => {
        warn!(error = %e, "activate failed");
        Effect::Failed {
          event: "activate",
          reason: e.to_string(),
        }
      }
    }
  }

  pub async fn fetch(&self, request: Request) -> Effect {
    if request.url.origin() != self.origin.origin() {
      debug!(url = %request.url, "cross-origin, passing through");
      return self.passthrough(request).await;
    }

    let Some(category) = self.classifier.classify(&request) else {
      return self.passthrough(request).await;
    };
    debug!(url = %request.url, ?category, "classified");

    let transport = Arc::clone(&self.transport);
    let live = {
      let request = request.clone();
      move || transport.send(request)
    };

    match category {
      Category::Static => match self.cache.cache_first(&request, category, live).await {
        Ok(served) => Effect::Respond(served),
        Err(e) => Effect::NetworkError(e.to_string()),
      },
      Category::Api => {
        let cacheable = self.classifier.is_cacheable_api(&request);
        let served = self
          .cache
          .network_first(&request, category, cacheable, Fallback::OfflineError, live)
          .await;
        Effect::Respond(served)
      }
      Category::Navigation => {
        let fallback = Fallback::OfflinePage {
          request_key: self.offline_page_key.clone(),
        };
        let served = self
          .cache
          .network_first(&request, category, true, fallback, live)
          .await;
        Effect::Respond(served)
      }
    }
  }

  /// Send without tier involvement. Mutations on a queue route are queued when the network is down.
  async fn passthrough(&self, request: Request) -> Effect {
    let live = tokio::time::timeout(
      self.config.fetch_timeout(),
      self.transport.send(request.clone()),
    )
    .await
    .unwrap_or_else(|_| {
      Err(AgentError::NetworkUnavailable(format!(
        "no response within {:?}",
        self.config.fetch_timeout()
      )))
    });

    let error = match live {
      Ok(response) => return Effect::Respond(Served::from_network(response)),
      Err(e) => e,
    };

    if request.method.is_mutating() {
      if let Some(category) = self.queue_category_for(&request) {
        match self.replay_request_for(&request) {
          Some(payload) => {
            let tag = self.enqueue(category, payload);
            info!(method = %request.method, url = %request.url, %tag, "offline mutation queued");
            return Effect::Respond(Served::queued(queued_response(tag), tag));
          }
          None => warn!(url = %request.url, "mutation body is not text, cannot queue"),
        }
      }
    }

    Effect::NetworkError(error.to_string())
  }

  fn queue_category_for(&self, request: &Request) -> Option<QueueCategory> {
    if request.url.origin() != self.origin.origin() {
      return None;
    }
    let path = request.path();
    self
      .config
      .queue_routes
      .iter()
      .find(|(_, prefix)| {
        let prefix = prefix.trim_end_matches('/');
        path == prefix
          || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
      })
      .map(|(category, _)| *category)
  }

  fn replay_request_for(&self, request: &Request) -> Option<ReplayRequest> {
    let body = match &request.body {
      Some(bytes) => Some(String::from_utf8(bytes.clone()).ok()?),
      None => None,
    };
    let path = match request.url.query() {
      Some(query) => format!("{}?{}", request.url.path(), query),
      None => request.url.path().to_string(),
    };
    Some(ReplayRequest {
      method: request.method,
      path,
      body,
    })
  }

  /// Record a mutation for later replay without waiting for the write.
  /// Records keep the order of `enqueue` calls.
  pub fn enqueue(&self, category: QueueCategory, payload: ReplayRequest) -> SyncTag {
    self.writer.enqueue(category, payload);
    category.sync_tag()
  }

  pub async fn sync(&self, tag: &str) -> Effect {
    match SyncTag::parse(tag) {
      Some(tag) => {
        self.settle().await;
        self.replay(tag.category()).await
      }
      None => {
        warn!(tag, "unknown sync tag ignored");
        Effect::Ack
      }
    }
  }

  /// Drain every category; categories run concurrently, each one in order.
  pub async fn sync_all(&self) -> Vec<Effect> {
    self.settle().await;
    join_all(QueueCategory::ALL.map(|category| self.replay(category))).await
  }

  /// Callers settle background enqueues first so they are visible to the replay.
  async fn replay(&self, category: QueueCategory) -> Effect {
    let report = match replay_category(
      &self.queue,
      self.transport.as_ref(),
      &self.origin,
      self.config.fetch_timeout(),
      category,
    )
    .await
    {
      Ok(report) => report,
      Err(e) => {
        warn!(%category, error = %e, "replay aborted");
        Default::default()
      }
    };

    let notifications = report
      .replayed
      .iter()
      .map(|op| self.emitter.replay_success(op))
      .collect();

    Effect::Replayed {
      category,
      report,
      notifications,
    }
  }

  pub fn push(&self, raw: &[u8]) -> Effect {
    Effect::Notify(self.emitter.push(PushPayload::decode(raw)))
  }

  pub fn click(&self, action: Option<&str>, data: Option<&Value>) -> Effect {
    Effect::Click(self.emitter.click(&ClickAction::parse(action), data))
  }

  pub async fn message(&self, message: ClientMessage) -> Effect {
    match message {
      ClientMessage::SkipWaiting => {
        info!("skip waiting requested by client");
        Effect::Ack
      }
      ClientMessage::CacheUrls { urls } => {
        join_all(urls.iter().map(|url| self.warm(url))).await;
        Effect::Ack
      }
      ClientMessage::Queue { category, request } => Effect::Queued(self.enqueue(category, request)),
    }
  }

  /// Fetch one URL and store it in its category's tier. Best-effort.
  async fn warm(&self, url: &str) {
    let request = match self.origin.join(url) {
      Ok(url) if url.origin() == self.origin.origin() => Request::get(url),
      _ => {
        warn!(url, "not a same-origin URL, skipped");
        return;
      }
    };
    let Some(category) = self.classifier.classify(&request) else {
      return;
    };
    if category == Category::Api && !self.classifier.is_cacheable_api(&request) {
      warn!(url, "API path not in the cacheable list, skipped");
      return;
    }

    let live = tokio::time::timeout(
      self.config.fetch_timeout(),
      self.transport.send(request.clone()),
    )
    .await;
    match live {
      Ok(Ok(response)) => match CachedEntry::snapshot(&request, &response) {
        Some(entry) => self
          .cache
          .store_in_background(TierKind::for_category(category), entry),
        None => warn!(url, status = response.status, "not cacheable, skipped"),
      },
      Ok(Err(e)) => warn!(url, error = %e, "warm fetch failed"),
      Err(_) => warn!(url, "warm fetch timed out"),
    }
  }

  /// Wait for background cache writes and enqueues.
  pub async fn settle(&self) {
    self.background.settle().await;
    self.writer.flush().await;
  }

  pub fn queue(&self) -> &OfflineQueue {
    &self.queue
  }

  #[cfg(test)]
  pub fn cache(&self) -> &CacheLayer<SqliteStorage> {
    &self.cache
  }

  pub fn status(&self) -> Result<Status> {
    let storage = self.cache.storage();
    let tiers = storage
      .tier_names()?
      .into_iter()
      .map(|name| {
        let count = storage.entry_count(&name)?;
        Ok((name, count))
      })
      .collect::<Result<Vec<_>>>()?;
    let queued = QueueCategory::ALL
      .iter()
      .map(|category| Ok((*category, self.queue.len(*category)?)))
      .collect::<Result<Vec<_>>>()?;

    Ok(Status {
      generation: self.config.generation.clone(),
      active_generation: lifecycle::active_generation(&self.db)?,
      tiers,
      queued,
    })
  }
}

fn queued_response(tag: SyncTag) -> Response {
  Response::json(
    202,
    &serde_json::json!({
      "queued": true,
      "syncTag": tag.to_string(),
      "message": "You are offline. This change will be sent when the connection returns.",
    }),
  )
}
