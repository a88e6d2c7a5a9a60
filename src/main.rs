mod agent;
mod background;
mod cache;
mod classify;
mod config;
mod db;
mod error;
mod event;
mod lifecycle;
mod logging;
mod net;
mod notify;
mod queue;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use agent::Agent;
use event::{ClientMessage, Effect, Event};
use net::{HttpTransport, Method, Request};

#[derive(Parser, Debug)]
#[command(name = "storefront-agent")]
#[command(about = "Offline-first request agent for the storefront")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storefront-agent/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the manifest into the static tier of the configured generation
  Install,
  /// Purge tiers of other generations and claim clients
  Activate,
  /// Route one request through the agent
  Fetch {
    /// Absolute URL or path relative to the origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,
    #[arg(short, long)]
    body: Option<String>,
  },
  /// Deliver a background-sync trigger
  Sync {
    /// cart-sync, order-sync or wishlist-sync
    #[arg(required_unless_present = "all")]
    tag: Option<String>,
    /// Replay every category
    #[arg(long, conflicts_with = "tag")]
    all: bool,
  },
  /// Deliver a push message
  Push {
    /// JSON payload {title?, body?, data?}
    payload: Option<String>,
  },
  /// Deliver a notification click
  Click {
    /// explore, close, or anything else for the default action
    #[arg(long)]
    action: Option<String>,
    /// The clicked notification's data as JSON
    #[arg(long)]
    data: Option<String>,
  },
  /// Deliver a client message, e.g. '{"type":"skip-waiting"}'
  Message { json: String },
  /// List queued operations
  Queue,
  /// Show generations, tiers and queue sizes
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config::Config::data_dir()?, &config.log_level, args.verbose)?;

  let db = Arc::new(db::Database::open(&config.database_path()?)?);
  let transport = Arc::new(HttpTransport::new(config.fetch_timeout())?);
  let agent = Agent::new(config.clone(), db, transport)?;

  let effects = match args.command {
    Command::Install => vec![agent.handle(Event::Install).await],
    Command::Activate => vec![agent.handle(Event::Activate).await],
    Command::Fetch { url, method, body } => {
      let url = config.resolve(&url)?;
      let request = Request::new(method, url, body.map(String::into_bytes));
      vec![agent.handle(Event::Fetch(request)).await]
    }
    Command::Sync { tag: _, all: true } => agent.sync_all().await,
    Command::Sync { tag, all: false } => {
      let tag = tag.ok_or_else(|| eyre!("A sync tag or --all is required"))?;
      vec![agent.handle(Event::Sync(tag)).await]
    }
    Command::Push { payload } => {
      let raw = payload.unwrap_or_default().into_bytes();
      vec![agent.handle(Event::Push(raw)).await]
    }
    Command::Click { action, data } => {
      let data = data
        .map(|d| serde_json::from_str(&d))
        .transpose()
        .map_err(|e| eyre!("Invalid --data JSON: {}", e))?;
      vec![agent.handle(Event::NotificationClick { action, data }).await]
    }
    Command::Message { json } => {
      let message: ClientMessage =
        serde_json::from_str(&json).map_err(|e| eyre!("Invalid message: {}", e))?;
      vec![agent.handle(Event::Message(message)).await]
    }
    Command::Queue => {
      for op in agent.queue().all()? {
        println!(
          "{:>6}  {:<8}  {:<6}  {}  ({})",
          op.id,
          op.category,
          op.payload.method,
          op.payload.path,
          op.enqueued_at.to_rfc3339()
        );
      }
      Vec::new()
    }
    Command::Status => {
      let status = agent.status()?;
      println!("generation: {}", status.generation);
      println!(
        "active:     {}",
        status.active_generation.as_deref().unwrap_or("(none)")
      );
      for (tier, count) in status.tiers {
        println!("tier {:<24} {} entries", tier, count);
      }
      for (category, count) in status.queued {
        println!("queue {:<23} {} pending", category, count);
      }
      Vec::new()
    }
  };

  // The process is the host here; let decoupled cache writes land before exit
  agent.settle().await;

  for effect in effects {
    render(&effect)?;
  }

  Ok(())
}

fn render(effect: &Effect) -> Result<()> {
  match effect {
    Effect::Respond(served) => {
      println!("{} ({})", served.response.status, served.source);
      for (name, value) in &served.response.headers {
        println!("{}: {}", name, value);
      }
      if let Some(at) = served.cached_at {
        println!("x-cached-at: {}", at.to_rfc3339());
      }
      if let Some(tag) = served.sync_tag {
        println!("x-register-sync: {}", tag);
      }
      println!();
      println!("{}", String::from_utf8_lossy(&served.response.body));
    }
    Effect::NetworkError(reason) => println!("network error: {}", reason),
    Effect::Installed(outcome) => println!(
      "installed {}: {} assets precached, skip waiting: {}",
      outcome.generation, outcome.precached, outcome.skip_waiting
    ),
    Effect::Activated(outcome) => {
      println!(
        "activated {}, clients claimed: {}",
        outcome.generation, outcome.claimed
      );
      for tier in &outcome.purged {
        println!("purged {}", tier);
      }
    }
    Effect::Failed { event, reason } => println!("{} failed: {}", event, reason),
    Effect::Replayed {
      category,
      report,
      notifications,
    } => {
      println!(
        "{}: {} attempted, {} replayed, {} still queued",
        category,
        report.attempted(),
        report.replayed.len(),
        report.failed.len()
      );
      for (op, reason) in &report.failed {
        println!("  #{} {}: {}", op.id, op.payload.path, reason);
      }
      for notification in notifications {
        println!("{}", serde_json::to_string(notification)?);
      }
    }
    Effect::Notify(notification) => println!("{}", serde_json::to_string_pretty(notification)?),
    Effect::Click(click) => println!("{:?}", click),
    Effect::Queued(tag) => println!("queued, register {}", tag),
    Effect::Ack => println!("ok"),
  }
  Ok(())
}
