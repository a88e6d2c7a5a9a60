//! Offline queue for mutating requests that could not reach the network.
//!
//! Operations are partitioned by category (cart, order, wishlist), persisted
//! in the agent database, and replayed in insertion order when the host
//! delivers the matching sync tag.

mod replay;
mod store;
mod types;
mod writer;

pub use replay::{replay_category, ReplayReport};
pub use store::OfflineQueue;
pub use types::{QueueCategory, QueuedOperation, ReplayRequest, SyncTag};
pub use writer::QueueWriter;
