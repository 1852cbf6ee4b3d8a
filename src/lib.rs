//! Coordination fabric for a distributed web crawling and indexing service.
//!
//! A master owns the in-memory URL frontier and dispatches crawl tasks over
//! a durable task bus to a pool of crawl workers; crawl workers persist
//! artifacts and hand text off to index workers; a shared bulletin board
//! tracks worker liveness and in-flight task bookkeeping.

pub mod bb;
pub mod common;
pub mod crawler;
pub mod indexer;
pub mod master;
pub mod queue;
pub mod search;
pub mod storage;

pub use common::{config::Config, error::Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::bb::{BulletinBoard, WorkerKind};
    pub use crate::common::config::Config;
    pub use crate::common::error::{Error, Result};
    pub use crate::master::{Master, MasterState};
    pub use crate::queue::TaskBus;
}
