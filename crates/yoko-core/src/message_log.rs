//! Append-only message log shared by every viewer.
//!
//! Messages live in the sled tree [`MESSAGES_TREE`]. Each publish takes a key from
//! `Db::generate_id` and stores it big-endian, so tree order is publish order.
//! Subscribers walk the tree with a cursor and wake on a `watch` of the newest key,
//! which means a slow subscriber can never skip, repeat or reorder an entry.

use crate::error::{CoreError, CoreResult};
use crate::message::{LogEntry, Message};
use chrono::Utc;
use sled::{Db, IVec, Tree};
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fixed logical path of the conversation inside the store.
pub const MESSAGES_TREE: &str = "messages";

const DEFAULT_LOG_PATH: &str = "./data/yoko_log";

struct Inner {
    db: Db,
    tree: Tree,
    /// Serializes key allocation + insert so keys land in the tree in order.
    publish_lock: Mutex<()>,
    latest: watch::Sender<Option<u64>>,
}

/// Handle to the shared log. Cheap to clone; all clones see the same entries.
#[derive(Clone)]
pub struct MessageLog {
    inner: Arc<Inner>,
}

impl MessageLog {
    /// Opens or creates the log at `./data/yoko_log`.
    pub fn new() -> CoreResult<Self> {
        Self::open_path(DEFAULT_LOG_PATH)
    }

    /// Opens or creates the log at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let db = sled::open(path.as_ref())?;
        info!("Message log opened at {}", path.as_ref().display());
        Self::from_db(db)
    }

    /// In-memory log that is discarded on drop.
    pub fn temporary() -> CoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> CoreResult<Self> {
        let tree = db.open_tree(MESSAGES_TREE)?;
        let latest = match tree.last()? {
            Some((key, _)) => Some(decode_key(&key)?),
            None => None,
        };
        let (latest_tx, _) = watch::channel(latest);
        Ok(Self {
            inner: Arc::new(Inner {
                db,
                tree,
                publish_lock: Mutex::new(()),
                latest: latest_tx,
            }),
        })
    }

    /// Appends a message, makes it durable and wakes subscribers.
    pub async fn publish(&self, message: Message) -> CoreResult<LogEntry> {
        let _guard = self.inner.publish_lock.lock().await;

        let key = self.inner.db.generate_id()?;
        let entry = LogEntry {
            key,
            message,
            published_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.inner.tree.insert(key.to_be_bytes(), bytes)?;
        self.inner.tree.flush_async().await?;
        self.inner.latest.send_replace(Some(key));

        debug!(key, sender = %entry.message.sender(), "Message published");
        Ok(entry)
    }

    /// Delivers every entry ever published, in order, then each new one as it lands.
    ///
    /// The callback runs on a background task; drop the returned [`Subscription`] to stop.
    pub fn subscribe_from_beginning<F>(&self, mut on_append: F) -> Subscription
    where
        F: FnMut(LogEntry) + Send + 'static,
    {
        let tree = self.inner.tree.clone();
        let mut latest = self.inner.latest.subscribe();

        let handle = tokio::spawn(async move {
            let mut cursor: Option<u64> = None;
            loop {
                latest.borrow_and_update();
                for item in entries_after(&tree, cursor) {
                    match item {
                        Ok((key, entry)) => {
                            cursor = Some(key);
                            if let Some(entry) = entry {
                                on_append(entry);
                            }
                        }
                        Err(e) => warn!("Message log read failed: {}", e),
                    }
                }
                if latest.changed().await.is_err() {
                    debug!("Message log closed; subscription ends");
                    break;
                }
            }
        });

        Subscription { handle }
    }

    /// Snapshot of all entries in publish order.
    pub fn entries(&self) -> CoreResult<Vec<LogEntry>> {
        let mut out = Vec::new();
        for item in entries_after(&self.inner.tree, None) {
            if let (_, Some(entry)) = item? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.inner.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tree.is_empty()
    }
}

/// Live subscription to the log. Dropping it stops delivery.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn decode_key(raw: &IVec) -> CoreResult<u64> {
    let bytes: [u8; 8] = raw
        .as_ref()
        .try_into()
        .map_err(|_| CoreError::CorruptKey(raw.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Entries strictly after `cursor`. An undecodable value yields `(key, None)` so the
/// cursor still moves past it.
fn entries_after(
    tree: &Tree,
    cursor: Option<u64>,
) -> impl Iterator<Item = CoreResult<(u64, Option<LogEntry>)>> {
    let iter = match cursor {
        None => tree.iter(),
        Some(key) => tree.range((Bound::Excluded(key.to_be_bytes()), Bound::Unbounded)),
    };
    iter.map(|item| {
        let (key, value) = item?;
        let key = decode_key(&key)?;
        match serde_json::from_slice::<LogEntry>(&value) {
            Ok(entry) => Ok((key, Some(entry))),
            Err(e) => {
                warn!(key, "Skipping undecodable log entry: {}", e);
                Ok((key, None))
            }
        }
    })
}
