//! Completion events for queued commands.
//!
//! Every command emits exactly one event when it completes or fails. Events
//! reach subscribers in command order, after the store lock is released, so
//! a callback may call back into the store.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fds_core::{FlashStore, StoreEvent};
//!
//! let receiver = store.subscribe()?;
//! store.write(key, &[chunk])?;
//! store.run_until_idle()?;
//!
//! while let Ok(event) = receiver.try_recv() {
//!     println!("{:?}: {:?}", event.kind(), event.result());
//! }
//! ```

use crate::error::{StoreError, StoreResult};
use crate::mount::MountDecision;
use crate::types::{RecordId, RecordKey};
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Kind of command an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Initialization.
    Init,
    /// A new record was written.
    Write,
    /// A record was replaced.
    Update,
    /// A record was cleared.
    Clear,
    /// All records of an instance were cleared.
    ClearInstance,
    /// Garbage collection.
    Gc,
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Initialization finished.
    Init {
        /// Outcome of the command.
        result: StoreResult<MountDecision>,
    },
    /// A write finished.
    Write {
        /// Outcome of the command.
        result: StoreResult<()>,
        /// Id of the new record.
        record_id: RecordId,
        /// Key of the new record.
        key: RecordKey,
    },
    /// An update finished.
    Update {
        /// Outcome of the command.
        result: StoreResult<()>,
        /// Id of the new record.
        record_id: RecordId,
        /// Id of the replaced record.
        old_record_id: RecordId,
        /// Key of the new record.
        key: RecordKey,
    },
    /// A clear finished.
    Clear {
        /// Outcome of the command.
        result: StoreResult<()>,
        /// Id of the cleared record.
        record_id: RecordId,
    },
    /// A clear-by-instance finished.
    ClearInstance {
        /// Outcome of the command.
        result: StoreResult<()>,
        /// Instance whose records were cleared.
        instance: u16,
        /// Number of records cleared.
        cleared: u32,
    },
    /// A garbage collection finished.
    Gc {
        /// Outcome of the command.
        result: StoreResult<()>,
        /// Pages exchanged with the swap page.
        pages_compacted: u32,
        /// Words reclaimed.
        words_freed: u32,
    },
}

impl StoreEvent {
    /// Kind of command the event belongs to.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Init { .. } => EventKind::Init,
            Self::Write { .. } => EventKind::Write,
            Self::Update { .. } => EventKind::Update,
            Self::Clear { .. } => EventKind::Clear,
            Self::ClearInstance { .. } => EventKind::ClearInstance,
            Self::Gc { .. } => EventKind::Gc,
        }
    }

    /// The command outcome, without its payload.
    pub fn result(&self) -> Result<(), &StoreError> {
        match self {
            Self::Init { result } => result.as_ref().map(|_| ()),
            Self::Write { result, .. }
            | Self::Update { result, .. }
            | Self::Clear { result, .. }
            | Self::ClearInstance { result, .. }
            | Self::Gc { result, .. } => result.as_ref().map(|_| ()),
        }
    }

    /// Whether the command succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result().is_ok()
    }

    /// Record id carried by the event, if any.
    #[must_use]
    pub const fn record_id(&self) -> Option<RecordId> {
        match self {
            Self::Write { record_id, .. }
            | Self::Update { record_id, .. }
            | Self::Clear { record_id, .. } => Some(*record_id),
            _ => None,
        }
    }
}

/// Callback registered with [`crate::FlashStore::register`].
pub type EventHandler = Box<dyn Fn(&StoreEvent) + Send + Sync>;

enum Subscriber {
    Callback(Arc<dyn Fn(&StoreEvent) + Send + Sync>),
    Channel(Sender<StoreEvent>),
}

/// Distributes command outcomes to a bounded set of subscribers.
pub(crate) struct EventFeed {
    subscribers: RwLock<Vec<Subscriber>>,
    max_users: usize,
}

impl EventFeed {
    pub(crate) fn new(max_users: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            max_users,
        }
    }

    fn add(&self, subscriber: Subscriber) -> StoreResult<()> {
        let mut subscribers = self.subscribers.write();
        if subscribers.len() >= self.max_users {
            return Err(StoreError::UserLimitReached(self.max_users));
        }
        subscribers.push(subscriber);
        Ok(())
    }

    pub(crate) fn register(&self, handler: EventHandler) -> StoreResult<()> {
        self.add(Subscriber::Callback(Arc::from(handler)))
    }

    pub(crate) fn subscribe(&self) -> StoreResult<Receiver<StoreEvent>> {
        let (tx, rx) = mpsc::channel();
        self.add(Subscriber::Channel(tx))?;
        Ok(rx)
    }

    /// Delivers events in order to every subscriber.
    ///
    /// Callbacks run without the subscriber lock held, so they may register
    /// further subscribers. Channels whose receiver was dropped are removed.
    pub(crate) fn emit_all(&self, events: Vec<StoreEvent>) {
        if events.is_empty() {
            return;
        }
        for event in events {
            let callbacks: Vec<_> = {
                let mut subscribers = self.subscribers.write();
                subscribers.retain(|s| match s {
                    Subscriber::Channel(tx) => tx.send(event.clone()).is_ok(),
                    Subscriber::Callback(_) => true,
                });
                subscribers
                    .iter()
                    .filter_map(|s| match s {
                        Subscriber::Callback(cb) => Some(Arc::clone(cb)),
                        Subscriber::Channel(_) => None,
                    })
                    .collect()
            };
            for callback in callbacks {
                callback(&event);
            }
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for EventFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFeed")
            .field("subscribers", &self.subscriber_count())
            .field("max_users", &self.max_users)
            .finish()
    }
}
