//! The in-process mailbox bus.
//!
//! Every router (and the coordinator) owns exactly one mailbox keyed by its
//! identifier. Any party may enqueue to any mailbox; only the owner dequeues.
//! Both operations are non-blocking. Delivery is reliable and FIFO per
//! sender–receiver pair; arrival order across senders is unspecified.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

use dvsim_primitives::{Message, NodeId};

/// Messages a mailbox buffers before writers see [`EnqueueError::Full`].
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("mailbox {0} already has a live owner")]
    OwnerAlive(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// The target's mailbox is at capacity. Transient: the owner is draining.
    #[error("mailbox {0} is full")]
    Full(NodeId),
    /// No live mailbox is registered for the target.
    #[error("no mailbox registered for {0}")]
    NoSuchTarget(NodeId),
}

/// Cloneable handle to the bus. All clones share one mailbox registry.
#[derive(Debug, Clone)]
pub struct MessageBus {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    senders: RwLock<HashMap<NodeId, mpsc::Sender<Message>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    /// A bus whose mailboxes each buffer `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "mailboxes must buffer at least one message");
        Self {
            inner: Arc::new(Inner {
                capacity,
                senders: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Creates the mailbox owned by `owner` and hands it out.
    ///
    /// An identifier whose previous mailbox was torn down can be reopened;
    /// opening while a previous owner is still alive fails, since two live
    /// receivers for one identifier cannot exist.
    pub fn open(&self, owner: NodeId) -> Result<Mailbox, BusError> {
        let mut senders = self.inner.senders.write();
        if senders.get(&owner).is_some_and(|tx| !tx.is_closed()) {
            return Err(BusError::OwnerAlive(owner));
        }
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        senders.insert(owner, tx);
        trace!(owner, "mailbox opened");
        Ok(Mailbox {
            owner,
            receiver: rx,
            bus: self.clone(),
        })
    }

    /// Enqueues `message` to `target`'s mailbox without blocking.
    pub fn enqueue(&self, target: NodeId, message: Message) -> Result<(), EnqueueError> {
        let sender = self
            .inner
            .senders
            .read()
            .get(&target)
            .cloned()
            .ok_or(EnqueueError::NoSuchTarget(target))?;
        match sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(EnqueueError::Full(target)),
            // Owner tore the mailbox down between the registry lookup and the
            // send.
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::NoSuchTarget(target)),
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving end of one identifier's mailbox. Held only by the owner;
/// dropping it tears the mailbox down and discards anything still queued.
#[derive(Debug)]
pub struct Mailbox {
    owner: NodeId,
    receiver: mpsc::Receiver<Message>,
    bus: MessageBus,
}

impl Mailbox {
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// Takes the next queued message, `None` when the mailbox is empty.
    /// Never blocks and never fails destructively.
    pub fn try_dequeue(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        self.receiver.close();
        let mut senders = self.bus.inner.senders.write();
        // Deregister only our own generation; a reopened mailbox under the
        // same identifier keeps its live sender.
        if senders.get(&self.owner).is_some_and(|tx| tx.is_closed()) {
            senders.remove(&self.owner);
        }
        trace!(owner = self.owner, "mailbox destroyed");
    }
}
