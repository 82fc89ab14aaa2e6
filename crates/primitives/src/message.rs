//! Messages crossing the mailbox bus.

use std::fmt;

use crate::NodeId;

/// The five message kinds of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Coordinator → router: one direct-neighbor edge, folded during seeding.
    Init,
    /// Coordinator → router: end of seeding, start advertising.
    Wake,
    /// Router → router: the sender's full table, input to relaxation.
    Update,
    /// Coordinator → router: emit the final table and exit.
    Terminate,
    /// Router → coordinator: activity heartbeat resetting the silence window.
    Refresh,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Wake => "wake",
            Self::Update => "update",
            Self::Terminate => "terminate",
            Self::Refresh => "refresh",
        };
        f.write_str(name)
    }
}

/// One message: a kind, the sender, and an encoded routing-table fragment
/// (empty for the payload-free kinds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub src_id: NodeId,
    pub payload: String,
}

impl Message {
    pub fn init(src_id: NodeId, payload: String) -> Self {
        Self {
            kind: MessageKind::Init,
            src_id,
            payload,
        }
    }

    pub fn wake(src_id: NodeId) -> Self {
        Self {
            kind: MessageKind::Wake,
            src_id,
            payload: String::new(),
        }
    }

    pub fn update(src_id: NodeId, payload: String) -> Self {
        Self {
            kind: MessageKind::Update,
            src_id,
            payload,
        }
    }

    pub fn terminate(src_id: NodeId) -> Self {
        Self {
            kind: MessageKind::Terminate,
            src_id,
            payload: String::new(),
        }
    }

    pub fn refresh(src_id: NodeId) -> Self {
        Self {
            kind: MessageKind::Refresh,
            src_id,
            payload: String::new(),
        }
    }
}
