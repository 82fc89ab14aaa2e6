//! Core protocol types shared by the bus, the routers and the coordinator:
//! node identifiers, routing tables, messages and the wire codec for
//! routing-table fragments.

pub mod message;
pub mod table;
pub mod wire;

pub use message::{Message, MessageKind};
pub use table::{InvariantViolation, RoutingEntry, RoutingTable};

/// Identifier of a router in the simulated network.
pub type NodeId = u32;

/// Total path cost to a destination.
pub type Cost = u32;

/// Reserved identifier addressing the coordinator's mailbox. Never a valid
/// router id.
pub const COORDINATOR_ID: NodeId = 999;

/// Upper bound on distinct router identifiers per run.
pub const MAX_ROUTERS: usize = 100;

/// Sentinel for "unreachable". Never stored in a table (a missing key means
/// unreachable); candidate costs reaching this value are dropped.
pub const INF: Cost = Cost::MAX;

/// Byte budget for one encoded routing-table fragment crossing the bus.
pub const MAX_PAYLOAD_BYTES: usize = 4096;
