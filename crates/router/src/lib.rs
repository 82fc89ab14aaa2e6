//! The routing agent: one autonomous task per node, exchanging distance
//! vectors with its neighbors over the mailbox bus until the coordinator
//! tells it to stop.

mod agent;
mod report;

pub use agent::{Router, RouterConfig};
