use std::{collections::BTreeSet, path::PathBuf, time::Duration};

use eyre::Result;
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep},
};
use tracing::{debug, info, warn};

use dvsim_bus::{Mailbox, MessageBus};
use dvsim_primitives::{COORDINATOR_ID, Message, MessageKind, NodeId, RoutingTable, wire};

use crate::report;

/// Per-router runtime parameters, handed down by the coordinator.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// This router's identifier.
    pub id: NodeId,
    /// Directory receiving the final routing-table file.
    pub output_dir: PathBuf,
    /// Re-advertise the table after this long without an outbound update.
    pub update_interval: Duration,
    /// Pause between mailbox polls.
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Collecting direct-neighbor edges; nothing is advertised yet.
    Seeding,
    /// Gossiping distance vectors with neighbors.
    Converging,
}

/// One routing agent.
///
/// Runs as a single task: each loop iteration consumes at most one message,
/// reacts to it, fans out any resulting advertisements, and sleeps briefly.
/// The only exit is a terminate message, which makes the agent emit its final
/// table, tear down its mailbox and return.
pub struct Router {
    config: RouterConfig,
    bus: MessageBus,
    mailbox: Mailbox,
    table: RoutingTable,
    neighbors: BTreeSet<NodeId>,
    phase: Phase,
    dirty: bool,
    last_broadcast: Instant,
}

impl Router {
    pub fn new(config: RouterConfig, bus: MessageBus, mailbox: Mailbox) -> Self {
        debug_assert_eq!(
            mailbox.owner(),
            config.id,
            "a router must own the mailbox keyed by its own identifier",
        );
        let table = RoutingTable::new(config.id);
        Self {
            config,
            bus,
            mailbox,
            table,
            neighbors: BTreeSet::new(),
            phase: Phase::Seeding,
            dirty: false,
            last_broadcast: Instant::now(),
        }
    }

    pub fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        loop {
            if let Some(message) = self.mailbox.try_dequeue() {
                match message.kind {
                    MessageKind::Init => self.handle_init(&message),
                    MessageKind::Wake => self.handle_wake(),
                    MessageKind::Update => self.handle_update(&message),
                    MessageKind::Terminate => {
                        info!(router = self.id(), "terminate received; emitting final table");
                        self.emit_final_table()?;
                        // Dropping `self` tears the mailbox down, discarding
                        // whatever is still queued.
                        return Ok(());
                    }
                    MessageKind::Refresh => {
                        debug!(
                            router = self.id(),
                            src = message.src_id,
                            "refresh addressed to a router; ignoring"
                        );
                    }
                }
                self.flush_if_dirty();
            }
            self.maybe_rebroadcast();
            sleep(self.config.poll_interval).await;
        }
    }

    fn id(&self) -> NodeId {
        self.config.id
    }

    /// Folds a seeding advertisement: each entry names a direct neighbor and
    /// the cost of the shared edge.
    fn handle_init(&mut self, message: &Message) {
        for (neighbor, adv) in wire::decode(&message.payload) {
            if neighbor == self.id() {
                warn!(
                    router = self.id(),
                    "init names the router itself as a neighbor; skipping"
                );
                continue;
            }
            self.neighbors.insert(neighbor);
            if self.table.fold_direct_edge(neighbor, adv.cost) {
                self.dirty = true;
            }
        }
    }

    /// Ends the seeding phase: advertise the table once to every neighbor and
    /// arm the re-advertisement timer.
    fn handle_wake(&mut self) {
        if self.phase == Phase::Converging {
            debug!(router = self.id(), "duplicate wake; already converging");
            return;
        }
        info!(
            router = self.id(),
            neighbors = self.neighbors.len(),
            "awake; advertising initial table"
        );
        self.phase = Phase::Converging;
        self.broadcast_table();
        self.last_broadcast = Instant::now();
        self.dirty = false;
    }

    /// Relaxes the table against a neighbor's advertisement. A changed table
    /// is flushed by the caller once the whole message is processed.
    ///
    /// Updates can arrive while still seeding (a neighbor woken earlier may
    /// advertise before our own wake is consumed); the sender's edge is
    /// already installed because all inits precede any update in the mailbox,
    /// so the relaxation is safe — it is merely not re-advertised until the
    /// wake.
    fn handle_update(&mut self, message: &Message) {
        let advertised = wire::decode(&message.payload);
        if self.table.relax_from(message.src_id, &advertised) {
            self.dirty = true;
        }
    }

    /// After a table mutation while converging: one update per neighbor, one
    /// heartbeat to the coordinator, timer restart.
    fn flush_if_dirty(&mut self) {
        if !self.dirty || self.phase != Phase::Converging {
            return;
        }
        debug_assert!(
            self.table.get(self.id()).is_some(),
            "router {} lost its self-entry",
            self.id(),
        );
        self.broadcast_table();
        self.send_refresh();
        self.last_broadcast = Instant::now();
        self.dirty = false;
    }

    /// Compensates for advertisements that raced past not-yet-started
    /// neighbors or were dropped on a full mailbox.
    fn maybe_rebroadcast(&mut self) {
        if self.phase == Phase::Converging
            && self.last_broadcast.elapsed() >= self.config.update_interval
        {
            debug!(router = self.id(), "re-advertising after a quiet interval");
            self.broadcast_table();
            self.last_broadcast = Instant::now();
        }
    }

    fn broadcast_table(&self) {
        let payload = match wire::encode(self.table.iter()) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    router = self.id(),
                    %err,
                    "table does not fit one payload; skipping this broadcast"
                );
                return;
            }
        };
        for &neighbor in &self.neighbors {
            if let Err(err) = self
                .bus
                .enqueue(neighbor, Message::update(self.id(), payload.clone()))
            {
                // One lost delivery is fine: the periodic re-advertisement
                // covers it.
                warn!(router = self.id(), neighbor, %err, "dropping one update delivery");
            }
        }
    }

    fn send_refresh(&self) {
        if let Err(err) = self.bus.enqueue(COORDINATOR_ID, Message::refresh(self.id())) {
            debug!(router = self.id(), %err, "refresh heartbeat not delivered");
        }
    }

    fn emit_final_table(&self) -> Result<()> {
        let path = report::write_table(&self.config.output_dir, &self.table)?;
        debug!(router = self.id(), path = %path.display(), "final table written");
        Ok(())
    }
}
