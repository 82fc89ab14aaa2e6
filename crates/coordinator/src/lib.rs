//! The coordinator: reads the topology, launches one routing agent per node,
//! seeds the network with its direct edges, waits for the gossip to go
//! quiet, then terminates and reaps every agent.

pub mod topology;

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use eyre::{Result, WrapErr as _, ensure};
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep},
};
use tracing::{debug, info, trace, warn};

use dvsim_bus::{DEFAULT_MAILBOX_CAPACITY, EnqueueError, Mailbox, MessageBus};
use dvsim_primitives::{COORDINATOR_ID, Cost, Message, NodeId, RoutingEntry, wire};
use dvsim_router::{Router, RouterConfig};

use crate::topology::Topology;

/// Tunable parameters of one simulation run. The defaults are the design
/// constants; tests shrink the windows.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory receiving one routing-table file per router. Recreated
    /// fresh at startup.
    pub output_dir: PathBuf,
    /// A router re-advertises after this long without an outbound update.
    pub update_interval: Duration,
    /// Silence window after which the network counts as converged. Must
    /// exceed twice the update interval, or the detector would fire between
    /// two healthy re-advertisements.
    pub quiescence_timeout: Duration,
    /// Pause between a router's mailbox polls.
    pub agent_poll_interval: Duration,
    /// Pause between the coordinator's mailbox polls.
    pub poll_interval: Duration,
    /// Messages one mailbox buffers before writers see `Full`.
    pub mailbox_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("routing_table"),
            update_interval: Duration::from_millis(500),
            quiescence_timeout: Duration::from_millis(2000),
            agent_poll_interval: Duration::from_millis(10),
            poll_interval: Duration::from_millis(100),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// Per-router outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterOutcome {
    /// The router emitted its final table and exited normally.
    Completed,
    /// The router's task failed or panicked; its table file may be missing.
    Failed(String),
}

/// What a finished run produced, keyed by router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: BTreeMap<NodeId, RouterOutcome>,
}

impl RunSummary {
    pub fn all_completed(&self) -> bool {
        self.outcomes
            .values()
            .all(|outcome| *outcome == RouterOutcome::Completed)
    }

    pub fn failures(&self) -> impl Iterator<Item = (NodeId, &str)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            RouterOutcome::Completed => None,
            RouterOutcome::Failed(reason) => Some((*id, reason.as_str())),
        })
    }
}

pub struct Coordinator {
    config: Config,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        debug_assert!(
            config.quiescence_timeout > config.update_interval * 2,
            "the silence window must outlast two re-advertisement intervals",
        );
        Self { config }
    }

    /// Runs one full simulation: launch, seed, converge, terminate, reap.
    pub async fn run(self, topology: Topology) -> Result<RunSummary> {
        prepare_output_dir(&self.config.output_dir)?;

        let bus = MessageBus::with_capacity(self.config.mailbox_capacity);
        let mut mailbox = bus
            .open(COORDINATOR_ID)
            .wrap_err("failed to create the coordinator mailbox")?;

        let routers = self.launch(&bus, &topology)?;
        self.seed(&bus, &topology).await?;

        info!(
            routers = routers.len(),
            edges = topology.edges().len(),
            "network seeded; waiting for quiescence"
        );
        self.await_quiescence(&mut mailbox).await;

        info!("network quiescent; terminating routers");
        self.reap(&bus, routers).await
    }

    /// Opens every router's mailbox and spawns its task. Mailboxes exist
    /// before any message is enqueued, so the whole seeding fan-out lands
    /// regardless of how late a router first polls.
    fn launch(
        &self,
        bus: &MessageBus,
        topology: &Topology,
    ) -> Result<BTreeMap<NodeId, JoinHandle<Result<()>>>> {
        let mut routers = BTreeMap::new();
        for &id in topology.nodes() {
            let mailbox = bus
                .open(id)
                .wrap_err_with(|| format!("failed to create the mailbox for router {id}"))?;
            let router = Router::new(
                RouterConfig {
                    id,
                    output_dir: self.config.output_dir.clone(),
                    update_interval: self.config.update_interval,
                    poll_interval: self.config.agent_poll_interval,
                },
                bus.clone(),
                mailbox,
            );
            routers.insert(id, router.start());
            debug!(router = id, "router launched");
        }
        Ok(routers)
    }

    /// Seeds every router with its direct edges, then wakes the network.
    /// All inits are enqueued before the first wake.
    async fn seed(&self, bus: &MessageBus, topology: &Topology) -> Result<()> {
        for edge in topology.edges() {
            self.send_init(bus, edge.u, edge.v, edge.cost).await?;
            self.send_init(bus, edge.v, edge.u, edge.cost).await?;
        }
        for &id in topology.nodes() {
            self.enqueue_patiently(bus, id, Message::wake(COORDINATOR_ID))
                .await
                .wrap_err_with(|| format!("failed to wake router {id}"))?;
        }
        Ok(())
    }

    /// One init advertises one direct neighbor: `{neighbor: (cost, neighbor)}`.
    async fn send_init(
        &self,
        bus: &MessageBus,
        target: NodeId,
        neighbor: NodeId,
        cost: Cost,
    ) -> Result<()> {
        let payload = wire::encode(std::iter::once((neighbor, RoutingEntry::new(cost, neighbor))))
            .expect("a single routing entry always fits the payload budget");
        self.enqueue_patiently(bus, target, Message::init(COORDINATOR_ID, payload))
            .await
            .wrap_err_with(|| format!("failed to seed router {target} with neighbor {neighbor}"))
    }

    /// Enqueues without ever blocking the bus: on a full mailbox, yields
    /// until the owner has drained some room. A vanished owner is an error
    /// the caller decides about.
    async fn enqueue_patiently(
        &self,
        bus: &MessageBus,
        target: NodeId,
        message: Message,
    ) -> Result<(), EnqueueError> {
        loop {
            match bus.enqueue(target, message.clone()) {
                Ok(()) => return Ok(()),
                Err(EnqueueError::Full(_)) => sleep(self.config.agent_poll_interval).await,
                Err(err @ EnqueueError::NoSuchTarget(_)) => return Err(err),
            }
        }
    }

    /// Drains the coordinator mailbox until a full silence window elapses
    /// with no traffic. Every received message counts as activity; refresh
    /// heartbeats are advisory, so the detector is time-based rather than
    /// counting-based.
    async fn await_quiescence(&self, mailbox: &mut Mailbox) {
        let mut last_activity = Instant::now();
        loop {
            let mut drained = 0_usize;
            while let Some(message) = mailbox.try_dequeue() {
                trace!(src = message.src_id, kind = %message.kind, "bus activity");
                drained += 1;
            }
            if drained > 0 {
                last_activity = Instant::now();
            }
            if last_activity.elapsed() >= self.config.quiescence_timeout {
                return;
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Terminates every router and awaits its task. Routers own their
    /// mailbox teardown; the coordinator only collects outcomes.
    async fn reap(
        &self,
        bus: &MessageBus,
        routers: BTreeMap<NodeId, JoinHandle<Result<()>>>,
    ) -> Result<RunSummary> {
        for &id in routers.keys() {
            if let Err(err) = self
                .enqueue_patiently(bus, id, Message::terminate(COORDINATOR_ID))
                .await
            {
                // The router is already gone; its join below reports how.
                warn!(router = id, %err, "terminate not delivered");
            }
        }

        let mut outcomes = BTreeMap::new();
        for (id, handle) in routers {
            let outcome = match handle.await {
                Ok(Ok(())) => RouterOutcome::Completed,
                Ok(Err(err)) => {
                    warn!(router = id, error = %err, "router failed");
                    RouterOutcome::Failed(format!("{err:#}"))
                }
                Err(err) => {
                    warn!(router = id, error = %err, "router task did not finish");
                    RouterOutcome::Failed(err.to_string())
                }
            };
            outcomes.insert(id, outcome);
        }
        Ok(RunSummary { outcomes })
    }
}

/// Recreates the output directory from scratch, deleting prior contents, so
/// a finished run's directory holds exactly the files of the routers that
/// completed.
fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .wrap_err_with(|| format!("failed clearing output directory {}", dir.display()))?;
    }
    fs::create_dir_all(dir)
        .wrap_err_with(|| format!("failed creating output directory {}", dir.display()))?;
    ensure!(dir.is_dir(), "{} is not a directory", dir.display());
    Ok(())
}
