//! Per-router routing state: the distance-vector table and the operations
//! that mutate it (seeding folds and Bellman–Ford relaxation).

use std::collections::{BTreeMap, BTreeSet, btree_map};

use tracing::debug;

use crate::{Cost, INF, NodeId};

/// Best known route to one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEntry {
    /// Total cost from the owning router to the destination.
    pub cost: Cost,
    /// The one-hop neighbor on the best known path. Equals the destination
    /// for direct neighbors and for the owner's self-entry.
    pub next_hop: NodeId,
}

impl RoutingEntry {
    pub fn new(cost: Cost, next_hop: NodeId) -> Self {
        Self { cost, next_hop }
    }
}

/// A router's distance-vector table.
///
/// Keyed by destination, iterated destination-ascending. Always contains the
/// owner's self-entry `(0, owner)`; a missing destination means unreachable.
/// Only the owning router mutates its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    owner: NodeId,
    entries: BTreeMap<NodeId, RoutingEntry>,
}

impl RoutingTable {
    /// Creates the table for `owner`, containing only the self-entry.
    pub fn new(owner: NodeId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(owner, RoutingEntry::new(0, owner));
        Self { owner, entries }
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn get(&self, destination: NodeId) -> Option<RoutingEntry> {
        self.entries.get(&destination).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destination-ascending iteration.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, RoutingEntry)> + '_ {
        self.entries.iter().map(|(dest, entry)| (*dest, *entry))
    }

    /// Folds one directly attached edge advertised during seeding.
    ///
    /// Installs `(cost, neighbor)` if the destination is unknown or the
    /// advertised cost beats the stored one, which also makes duplicate
    /// advertisements of the same edge idempotent. The stored next hop for a
    /// direct neighbor is always the neighbor itself. Returns whether the
    /// table changed.
    pub fn fold_direct_edge(&mut self, neighbor: NodeId, cost: Cost) -> bool {
        match self.entries.entry(neighbor) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(RoutingEntry::new(cost, neighbor));
                true
            }
            btree_map::Entry::Occupied(mut slot) => {
                if slot.get().cost > cost {
                    slot.insert(RoutingEntry::new(cost, neighbor));
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Runs the relaxation step against a neighbor's advertised table.
    ///
    /// For each advertised destination the candidate cost is the stored cost
    /// to `src` plus the advertised cost; a candidate is admitted only when it
    /// is strictly cheaper than the stored route (equal-cost paths are not
    /// adopted, which prevents oscillation). Admitted routes take the direct
    /// neighbor that [`Self::resolve_next_hop`] finds for `src`; destinations
    /// whose walk fails are skipped, as are candidates whose cost would reach
    /// [`INF`]. Entries are processed destination-ascending. Returns whether
    /// any route was admitted.
    ///
    /// # Panics
    ///
    /// Panics if the table has no entry for `src`. Update senders are
    /// neighbors and every neighbor is installed during seeding, so a missing
    /// entry is a logic error.
    pub fn relax_from(&mut self, src: NodeId, advertised: &BTreeMap<NodeId, RoutingEntry>) -> bool {
        let src_cost = self
            .entries
            .get(&src)
            .unwrap_or_else(|| {
                panic!(
                    "router {} has no routing entry for update sender {src}; \
                     seeding must install every neighbor before updates flow",
                    self.owner,
                )
            })
            .cost;

        let mut changed = false;
        for (&destination, adv) in advertised {
            if destination == self.owner {
                continue;
            }

            let Some(candidate) = src_cost.checked_add(adv.cost).filter(|cost| *cost < INF)
            else {
                debug!(
                    router = self.owner,
                    destination,
                    via = src,
                    "candidate cost overflows; dropping"
                );
                continue;
            };

            let current = self.entries.get(&destination);
            if current.is_none_or(|entry| candidate < entry.cost) {
                let Some(next_hop) = self.resolve_next_hop(src) else {
                    debug!(
                        router = self.owner,
                        destination,
                        via = src,
                        "next hop for update sender does not resolve; dropping"
                    );
                    continue;
                };
                self.entries
                    .insert(destination, RoutingEntry::new(candidate, next_hop));
                changed = true;
            }
        }
        changed
    }

    /// Resolves the direct neighbor to reach `via`, by following stored next
    /// hops until an entry points at itself.
    ///
    /// The walk is capped at the table length; a longer walk means the chain
    /// runs through a transient cycle and the resolution fails. A missing key
    /// along the chain fails the resolution as well.
    pub fn resolve_next_hop(&self, via: NodeId) -> Option<NodeId> {
        let mut hop = via;
        for _ in 0..self.entries.len() {
            let entry = self.entries.get(&hop)?;
            if entry.next_hop == hop {
                return Some(hop);
            }
            hop = entry.next_hop;
        }
        None
    }

    /// Checks the table's structural invariants against the router's current
    /// neighbor set.
    pub fn validate(&self, neighbors: &BTreeSet<NodeId>) -> Result<(), InvariantViolation> {
        match self.entries.get(&self.owner) {
            None => return Err(InvariantViolation::MissingSelfEntry { owner: self.owner }),
            Some(entry) if entry.cost != 0 || entry.next_hop != self.owner => {
                return Err(InvariantViolation::CorruptSelfEntry {
                    owner: self.owner,
                    entry: *entry,
                });
            }
            Some(_) => {}
        }

        for (&destination, entry) in &self.entries {
            if entry.cost >= INF {
                return Err(InvariantViolation::UnboundedCost {
                    destination,
                    cost: entry.cost,
                });
            }
            if destination == self.owner {
                continue;
            }
            if entry.next_hop != destination && !neighbors.contains(&entry.next_hop) {
                return Err(InvariantViolation::ForeignNextHop {
                    destination,
                    next_hop: entry.next_hop,
                });
            }
            if entry.next_hop != destination {
                let hop_cost = self
                    .entries
                    .get(&entry.next_hop)
                    .map(|hop| hop.cost)
                    .ok_or(InvariantViolation::ForeignNextHop {
                        destination,
                        next_hop: entry.next_hop,
                    })?;
                if hop_cost > entry.cost {
                    return Err(InvariantViolation::HopCostExceedsRoute {
                        destination,
                        next_hop: entry.next_hop,
                        hop_cost,
                        route_cost: entry.cost,
                    });
                }
            }
        }
        Ok(())
    }
}

/// A structural invariant of a routing table does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("router {owner} lost its self-entry")]
    MissingSelfEntry { owner: NodeId },
    #[error("router {owner} has self-entry {entry:?} instead of cost 0 via itself")]
    CorruptSelfEntry { owner: NodeId, entry: RoutingEntry },
    #[error("route to {destination} costs {cost}, at or beyond the unreachable sentinel")]
    UnboundedCost { destination: NodeId, cost: Cost },
    #[error("route to {destination} goes via {next_hop}, which is not a neighbor")]
    ForeignNextHop { destination: NodeId, next_hop: NodeId },
    #[error(
        "route to {destination} costs {route_cost} but its next hop {next_hop} costs {hop_cost}"
    )]
    HopCostExceedsRoute {
        destination: NodeId,
        next_hop: NodeId,
        hop_cost: Cost,
        route_cost: Cost,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(entries: &[(NodeId, Cost, NodeId)]) -> BTreeMap<NodeId, RoutingEntry> {
        entries
            .iter()
            .map(|&(dest, cost, hop)| (dest, RoutingEntry::new(cost, hop)))
            .collect()
    }

    #[test]
    fn new_table_contains_only_the_self_entry() {
        let table = RoutingTable::new(7);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(7), Some(RoutingEntry::new(0, 7)));
    }

    #[test]
    fn fold_direct_edge_is_idempotent() {
        let mut table = RoutingTable::new(1);
        assert!(table.fold_direct_edge(2, 5));
        assert!(!table.fold_direct_edge(2, 5));
        assert_eq!(table.get(2), Some(RoutingEntry::new(5, 2)));
    }

    #[test]
    fn fold_direct_edge_keeps_the_cheaper_cost() {
        let mut table = RoutingTable::new(1);
        table.fold_direct_edge(2, 5);
        assert!(!table.fold_direct_edge(2, 9));
        assert!(table.fold_direct_edge(2, 3));
        assert_eq!(table.get(2), Some(RoutingEntry::new(3, 2)));
    }

    #[test]
    fn relaxation_admits_a_strictly_cheaper_route() {
        // Triangle: 1-2 costs 1, 1-3 costs 5, and 2 advertises 3 at cost 1.
        let mut table = RoutingTable::new(1);
        table.fold_direct_edge(2, 1);
        table.fold_direct_edge(3, 5);

        let changed = table.relax_from(2, &fragment(&[(1, 1, 1), (2, 0, 2), (3, 1, 3)]));
        assert!(changed);
        assert_eq!(table.get(3), Some(RoutingEntry::new(2, 2)));
    }

    #[test]
    fn relaxation_rejects_equal_cost_routes() {
        let mut table = RoutingTable::new(1);
        table.fold_direct_edge(2, 1);
        table.fold_direct_edge(3, 1);
        table.relax_from(2, &fragment(&[(4, 1, 4)]));
        assert_eq!(table.get(4), Some(RoutingEntry::new(2, 2)));

        // The same total cost via 3 must not displace the route via 2.
        let changed = table.relax_from(3, &fragment(&[(4, 1, 4)]));
        assert!(!changed);
        assert_eq!(table.get(4), Some(RoutingEntry::new(2, 2)));
    }

    #[test]
    fn relaxation_is_idempotent() {
        let mut table = RoutingTable::new(1);
        table.fold_direct_edge(2, 1);
        let advertised = fragment(&[(3, 4, 3), (4, 6, 3)]);

        assert!(table.relax_from(2, &advertised));
        assert!(!table.relax_from(2, &advertised));
    }

    #[test]
    fn relaxation_skips_the_owner() {
        let mut table = RoutingTable::new(1);
        table.fold_direct_edge(2, 3);

        // 2 advertises a route back to 1; the self-entry must stay at cost 0.
        assert!(!table.relax_from(2, &fragment(&[(1, 3, 1)])));
        assert_eq!(table.get(1), Some(RoutingEntry::new(0, 1)));
    }

    #[test]
    fn relaxation_drops_overflowing_candidates() {
        let mut table = RoutingTable::new(1);
        table.fold_direct_edge(2, 10);

        assert!(!table.relax_from(2, &fragment(&[(3, Cost::MAX - 5, 3)])));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn next_hop_resolves_through_multi_hop_chains() {
        let mut table = RoutingTable::new(1);
        table.fold_direct_edge(2, 1);
        // Learned route: 3 is reached via 2.
        table.relax_from(2, &fragment(&[(3, 1, 3)]));
        table.relax_from(2, &fragment(&[(3, 1, 3), (4, 2, 4)]));

        assert_eq!(table.resolve_next_hop(2), Some(2));
        assert_eq!(table.resolve_next_hop(3), Some(2));
        assert_eq!(table.resolve_next_hop(4), Some(2));
    }

    #[test]
    fn next_hop_resolution_fails_on_missing_keys_and_cycles() {
        let mut table = RoutingTable::new(1);
        assert_eq!(table.resolve_next_hop(9), None);

        // Transient cycle: 5 -> 6 -> 5. The capped walk must bail out.
        table.fold_direct_edge(2, 1);
        table.relax_from(2, &fragment(&[(5, 1, 5)]));
        table.relax_from(2, &fragment(&[(6, 2, 6)]));
        let mut cyclic = table.clone();
        cyclic.entries.insert(5, RoutingEntry::new(2, 6));
        cyclic.entries.insert(6, RoutingEntry::new(3, 5));
        assert_eq!(cyclic.resolve_next_hop(5), None);
    }

    #[test]
    #[should_panic(expected = "no routing entry for update sender")]
    fn relaxation_from_an_unknown_sender_is_a_logic_error() {
        let mut table = RoutingTable::new(1);
        table.relax_from(2, &fragment(&[(3, 1, 3)]));
    }

    #[test]
    fn validate_accepts_a_consistent_table() {
        let mut table = RoutingTable::new(1);
        table.fold_direct_edge(2, 1);
        table.relax_from(2, &fragment(&[(3, 1, 3)]));

        let neighbors = BTreeSet::from([2]);
        assert_eq!(table.validate(&neighbors), Ok(()));
    }

    #[test]
    fn validate_rejects_a_lost_self_entry() {
        let mut table = RoutingTable::new(1);
        table.entries.remove(&1);
        assert_eq!(
            table.validate(&BTreeSet::new()),
            Err(InvariantViolation::MissingSelfEntry { owner: 1 })
        );
    }

    #[test]
    fn validate_rejects_a_next_hop_outside_the_neighbor_set() {
        let mut table = RoutingTable::new(1);
        table.entries.insert(3, RoutingEntry::new(4, 2));
        assert_eq!(
            table.validate(&BTreeSet::new()),
            Err(InvariantViolation::ForeignNextHop {
                destination: 3,
                next_hop: 2
            })
        );
    }
}
