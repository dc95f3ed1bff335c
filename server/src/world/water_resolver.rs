//! Applies one step's worth of planned water changes.
//!
//! Planning reads a consistent snapshot; this module is the only place that
//! writes. Changes are applied in a fixed order:
//! 1. Refreshed levels and distances of cells that are still justified
//! 2. Cells whose world block changed out-of-band (store only)
//! 3. Evaporations (world and store)
//! 4. Flow proposals, downward first, then deepest first
//!
//! Every flow is re-checked against the state as it is at commit time, so an
//! earlier commit in the same step can invalidate a later one.

use bevy::prelude::*;
use shared::world::{BlockKind, WaterBlockStore, WaterCell, WorldMap, SIX_OFFSETS};
use std::cmp::Reverse;

use super::water_connectivity::ConnectivityChecker;
use super::water_flow::{can_receive, PendingFlow};
use super::water_scheduler::WaterSimulationQueue;
use super::water_sources::SourceRegistry;

/// Everything one step decided, before any of it is applied.
#[derive(Debug, Default, Clone)]
pub struct TickPlan {
    pub refreshed: Vec<(IVec3, WaterCell)>,
    pub evaporated: Vec<IVec3>,
    /// Cells whose world block is no longer water.
    pub reconciled: Vec<IVec3>,
    pub flows: Vec<PendingFlow>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResolveOutcome {
    pub committed: usize,
    pub rejected: usize,
    pub evaporated: usize,
    pub reconciled: usize,
    /// Flows left over once the commit budget ran out.
    pub deferred: Vec<PendingFlow>,
}

/// Orders flows so gravity wins contention: downward flows first, then by
/// descending level. The sort is stable, so ties keep proposal order.
pub fn sort_flows(flows: &mut [PendingFlow]) {
    flows.sort_by_key(|flow| (!flow.is_downward(), Reverse(flow.level)));
}

pub struct FlowResolver<'a, W: WorldMap> {
    world: &'a mut W,
    store: &'a mut WaterBlockStore,
    sources: &'a mut SourceRegistry,
    queue: &'a mut WaterSimulationQueue,
}

impl<'a, W: WorldMap> FlowResolver<'a, W> {
    pub fn new(
        world: &'a mut W,
        store: &'a mut WaterBlockStore,
        sources: &'a mut SourceRegistry,
        queue: &'a mut WaterSimulationQueue,
    ) -> Self {
        Self {
            world,
            store,
            sources,
            queue,
        }
    }

    /// Applies `plan`, committing at most `budget` flows.
    pub fn apply(&mut self, plan: TickPlan, budget: usize) -> ResolveOutcome {
        let mut outcome = ResolveOutcome::default();

        for (pos, cell) in plan.refreshed {
            if self.store.get(&pos).is_some_and(|current| current != cell) {
                self.store.upsert(pos, cell);
                self.queue_occupied_neighbors(pos);
            }
        }

        for pos in plan.reconciled {
            self.reconcile(pos);
            outcome.reconciled += 1;
        }

        for pos in plan.evaporated {
            if self.evaporate(pos) {
                outcome.evaporated += 1;
            }
        }

        let mut flows = plan.flows;
        sort_flows(&mut flows);
        let mut remaining = flows.into_iter();
        for flow in remaining.by_ref() {
            if outcome.committed >= budget {
                outcome.deferred.push(flow);
                break;
            }
            if self.try_commit(&flow) {
                outcome.committed += 1;
            } else {
                outcome.rejected += 1;
            }
        }
        outcome.deferred.extend(remaining);

        outcome
    }

    /// Retries flows deferred by earlier steps. Returns how many committed.
    pub fn commit_deferred(&mut self, mut flows: Vec<PendingFlow>) -> usize {
        sort_flows(&mut flows);
        flows.iter().filter(|flow| self.try_commit(flow)).count()
    }

    /// Removes an unjustified cell: the world block goes back to air (only if
    /// it still is water) and its neighbours are queued.
    pub fn evaporate(&mut self, pos: IVec3) -> bool {
        if self.sources.contains(&pos) {
            return false;
        }
        if self.world.get_block(&pos).is_water() {
            self.world.set_block(&pos, BlockKind::Air);
        }
        let removed = self.store.remove(&pos).is_some();
        if removed {
            log::trace!("[WATER SIM] Evaporated {:?}", pos);
            self.queue_occupied_neighbors(pos);
        }
        removed
    }

    /// Drops a cell whose world block is no longer water, leaving the world
    /// untouched.
    pub fn reconcile(&mut self, pos: IVec3) {
        self.store.remove(&pos);
        if self.sources.forget(&pos) {
            log::debug!("[WATER SIM] Source at {:?} vanished from the world", pos);
        }
        self.queue_occupied_neighbors(pos);
    }

    /// Commits `flow` if its origin still holds water and its target can
    /// still take it.
    pub fn try_commit(&mut self, flow: &PendingFlow) -> bool {
        if !self.store.contains(&flow.from) {
            return false;
        }
        if !can_receive(&*self.world, &*self.store, flow.to, flow.level) {
            return false;
        }

        let existing = match self.world.get_block(&flow.to) {
            BlockKind::Air => {
                self.world.set_block(&flow.to, BlockKind::Water);
                None
            }
            _ => self.store.get(&flow.to),
        };

        let mut cell = WaterCell {
            level: existing.map_or(flow.level, |c| c.level.max(flow.level)),
            is_source: false,
            distance_from_source: 0,
            is_waterfall_landing: flow.is_waterfall
                || existing.is_some_and(|c| c.is_waterfall_landing),
        };
        if !flow.is_waterfall {
            cell.distance_from_source =
                ConnectivityChecker::new(&*self.store, &*self.sources)
                    .distance_for_cell(flow.to, &cell);
        }

        self.store.upsert(flow.to, cell);
        self.queue.queue(flow.to);
        true
    }

    fn queue_occupied_neighbors(&mut self, pos: IVec3) {
        for offset in SIX_OFFSETS {
            let neighbor = pos + offset;
            if self.store.contains(&neighbor) {
                self.queue.queue(neighbor);
            }
        }
    }
}
