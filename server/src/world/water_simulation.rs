//! Leveled water flow simulation for the server.
//!
//! [`WaterSimulation`] owns every piece of water state: the cell store, the
//! source registry, the update queue and the scheduler. It is a Bevy resource,
//! but nothing in it depends on the ECS, so it can be driven directly with
//! [`WaterSimulation::step`] against any [`WorldMap`].
//!
//! ## Design Principles
//! - Water simulation is server-authoritative and the sole writer of water
//!   blocks; other systems go through `add_source` / `remove_source`
//! - Cost scales with active water: every step works on a bounded batch
//! - A step plans against a snapshot and only then applies, so results do not
//!   depend on the order cells were visited in
//!
//! ## Step
//! 1. Retry a slice of flows deferred by earlier steps
//! 2. Build the batch (queued cells first, then a round-robin slice)
//! 3. Plan: revalidate batch cells and collect flow proposals, including from
//!    every source and deep cell outside the batch
//! 4. Apply the plan through [`FlowResolver`], deferring what is over budget
//! 5. Re-assert source cells

use bevy::prelude::*;
use shared::water::constants::ALWAYS_ACTIVE_MIN_LEVEL;
use shared::water::WaterFlowConfig;
use shared::world::{
    world_to_block_pos, BlockKind, ServerWorldMap, WaterBlockStore, WaterCell, WaterLevel,
    WorldMap, SIX_OFFSETS,
};
use std::collections::HashSet;

use super::water_connectivity::ConnectivityChecker;
use super::water_flow::FlowCandidateGenerator;
use super::water_resolver::{FlowResolver, TickPlan};
use super::water_scheduler::{FlowScheduler, PopulationClass, WaterSimulationQueue};
use super::water_sources::SourceRegistry;

/// Seconds between performance log lines.
const PERFORMANCE_LOG_INTERVAL: f32 = 5.0;

/// Running counters, reported through [`WaterSimulation::performance_summary`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WaterFlowStats {
    pub population: usize,
    pub sources: usize,
    pub queued: usize,
    pub deferred: usize,
    pub steps: u64,
    pub flows_committed: u64,
    pub cells_evaporated: u64,
    pub flows_dropped: u64,
}

#[derive(Resource, Debug, Default, Clone)]
pub struct WaterSimulation {
    config: WaterFlowConfig,
    store: WaterBlockStore,
    sources: SourceRegistry,
    queue: WaterSimulationQueue,
    scheduler: FlowScheduler,
    stats: WaterFlowStats,
    /// Whether initial source discovery has run.
    seeded: bool,
}

impl WaterSimulation {
    pub fn new(config: WaterFlowConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &WaterFlowConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WaterFlowConfig) {
        self.config = config;
    }

    pub fn store(&self) -> &WaterBlockStore {
        &self.store
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn stats(&self) -> &WaterFlowStats {
        &self.stats
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Registers a permanent source. Returns false when `pos` is solid.
    pub fn add_source(&mut self, world: &mut impl WorldMap, pos: IVec3) -> bool {
        self.sources.add(world, &mut self.store, &mut self.queue, pos)
    }

    /// Drops source status at `pos`; dependent water drains over the next
    /// steps.
    pub fn remove_source(&mut self, pos: IVec3) -> bool {
        self.sources.remove(&mut self.store, &mut self.queue, pos)
    }

    /// Registers every water block around `center` as a source. Runs once;
    /// later calls do nothing and return 0.
    pub fn discover_sources(&mut self, world: &mut impl WorldMap, center: Vec3) -> usize {
        if self.seeded {
            return 0;
        }
        self.seeded = true;

        let center = world_to_block_pos(center);
        let radius = self.config.discovery_radius.max(0);
        let vertical = self.config.discovery_vertical_radius.max(0);

        let mut found = Vec::new();
        for x in -radius..=radius {
            for y in -vertical..=vertical {
                for z in -radius..=radius {
                    let pos = center + IVec3::new(x, y, z);
                    if world.get_block(&pos).is_water() && !self.sources.contains(&pos) {
                        found.push(pos);
                    }
                }
            }
        }

        let added = found
            .into_iter()
            .filter(|pos| self.add_source(world, *pos))
            .count();
        log::info!(
            "[WATER SIM] Discovered {} water sources around {:?}",
            added,
            center
        );
        added
    }

    /// Re-queues `pos` and its water neighbours after an out-of-band block
    /// change. The step that visits them reconciles the store.
    pub fn notify_block_changed(&mut self, pos: IVec3) {
        for candidate in std::iter::once(pos).chain(SIX_OFFSETS.iter().map(|o| pos + *o)) {
            if self.store.contains(&candidate) {
                self.queue.queue(candidate);
            }
        }
    }

    /// Advances the step timer by `delta` seconds and runs a step when one is
    /// due. Returns whether a step ran.
    pub fn update(&mut self, delta: f32, world: &mut impl WorldMap) -> bool {
        if !self.config.enabled {
            return false;
        }
        if !self.scheduler.advance(delta, self.store.len(), &self.config) {
            return false;
        }
        self.step(world);
        true
    }

    /// Runs one simulation step unconditionally.
    pub fn step<W: WorldMap>(&mut self, world: &mut W) {
        let pending = self.scheduler.take_pending_slice(&self.config);
        let retried = pending.len();
        let recommitted = if pending.is_empty() {
            0
        } else {
            FlowResolver::new(world, &mut self.store, &mut self.sources, &mut self.queue)
                .commit_deferred(pending)
        };

        let population = self.store.sorted_positions();
        let batch_size = FlowScheduler::batch_size_for(population.len(), &self.config);
        let batch = self
            .scheduler
            .build_batch(&mut self.queue, &self.store, &population, batch_size);

        let plan = self.plan_tick(&*world, &batch, &population);
        let proposed = plan.flows.len();

        let outcome = FlowResolver::new(world, &mut self.store, &mut self.sources, &mut self.queue)
            .apply(plan, self.config.max_commits_per_step);
        let deferred = outcome.deferred.len();
        let dropped = self.scheduler.defer(outcome.deferred, &self.config);

        self.reassert_sources(world);

        self.stats.steps += 1;
        self.stats.flows_committed += (outcome.committed + recommitted) as u64;
        self.stats.cells_evaporated += (outcome.evaporated + outcome.reconciled) as u64;
        self.stats.flows_dropped += dropped as u64;
        self.refresh_counts();

        log::debug!(
            "[WATER SIM] Step {}: batch {}, {} proposed, {} committed, {} rejected, {} evaporated, {} deferred, {}/{} retried",
            self.stats.steps,
            batch.len(),
            proposed,
            outcome.committed,
            outcome.rejected,
            outcome.evaporated,
            deferred,
            recommitted,
            retried
        );
    }

    /// Plans one step against the current state without changing anything.
    ///
    /// Every batch cell is reconciled with the world, revalidated and asked
    /// for proposals. Sources and cells at `ALWAYS_ACTIVE_MIN_LEVEL` or above
    /// in `population` also propose, even outside the batch.
    pub fn plan_tick<W: WorldMap>(
        &self,
        world: &W,
        batch: &[IVec3],
        population: &[IVec3],
    ) -> TickPlan {
        let checker = ConnectivityChecker::new(&self.store, &self.sources);
        let generator = FlowCandidateGenerator::new(world, &self.store);
        let mut plan = TickPlan::default();
        let mut processed = HashSet::with_capacity(batch.len());

        for &pos in batch {
            let Some(cell) = self.store.get(&pos) else {
                continue;
            };
            if !processed.insert(pos) {
                continue;
            }

            if !world.get_block(&pos).is_water() {
                plan.reconciled.push(pos);
                continue;
            }

            let refreshed = if self.sources.contains(&pos) {
                WaterCell::source()
            } else if checker.has_reachable_source(pos) {
                let cell = WaterCell {
                    is_source: false,
                    ..cell
                };
                WaterCell {
                    level: checker.level_for_cell(pos, &cell),
                    distance_from_source: checker.distance_for_cell(pos, &cell),
                    ..cell
                }
            } else {
                plan.evaporated.push(pos);
                continue;
            };

            plan.refreshed.push((pos, refreshed));
            plan.flows.extend(generator.propose(pos, &refreshed).into_flows());
        }

        for &pos in population {
            if processed.contains(&pos) {
                continue;
            }
            let Some(cell) = self.store.get(&pos) else {
                continue;
            };
            let always_active =
                self.sources.contains(&pos) || cell.level >= ALWAYS_ACTIVE_MIN_LEVEL;
            if always_active && world.get_block(&pos).is_water() {
                plan.flows.extend(generator.propose(pos, &cell).into_flows());
            }
        }

        plan
    }

    /// Forces every registered source back to a full cell. Sources whose
    /// block disappeared from the world are dropped instead.
    pub fn reassert_sources<W: WorldMap>(&mut self, world: &mut W) {
        let mut vanished = Vec::new();
        for pos in self.sources.iter() {
            if world.get_block(pos).is_water() {
                if self.store.get(pos) != Some(WaterCell::source()) {
                    self.store.upsert(*pos, WaterCell::source());
                }
            } else {
                vanished.push(*pos);
            }
        }

        if vanished.is_empty() {
            return;
        }
        let mut resolver =
            FlowResolver::new(world, &mut self.store, &mut self.sources, &mut self.queue);
        for pos in vanished {
            resolver.reconcile(pos);
        }
    }

    /// Level at `pos`, 0 when dry.
    pub fn water_level_at(&self, pos: IVec3) -> WaterLevel {
        self.store.level_at(&pos)
    }

    pub fn is_source_at(&self, pos: IVec3) -> bool {
        self.sources.contains(&pos)
    }

    /// Surface height for rendering, 0 when dry.
    pub fn visual_height_at(&self, pos: IVec3) -> f32 {
        self.store
            .get(&pos)
            .map_or(0.0, |cell| cell.visual_height())
    }

    pub fn performance_summary(&self) -> String {
        let population = self.store.len();
        format!(
            "{} cells ({} population), {} sources, interval {:.2}s, batch {}, {} queued, {} deferred, {} steps",
            population,
            PopulationClass::classify(population, &self.config),
            self.sources.len(),
            FlowScheduler::interval_for(population, &self.config),
            FlowScheduler::batch_size_for(population, &self.config),
            self.queue.len(),
            self.scheduler.pending_len(),
            self.stats.steps
        )
    }

    fn refresh_counts(&mut self) {
        self.stats.population = self.store.len();
        self.stats.sources = self.sources.len();
        self.stats.queued = self.queue.len();
        self.stats.deferred = self.scheduler.pending_len();
    }
}

/// Ticks the water simulation. Does nothing until a world exists, and seeds
/// sources around the player the first time one is known.
pub fn water_simulation_system(
    time: Res<Time>,
    world_map: Option<ResMut<ServerWorldMap>>,
    mut simulation: ResMut<WaterSimulation>,
) {
    let Some(mut world_map) = world_map else {
        return;
    };

    if !simulation.is_seeded() {
        let Some(player_position) = world_map.player_position() else {
            return;
        };
        simulation.discover_sources(&mut *world_map, player_position);
    }

    simulation.update(time.delta_secs(), &mut *world_map);
}

pub fn water_performance_log_system(
    time: Res<Time>,
    simulation: Res<WaterSimulation>,
    mut elapsed: Local<f32>,
) {
    *elapsed += time.delta_secs();
    if *elapsed < PERFORMANCE_LOG_INTERVAL {
        return;
    }
    *elapsed = 0.0;

    if !simulation.store().is_empty() {
        log::debug!("[WATER SIM] {}", simulation.performance_summary());
    }
}

/// Writes `block` at `pos` on behalf of a player or another system and keeps
/// the simulation in sync. Returns false when nothing changed: a source was
/// refused, or there was nothing to remove.
pub fn apply_block_change(
    simulation: &mut WaterSimulation,
    world: &mut impl WorldMap,
    pos: IVec3,
    block: Option<BlockKind>,
) -> bool {
    match block {
        Some(BlockKind::Water) => simulation.add_source(world, pos),
        Some(BlockKind::Solid) => {
            simulation.remove_source(pos);
            world.set_block(&pos, BlockKind::Solid);
            simulation.notify_block_changed(pos);
            true
        }
        Some(BlockKind::Air) | None => {
            if simulation.is_source_at(pos) {
                simulation.remove_source(pos)
            } else if world.get_block(&pos).is_solid() {
                world.set_block(&pos, BlockKind::Air);
                simulation.notify_block_changed(pos);
                true
            } else {
                false
            }
        }
    }
}
