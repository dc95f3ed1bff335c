//! Step pacing and batch selection for the water flow simulation.
//!
//! The scheduler decides *when* a simulation step runs and *which* cells it
//! looks at:
//! - A per-frame accumulator is compared against an interval derived from the
//!   current population. Crossing it fires one step and resets to zero, so a
//!   slow frame never triggers a burst of catch-up steps.
//! - Each step processes a bounded batch: queued positions first, then a
//!   round-robin slice of the whole population so steady cells are revisited
//!   even when nothing queues them.
//! - Flows that did not fit in a step's commit budget are deferred and
//!   retried a third at a time.

use bevy::prelude::*;
use shared::water::WaterFlowConfig;
use shared::world::WaterBlockStore;
use std::collections::{HashSet, VecDeque};
use std::fmt;

use super::water_flow::PendingFlow;

/// Positions that need to be looked at on the next step.
#[derive(Debug, Default, Clone)]
pub struct WaterSimulationQueue {
    /// Positions queued for water simulation (global coordinates)
    pending: VecDeque<IVec3>,
    /// Set for O(1) duplicate checking
    pending_set: HashSet<IVec3>,
}

impl WaterSimulationQueue {
    /// Queue a position for water simulation
    pub fn queue(&mut self, pos: IVec3) {
        if self.pending_set.insert(pos) {
            self.pending.push_back(pos);
        }
    }

    /// Queue multiple positions (useful for batch operations)
    pub fn queue_many(&mut self, positions: impl IntoIterator<Item = IVec3>) {
        for pos in positions {
            self.queue(pos);
        }
    }

    /// Get the next position to simulate, if any
    pub fn pop(&mut self) -> Option<IVec3> {
        let pos = self.pending.pop_front()?;
        self.pending_set.remove(&pos);
        Some(pos)
    }

    pub fn contains(&self, pos: &IVec3) -> bool {
        self.pending_set.contains(pos)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Coarse population size, which picks the step interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationClass {
    Small,
    Medium,
    Large,
}

impl PopulationClass {
    pub fn classify(population: usize, config: &WaterFlowConfig) -> Self {
        if population <= config.small_population {
            PopulationClass::Small
        } else if population <= config.large_population {
            PopulationClass::Medium
        } else {
            PopulationClass::Large
        }
    }

    pub fn interval(self, config: &WaterFlowConfig) -> f32 {
        match self {
            PopulationClass::Small => config.slow_interval,
            PopulationClass::Medium => config.base_interval,
            PopulationClass::Large => config.fast_interval,
        }
    }
}

impl fmt::Display for PopulationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PopulationClass::Small => "small",
            PopulationClass::Medium => "medium",
            PopulationClass::Large => "large",
        })
    }
}

/// Step timer, batch cursor and deferred flows.
#[derive(Debug, Default, Clone)]
pub struct FlowScheduler {
    accumulator: f32,
    population_class: Option<PopulationClass>,
    /// Round-robin position into the sorted population.
    revisit_cursor: usize,
    pending_flows: VecDeque<PendingFlow>,
}

impl FlowScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step interval for a population of `population` cells.
    pub fn interval_for(population: usize, config: &WaterFlowConfig) -> f32 {
        PopulationClass::classify(population, config).interval(config)
    }

    /// Batch size for a population of `population` cells.
    pub fn batch_size_for(population: usize, config: &WaterFlowConfig) -> usize {
        let max = config.max_batch_size.max(config.min_batch_size);
        population.clamp(config.min_batch_size, max)
    }

    /// Adds `delta` seconds and reports whether a step is due. The interval is
    /// recomputed from `population` on every call; firing resets the
    /// accumulator to zero.
    pub fn advance(&mut self, delta: f32, population: usize, config: &WaterFlowConfig) -> bool {
        let class = PopulationClass::classify(population, config);
        if self.population_class != Some(class) {
            log::debug!(
                "[WATER SIM] Population {} is {}, interval now {:.2}s",
                population,
                class,
                class.interval(config)
            );
        }
        self.population_class = Some(class);

        self.accumulator += delta.max(0.0);
        if self.accumulator >= class.interval(config) {
            self.accumulator = 0.0;
            true
        } else {
            false
        }
    }

    /// Builds the position batch for one step: queued positions first (skipping
    /// ones that no longer hold water), then a round-robin slice of
    /// `population` (sorted positions of the store).
    pub fn build_batch(
        &mut self,
        queue: &mut WaterSimulationQueue,
        store: &WaterBlockStore,
        population: &[IVec3],
        batch_size: usize,
    ) -> Vec<IVec3> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut seen = HashSet::with_capacity(batch_size);

        while batch.len() < batch_size {
            let Some(pos) = queue.pop() else {
                break;
            };
            if store.contains(&pos) && seen.insert(pos) {
                batch.push(pos);
            }
        }

        let queued = batch.len();
        if !population.is_empty() {
            let start = self.revisit_cursor % population.len();
            let mut consumed = 0;
            while batch.len() < batch_size && consumed < population.len() {
                let pos = population[(start + consumed) % population.len()];
                consumed += 1;
                if seen.insert(pos) {
                    batch.push(pos);
                }
            }
            self.revisit_cursor = (start + consumed) % population.len();
        }

        log::trace!(
            "[WATER SIM] Batch of {} ({} queued, {} revisited)",
            batch.len(),
            queued,
            batch.len() - queued
        );
        batch
    }

    /// Takes roughly a third of the deferred flows, capped per step.
    pub fn take_pending_slice(&mut self, config: &WaterFlowConfig) -> Vec<PendingFlow> {
        if self.pending_flows.is_empty() {
            return Vec::new();
        }
        let divisor = config.pending_divisor.max(1);
        let count = self
            .pending_flows
            .len()
            .div_ceil(divisor)
            .min(config.max_pending_per_step.max(1));
        self.pending_flows.drain(..count).collect()
    }

    /// Defers flows to a later step. Returns how many were dropped because the
    /// deferred queue is full.
    pub fn defer(&mut self, flows: Vec<PendingFlow>, config: &WaterFlowConfig) -> usize {
        let mut dropped = 0;
        for flow in flows {
            if self.pending_flows.len() >= config.max_pending_flows {
                dropped += 1;
            } else {
                self.pending_flows.push_back(flow);
            }
        }
        if dropped > 0 {
            log::debug!(
                "[WATER SIM] Deferred flow queue full, dropped {} flows",
                dropped
            );
        }
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.pending_flows.len()
    }

    pub fn population_class(&self) -> Option<PopulationClass> {
        self.population_class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::world::WaterCell;

    fn flow(x: i32) -> PendingFlow {
        PendingFlow {
            from: IVec3::new(x, 0, 0),
            to: IVec3::new(x + 1, 0, 0),
            level: 3,
            is_waterfall: false,
        }
    }

    #[test]
    fn test_water_simulation_queue() {
        let mut queue = WaterSimulationQueue::default();

        queue.queue(IVec3::new(0, 0, 0));
        queue.queue(IVec3::new(1, 0, 0));
        queue.queue(IVec3::new(0, 0, 0)); // Duplicate - should not be added

        assert_eq!(queue.len(), 2);
        assert!(queue.contains(&IVec3::new(1, 0, 0)));

        assert_eq!(queue.pop(), Some(IVec3::new(0, 0, 0)));
        assert_eq!(queue.pop(), Some(IVec3::new(1, 0, 0)));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_interval_follows_population() {
        let config = WaterFlowConfig::default();
        assert_eq!(FlowScheduler::interval_for(0, &config), 0.30);
        assert_eq!(FlowScheduler::interval_for(10, &config), 0.30);
        assert_eq!(FlowScheduler::interval_for(11, &config), 0.20);
        assert_eq!(FlowScheduler::interval_for(50, &config), 0.20);
        assert_eq!(FlowScheduler::interval_for(51, &config), 0.15);
    }

    #[test]
    fn test_batch_size_is_clamped() {
        let config = WaterFlowConfig::default();
        assert_eq!(FlowScheduler::batch_size_for(3, &config), 30);
        assert_eq!(FlowScheduler::batch_size_for(64, &config), 64);
        assert_eq!(FlowScheduler::batch_size_for(5000, &config), 100);
    }

    #[test]
    fn test_accumulator_resets_without_catch_up() {
        let config = WaterFlowConfig::default();
        let mut scheduler = FlowScheduler::new();

        assert!(!scheduler.advance(0.12, 5, &config));
        assert!(!scheduler.advance(0.12, 5, &config));
        assert!(scheduler.advance(0.12, 5, &config));

        // A huge frame fires once, then the wait starts from zero again
        assert!(scheduler.advance(10.0, 5, &config));
        assert!(!scheduler.advance(0.1, 5, &config));
        assert_eq!(scheduler.population_class(), Some(PopulationClass::Small));
    }

    #[test]
    fn test_batch_prefers_queue_then_revisits_population() {
        let mut store = WaterBlockStore::new();
        for x in 0..5 {
            store.upsert(IVec3::new(x, 0, 0), WaterCell::flowing(3, 1));
        }
        let population = store.sorted_positions();
        let mut queue = WaterSimulationQueue::default();
        queue.queue(IVec3::new(3, 0, 0));
        queue.queue(IVec3::new(99, 0, 0)); // dry, skipped

        let mut scheduler = FlowScheduler::new();
        let batch = scheduler.build_batch(&mut queue, &store, &population, 3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], IVec3::new(3, 0, 0));
        assert!(queue.is_empty());

        // Successive batches rotate through the population
        let mut visited: HashSet<IVec3> = batch.into_iter().collect();
        for _ in 0..3 {
            visited.extend(scheduler.build_batch(&mut queue, &store, &population, 2));
        }
        assert_eq!(visited.len(), 5);
    }

    #[test]
    fn test_pending_flows_are_throttled() {
        let config = WaterFlowConfig::default();
        let mut scheduler = FlowScheduler::new();
        scheduler.defer((0..9).map(flow).collect(), &config);

        assert_eq!(scheduler.take_pending_slice(&config).len(), 3);
        assert_eq!(scheduler.take_pending_slice(&config).len(), 2);
        assert_eq!(scheduler.pending_len(), 4);
    }

    #[test]
    fn test_defer_drops_overflow() {
        let config = WaterFlowConfig {
            max_pending_flows: 4,
            ..Default::default()
        };
        let mut scheduler = FlowScheduler::new();
        let dropped = scheduler.defer((0..6).map(flow).collect(), &config);
        assert_eq!(dropped, 2);
        assert_eq!(scheduler.pending_len(), 4);
    }
}
