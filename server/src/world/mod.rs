pub mod generation;
pub mod load_from_file;
pub mod water_connectivity;
pub mod water_flow;
pub mod water_resolver;
pub mod water_scheduler;
pub mod water_simulation;
pub mod water_sources;

use bevy::prelude::*;
use bevy_ecs::event::EventReader;
use bevy_ecs::system::ResMut;
use shared::world::{BlockKind, ServerWorldMap};
use water_simulation::{apply_block_change, WaterSimulation};

#[derive(Event, Debug, Clone)]
pub struct BlockInteractionEvent {
    pub position: IVec3,
    pub block: Option<BlockKind>, // None = delete, Some = add
}

pub fn handle_block_interactions(
    world_map: Option<ResMut<ServerWorldMap>>,
    mut simulation: ResMut<WaterSimulation>,
    mut events: EventReader<BlockInteractionEvent>,
) {
    let Some(mut world_map) = world_map else {
        events.clear();
        return;
    };

    for event in events.read() {
        let block = event.block.unwrap_or_default().name();
        let applied = apply_block_change(
            &mut simulation,
            &mut *world_map,
            event.position,
            event.block,
        );
        if applied {
            log::debug!("[WATER SIM] Block at {:?} set to {}", event.position, block);
        } else {
            log::debug!(
                "[WATER SIM] Ignored change to {} at {:?}",
                block,
                event.position
            );
        }
    }
}
