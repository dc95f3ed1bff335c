use crate::world;
use crate::world::water_simulation::{water_performance_log_system, water_simulation_system};
use crate::world::BlockInteractionEvent;
use bevy::prelude::*;

pub fn setup_resources_and_events(app: &mut App) {
    app.add_event::<BlockInteractionEvent>();
}

pub fn register_systems(app: &mut App) {
    // Block changes land before the step that reacts to them
    app.add_systems(
        Update,
        (
            world::handle_block_interactions,
            water_simulation_system,
            water_performance_log_system,
        )
            .chain(),
    );
}
