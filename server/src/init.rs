use crate::dispatcher;
use crate::world::generation::generate_demo_world;
use crate::world::load_from_file::{load_flow_config, load_scene};
use crate::world::water_simulation::WaterSimulation;
use bevy::prelude::*;
use bevy_app::ScheduleRunnerPlugin;
use shared::water::{WaterFlowConfig, WaterFlowPreset};
use shared::world::{ServerWorldMap, WorldMap};
use shared::{CONFIG_LOAD_ERROR, SCENE_LOAD_ERROR};
use std::path::PathBuf;
use std::time::Duration;

/// Everything the headless server needs to start.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub world_name: String,
    pub scene: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub preset: WaterFlowPreset,
    pub seed: u64,
    pub tick_rate: u64,
    pub max_ticks: Option<u64>,
}

/// Stops the app after this many frames, when set.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct TickLimit(pub Option<u64>);

fn tick_limit_system(
    limit: Res<TickLimit>,
    mut frames: Local<u64>,
    simulation: Res<WaterSimulation>,
    mut ev_app_exit: EventWriter<AppExit>,
) {
    let Some(max_ticks) = limit.0 else {
        return;
    };

    *frames += 1;
    if *frames >= max_ticks {
        log::info!(
            "Tick limit of {} reached, stopping. {}",
            max_ticks,
            simulation.performance_summary()
        );
        ev_app_exit.write(AppExit::Success);
    }
}

pub fn resolve_flow_config(options: &ServerOptions) -> WaterFlowConfig {
    let Some(path) = &options.config else {
        return options.preset.to_config();
    };

    match load_flow_config(path) {
        Ok(config) => config,
        Err(err) => {
            log::warn!(
                "{} {}: {}. Using the '{}' preset.",
                CONFIG_LOAD_ERROR,
                path.display(),
                err,
                options.preset
            );
            options.preset.to_config()
        }
    }
}

pub fn resolve_world(options: &ServerOptions) -> ServerWorldMap {
    let Some(path) = &options.scene else {
        return generate_demo_world(&options.world_name, options.seed);
    };

    match load_scene(path) {
        Ok(scene) => scene.build_world(),
        Err(err) => {
            log::error!(
                "{} {}: {}. Generating a demo world instead.",
                SCENE_LOAD_ERROR,
                path.display(),
                err
            );
            generate_demo_world(&options.world_name, options.seed)
        }
    }
}

pub fn init(options: ServerOptions) {
    let mut app = App::new();
    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
            1.0 / options.tick_rate as f64,
        ))),
    );
    app.add_plugins(bevy_log::LogPlugin::default());

    let config = resolve_flow_config(&options);
    let world_map = resolve_world(&options);

    if world_map.player_position().is_none() {
        log::warn!(
            "World '{}' has no player position, water sources will not be discovered",
            world_map.name
        );
    }

    log::info!(
        "Starting water server on world '{}' at {} ticks/s (preset {}, enabled: {})",
        world_map.name,
        options.tick_rate,
        options.preset,
        config.enabled
    );

    app.insert_resource(WaterSimulation::new(config));
    app.insert_resource(world_map);
    app.insert_resource(TickLimit(options.max_ticks));

    dispatcher::setup_resources_and_events(&mut app);
    dispatcher::register_systems(&mut app);
    app.add_systems(Last, tick_limit_system);

    app.run();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ServerOptions {
        ServerOptions {
            world_name: "test".to_string(),
            scene: None,
            config: None,
            preset: WaterFlowPreset::Responsive,
            seed: 3,
            tick_rate: 20,
            max_ticks: Some(2),
        }
    }

    #[test]
    fn test_missing_files_fall_back() {
        let options = ServerOptions {
            scene: Some(PathBuf::from("/missing/scene.ron")),
            config: Some(PathBuf::from("/missing/config.ron")),
            ..options()
        };
        assert_eq!(
            resolve_flow_config(&options),
            WaterFlowPreset::Responsive.to_config()
        );
        let world = resolve_world(&options);
        assert_eq!(world.name, "test");
        assert!(world.player_position().is_some());
    }

    #[test]
    fn test_tick_limit_requests_exit() {
        let mut app = App::new();
        app.insert_resource(TickLimit(Some(2)));
        app.insert_resource(WaterSimulation::default());
        app.add_systems(Update, tick_limit_system);

        app.update();
        assert!(app.should_exit().is_none());
        app.update();
        assert_eq!(app.should_exit(), Some(AppExit::Success));
    }
}
