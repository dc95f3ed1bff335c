use bevy::prelude::*;
use ron::de::from_str;
use serde::{Deserialize, Serialize};
use shared::water::WaterFlowConfig;
use shared::world::{BlockKind, ServerWorldMap, WorldMap};
use std::fs;
use std::path::Path;

/// An inclusive box of solid blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBox {
    pub min: IVec3,
    pub max: IVec3,
}

/// A hand-written test scene.
///
/// Water blocks in a scene become sources once the simulation discovers them
/// around the player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneData {
    pub name: String,
    pub player_position: Option<Vec3>,
    pub solids: Vec<BlockBox>,
    pub water: Vec<IVec3>,
}

impl SceneData {
    pub fn build_world(&self) -> ServerWorldMap {
        let mut world = ServerWorldMap::new(self.name.clone());
        for block_box in &self.solids {
            world.fill_box(block_box.min, block_box.max, BlockKind::Solid);
        }
        for pos in &self.water {
            world.set_block(pos, BlockKind::Water);
        }
        world.player_position = self.player_position;
        world
    }
}

pub fn parse_scene(contents: &str) -> Result<SceneData, Box<dyn std::error::Error>> {
    Ok(from_str(contents)?)
}

pub fn load_scene(path: &Path) -> Result<SceneData, Box<dyn std::error::Error>> {
    let contents: String = fs::read_to_string(path)?;
    let scene = parse_scene(&contents)?;

    log::info!(
        "Loaded scene '{}' from {}: {} boxes, {} water blocks",
        scene.name,
        path.display(),
        scene.solids.len(),
        scene.water.len()
    );

    Ok(scene)
}

/// Loads a [`WaterFlowConfig`] from a RON file. Missing fields keep their
/// defaults.
pub fn load_flow_config(path: &Path) -> Result<WaterFlowConfig, Box<dyn std::error::Error>> {
    let contents: String = fs::read_to_string(path)?;
    let config: WaterFlowConfig = from_str(&contents)?;

    log::info!("Found water flow config on disk: {}", path.display());

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL_SCENE: &str = r#"(
        name: "pool",
        player_position: Some((0.5, 11.0, 0.5)),
        solids: [
            (min: (-4, 9, -4), max: (4, 9, 4)),
        ],
        water: [(0, 10, 0), (1, 10, 0)],
    )"#;

    #[test]
    fn test_parse_scene() {
        let scene = parse_scene(POOL_SCENE).unwrap();
        assert_eq!(scene.name, "pool");
        assert_eq!(scene.player_position, Some(Vec3::new(0.5, 11.0, 0.5)));
        assert_eq!(
            scene.solids,
            vec![BlockBox {
                min: IVec3::new(-4, 9, -4),
                max: IVec3::new(4, 9, 4),
            }]
        );

        let world = scene.build_world();
        assert_eq!(world.count_of(BlockKind::Solid), 81);
        assert_eq!(world.get_block(&IVec3::new(1, 10, 0)), BlockKind::Water);
        assert_eq!(world.player_position(), scene.player_position);
    }

    #[test]
    fn test_scene_fields_are_optional() {
        let scene = parse_scene("(name: \"empty\")").unwrap();
        assert!(scene.solids.is_empty());
        assert!(scene.build_world().player_position().is_none());
    }

    #[test]
    fn test_scene_survives_ron_round_trip() {
        let scene = parse_scene(POOL_SCENE).unwrap();
        let text = ron::ser::to_string(&scene).unwrap();
        assert_eq!(parse_scene(&text).unwrap(), scene);
    }

    #[test]
    fn test_bad_scene_is_an_error() {
        assert!(parse_scene("(solids: [(min: (0, 0))])").is_err());
        assert!(load_scene(Path::new("/definitely/not/here.ron")).is_err());
    }

    #[test]
    fn test_partial_flow_config_keeps_defaults() {
        let config: WaterFlowConfig = from_str("(base_interval: 0.25, enabled: false)").unwrap();
        assert_eq!(config.base_interval, 0.25);
        assert!(!config.enabled);
        let defaults = WaterFlowConfig::default();
        assert_eq!(config.max_batch_size, defaults.max_batch_size);
    }
}
