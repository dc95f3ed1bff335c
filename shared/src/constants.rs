pub const TICKS_PER_SECOND: u64 = 20;
pub const MAX_TICKS_PER_SECOND: u64 = 240;
pub const DEFAULT_WORLD_NAME: &str = "default";
pub const SCENE_LOAD_ERROR: &str = "Failed to load scene file";
pub const CONFIG_LOAD_ERROR: &str = "Failed to load water flow config";
