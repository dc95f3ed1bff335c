pub mod constants;
pub mod water;
pub mod world;

pub use constants::*;
