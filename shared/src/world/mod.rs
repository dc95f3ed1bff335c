pub mod blocks;
pub mod data;
mod utils;
pub mod water;

pub use blocks::*;
pub use data::*;
pub use utils::*;
pub use water::*;
