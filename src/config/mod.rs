//! Study configuration: typed schema and loader.

pub mod loader;
pub mod schema;

pub use loader::{LoadResult, MAX_CONFIG_SIZE, load_config, validate};
pub use schema::{GroupConfig, LevelEntry, LevelList, LevelSlot, Pools, StudyConfig};
