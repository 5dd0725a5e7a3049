// proxgate-core: Pure types, verb tables, config, error taxonomy
// No network code and no internal proxgate dependencies.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod gate;
pub mod node;
pub mod protocol;
pub mod resource;
pub mod snapshot;
pub mod storage;
pub mod task;
