// proxgate-runtime: the resource action gateway
// Depends on proxgate-core (types, config, errors). All network I/O lives here.

pub mod aggregator;
pub mod api;
pub mod backup;
pub mod connection;
pub mod directory;
pub mod dispatcher;
pub mod gateway;
pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod resolver;
pub mod tasks;
pub mod transport;

pub use gateway::Gateway;
