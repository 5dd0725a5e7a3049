//! # proxgate: safety-gated gateway for Proxmox VE clusters
//!
//! Facade crate that re-exports the proxgate workspace crates so consumers
//! can depend on a single `proxgate` library.
//!
//! ## Crate breakdown
//!
//! | Module | Crate | Purpose |
//! |--------|-------|---------|
//! | [`core`] | proxgate-core | Resource/node/task types, errors, config, safety gate, tool protocol |
//! | [`runtime`] | proxgate-runtime | HTTP transport, connection manager, resolver, dispatcher, aggregator, backups |
//! | [`cli`] | proxgate-cli | Command line, tool catalog, stdin/stdout tool server |

pub use proxgate_cli as cli;
pub use proxgate_core as core;
pub use proxgate_runtime as runtime;
