// proxgate-cli: Clap commands, output rendering, tool registry, stdio server
// Depends on proxgate-core and proxgate-runtime

pub mod commands;
pub mod display;
pub mod logging;
pub mod output;
pub mod server;
pub mod tools;
pub mod ui;

pub use commands::run;
