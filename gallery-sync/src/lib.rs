pub mod cli;
pub mod export_source;
pub mod load_config;
pub mod weasyl;

pub use cli::{run, Cli, Commands};
