//! Subcommand implementations.
//!
//! Each command returns its rendered output so `main` only decides where it
//! goes.

mod config;
mod timeline;

pub use config::{load_config, render_config};
pub use timeline::{TimelineArgs, parse_order_id, timeline};
