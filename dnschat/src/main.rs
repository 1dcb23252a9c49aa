//! `dnschat` demo binary.
//!
//! A thin wrapper: argument parsing and dispatch happen here, while the real
//! work (sanitizing, dispatching, reassembling) happens in the `dnschat`
//! library via `commands::base::Cli`.
//!
//! $ dnschat ask "hello there"
//! $ dnschat sanitize "Água São Paulo"
//! $ dnschat capabilities

mod commands;

use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    commands::base::Cli::parse().run().await
}
