//! CLI argument definitions and dispatch for the `dnschat` demo binary.
//!
//! Keeps parsing and dispatch minimal; the real work happens in
//! `dnschat::ChatDnsClient`. Each subcommand consumes `self` and delegates,
//! mirroring the ownership-based dispatch this crate's predecessor used for
//! its own CLI.

use clap::{Parser, Subcommand};
use dnschat::{CancellationToken, ChatDnsClient, Config, Request};

/// Top-level CLI structure parsed from program arguments.
#[derive(Parser)]
#[command(version, about = "Send chat text as DNS TXT queries")]
pub struct Cli {
    #[command(subcommand)]
    pub operation: Operation,

    /// Zone to compose queries against.
    #[arg(long, global = true)]
    pub zone: Option<String>,

    /// DNS server to query; must be on the configured allow-list.
    #[arg(long, global = true)]
    pub server: Option<String>,
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Operation {
    /// Sanitize text into a DNS label without sending any query.
    Sanitize { text: String },
    /// Send `text` as a chat message over DNS and print the reassembled reply.
    Ask { text: String },
    /// Probe and print this environment's transport capabilities.
    Capabilities,
}

impl Cli {
    /// Build the configured client and dispatch to the selected operation.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let mut config = Config::default();
        if let Some(zone) = self.zone {
            config.zone = zone;
        }
        if let Some(server) = self.server {
            config.server = server;
        }
        let client = ChatDnsClient::new(config);

        match self.operation {
            Operation::Sanitize { text } => {
                let label = client.sanitize(&text)?;
                println!("{label}");
            }
            Operation::Ask { text } => {
                let token = CancellationToken::new();
                let result = client.execute(Request::new(text), &token).await?;
                println!("{}", result.reassembled);
            }
            Operation::Capabilities => {
                let record = client.capabilities().await;
                println!(
                    "available={} platform={} supports_custom_server={} supports_async_query={} api_level={:?}",
                    record.available,
                    record.platform,
                    record.supports_custom_server,
                    record.supports_async_query,
                    record.api_level,
                );
            }
        }

        Ok(())
    }
}
