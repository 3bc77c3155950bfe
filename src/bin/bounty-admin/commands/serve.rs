//! Serve command - run the HTTP server

use crate::style::*;
use anyhow::Result;
use bounty_ledger::BountyCore;

pub async fn run(core: BountyCore, host: &str, port: u16) -> Result<()> {
    println!("Listening on {}", style_bold(&format!("http://{}:{}", host, port)));
    println!();
    bounty_ledger::server::run_server(host, port, core).await
}
