//! Bounty Ledger admin CLI
//!
//! Operator commands that work directly against the SQLite database.

mod commands;
mod style;

use anyhow::Result;
use bounty_ledger::{BountyCore, Config, Role};
use clap::{Parser, Subcommand};
use style::*;
use uuid::Uuid;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "bounty-admin")]
#[command(version)]
#[command(about = "Bounty Ledger - operator tools for budgets, members and the audit log", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "BOUNTY_CONFIG", default_value = "config.toml", global = true)]
    config: String,

    /// Pubkey acting for this CLI; deposits need it to be an owner or admin of the workspace
    #[arg(long, env = "BOUNTY_OPERATOR", default_value = "operator", global = true)]
    operator: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deposit funds into a workspace budget
    #[command(visible_alias = "d")]
    Deposit {
        workspace: Uuid,

        /// Amount in the smallest currency unit
        amount: u64,

        #[arg(short, long)]
        memo: Option<String>,
    },

    /// Show a workspace budget
    #[command(visible_alias = "b")]
    Budget { workspace: Uuid },

    /// Check ledger invariants (all funded workspaces when none given)
    #[command(visible_alias = "v")]
    Verify { workspace: Option<Uuid> },

    /// Show recent activity for a workspace
    #[command(visible_alias = "a")]
    Activity {
        workspace: Uuid,

        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Manage workspace members
    #[command(visible_alias = "m")]
    Member {
        #[command(subcommand)]
        action: MemberCommand,
    },

    /// Run the HTTP server
    #[command(visible_alias = "s")]
    Serve {
        /// Host to bind
        #[arg(long, env = "BOUNTY_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "BOUNTY_PORT")]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum MemberCommand {
    /// Add a member or change their role
    Add {
        workspace: Uuid,
        pubkey: String,

        /// owner, admin, member or viewer
        #[arg(short, long, default_value = "member")]
        role: Role,
    },

    /// Remove a member
    #[command(visible_alias = "rm")]
    Remove { workspace: Uuid, pubkey: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from(&cli.config)?;
    let core = BountyCore::open(&config)?;

    match cli.command {
        Commands::Deposit {
            workspace,
            amount,
            memo,
        } => commands::deposit::run(&core, &cli.operator, workspace, amount, memo),
        Commands::Budget { workspace } => commands::budget::run(&core, workspace),
        Commands::Verify { workspace } => commands::verify::run(&core, workspace),
        Commands::Activity { workspace, limit } => commands::activity::run(&core, workspace, limit),
        Commands::Member { action } => match action {
            MemberCommand::Add {
                workspace,
                pubkey,
                role,
            } => commands::member::add(&core, workspace, &pubkey, role),
            MemberCommand::Remove { workspace, pubkey } => {
                commands::member::remove(&core, workspace, &pubkey)
            }
        },
        Commands::Serve { host, port } => {
            println!(
                "  {} {}",
                style_cyan("Bounty Ledger"),
                style_dim(&format!("v{}", VERSION))
            );
            let host = host.unwrap_or_else(|| config.host());
            let port = port.unwrap_or_else(|| config.port());
            commands::serve::run(core, &host, port).await
        }
    }
}
