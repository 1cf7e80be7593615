//! # BotBranch CLI (`botbranch`)
//!
//! Moves a conversation between chat sites from the command line: harvest a
//! saved page into a stored transfer, then replay that transfer as the
//! receiving site would.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `botbranch sites` | List supported sites and their destinations |
//! | `botbranch export <page>` | Harvest a saved HTML page and store the transfer |
//! | `botbranch receive <url>` | Run the receiving handoff for a page URL |
//! | `botbranch inspect <id>` | Decode a stored transfer |
//! | `botbranch pending` | Show the pending-transfer pointer |
//!
//! ## Examples
//!
//! ```bash
//! botbranch export ./chat.html --from chatgpt --to gemini
//! botbranch receive "https://gemini.google.com/app?bb_id=bb_1700000000000"
//! botbranch --config ./config/botbranch.toml pending
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use botbranch::commands;
use botbranch::config::{self, Config};
use botbranch::core::models::Site;
use botbranch::progress::ProgressMode;

/// BotBranch: carry a chat transcript from one AI chat site into another.
///
/// All commands accept `--config` pointing to a TOML file. Without it the
/// built-in defaults are used. See `config/botbranch.example.toml`.
#[derive(Parser)]
#[command(
    name = "botbranch",
    about = "Carry a chat transcript from one AI chat site into another",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline steps at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Progress output on stderr: `off`, `human`, or `json`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported sites.
    Sites {
        /// Also print each site's selector profile.
        #[arg(long)]
        selectors: bool,
    },

    /// Harvest a saved page and store the transfer.
    ///
    /// Prints the transfer id and the URL to open on the target site.
    Export {
        /// Saved HTML of the source conversation.
        page: PathBuf,

        /// Site the page was saved from.
        #[arg(long)]
        from: Site,

        /// Site to branch the conversation into.
        #[arg(long)]
        to: Site,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the receiving handoff for a page URL.
    ///
    /// Each part the receiving page would submit is printed to stdout.
    Receive {
        /// URL the target page was opened at (may carry `bb_id`).
        url: String,

        /// Receiving site, when it cannot be told from the URL host.
        #[arg(long)]
        site: Option<Site>,
    },

    /// Decode and print a stored transfer.
    Inspect {
        /// Transfer id (`bb_<millis>`).
        id: String,

        /// Print the decoded messages as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the pending-transfer pointer and whether it is still valid.
    Pending,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "botbranch=debug" } else { "botbranch=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    let reporter = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Sites { selectors } => {
            commands::list_sites(selectors);
        }
        Commands::Export {
            page,
            from,
            to,
            json,
        } => {
            commands::run_export(&cfg, &page, from, to, reporter.as_ref(), json).await?;
        }
        Commands::Receive { url, site } => {
            commands::run_receive(&cfg, &url, site, reporter.as_ref()).await?;
        }
        Commands::Inspect { id, json } => {
            commands::inspect(&cfg, &id, json).await?;
        }
        Commands::Pending => {
            commands::show_pending(&cfg).await?;
        }
    }

    Ok(())
}
