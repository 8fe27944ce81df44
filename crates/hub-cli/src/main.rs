//! hub - operate the credential vault, create tasks, and watch realtime state.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{Context, SessionArgs};
use hub_config_and_utils::{init_logging, Config, Paths};
use std::path::PathBuf;

/// Credential vault and task orchestration from the command line.
#[derive(Parser)]
#[command(name = "hub")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, logs, and local storage. Defaults to ~/.hub
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the encrypted local credential
    Vault {
        #[command(subcommand)]
        command: VaultCommands,
    },

    /// Create and run tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Realtime state sync
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
enum VaultCommands {
    /// Encrypt and store a token under the current session secret
    Store {
        /// Local user id
        #[arg(short, long, env = "HUB_USER_ID")]
        user: String,
        /// Session secret the key is derived from
        #[arg(short, long, env = "HUB_ACCESS_TOKEN", hide_env_values = true)]
        secret: Option<String>,
        /// Token to store
        #[arg(env = "HUB_PROVIDER_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Show the vault state for a user
    Show {
        #[arg(short, long, env = "HUB_USER_ID")]
        user: String,
        #[arg(short, long, env = "HUB_ACCESS_TOKEN", hide_env_values = true)]
        secret: Option<String>,
        /// Print the token in full
        #[arg(long)]
        reveal: bool,
    },
    /// Remove the stored token
    Clear {
        #[arg(short, long, env = "HUB_USER_ID")]
        user: String,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a task and start processing it
    Create {
        /// What the agent should do
        instruction: String,
        /// Target repository as owner/name
        #[arg(long)]
        repo: Option<String>,
        /// Target branch
        #[arg(long, requires = "repo")]
        branch: Option<String>,
        /// Free-form context for the agent
        #[arg(long)]
        context: Option<String>,
        /// Apply generated changes automatically
        #[arg(long)]
        auto_apply: bool,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Run several agents on one instruction in parallel
    Parallel {
        instruction: String,
        /// Number of agents
        #[arg(short, long, default_value = "3")]
        agents: usize,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long, requires = "repo")]
        branch: Option<String>,
        /// Credential to forward instead of the resolved one
        #[arg(long)]
        token: Option<String>,
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Follow the signed-in user's collections until interrupted
    Watch {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err((e, format)) = result {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), (anyhow::Error, output::OutputFormat)> {
    let format = cli.format;
    let fail = |e: anyhow::Error| (e, format);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new().map_err(|e| fail(e.into()))?,
    };
    let config = Config::load(&paths).map_err(|e| fail(e.into()))?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    if let Err(e) = init_logging(&paths, &level, false) {
        output::print_warning(&format!("logging disabled: {}", e), &format);
    }

    let ctx = Context::new(paths, config, format);
    let result = match cli.command {
        Commands::Vault { command } => match command {
            VaultCommands::Store { user, secret, token } => {
                commands::vault_store(&ctx, &user, secret.as_deref(), &token)
            }
            VaultCommands::Show { user, secret, reveal } => {
                commands::vault_show(&ctx, &user, secret.as_deref(), reveal)
            }
            VaultCommands::Clear { user } => commands::vault_clear(&ctx, &user),
        },
        Commands::Task { command } => match command {
            TaskCommands::Create {
                instruction,
                repo,
                branch,
                context,
                auto_apply,
                session,
            } => {
                let options = commands::TaskOptionArgs {
                    repo,
                    branch,
                    context,
                    auto_apply,
                };
                commands::task_create(&ctx, &session, &instruction, options).await
            }
            TaskCommands::Parallel {
                instruction,
                agents,
                repo,
                branch,
                token,
                session,
            } => {
                commands::task_parallel(&ctx, &session, &instruction, agents, repo, branch, token).await
            }
        },
        Commands::Sync { command } => match command {
            SyncCommands::Watch { session } => commands::sync_watch(&ctx, &session).await,
        },
    };
    result.map_err(fail)
}
