mod commands;

use clap::{Parser, Subcommand};

use commands::Endpoint;

/// prompt-bridge CLI -- talk to a running pb-daemon.
#[derive(Parser)]
#[command(name = "pb", version, about)]
struct Cli {
    /// Base URL of the daemon.
    #[arg(long, env = "PB_API_URL", default_value = "http://localhost:8010")]
    api_url: String,

    /// API key, when the daemon enforces one.
    #[arg(long, env = "PROMPT_BRIDGE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon health (default when no subcommand is given).
    Health,

    /// Send a prompt and print the answer.
    Ask {
        /// Prompt text; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Inspect or drive the agent's login.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Show authentication progress.
    Status,

    /// Log the agent in with the given account.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Submit the emailed verification code.
    Code {
        code: String,
        /// Keep polling auth status for up to this many seconds until the
        /// login is confirmed.
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let endpoint = Endpoint::new(cli.api_url, cli.api_key);

    match cli.command {
        None | Some(Commands::Health) => commands::health::run(&endpoint).await?,
        Some(Commands::Ask { prompt }) => commands::ask::run(&endpoint, &prompt.join(" ")).await?,
        Some(Commands::Auth { command }) => match command {
            AuthCommands::Status => commands::auth::status(&endpoint).await?,
            AuthCommands::Login { email, password } => {
                commands::auth::login(&endpoint, &email, &password).await?
            }
            AuthCommands::Code { code, wait } => {
                commands::auth::code(&endpoint, &code, wait.map(std::time::Duration::from_secs))
                    .await?
            }
        },
    }

    Ok(())
}
