use clap::{Parser, Subcommand};
use rustls::crypto::{ring::default_provider, CryptoProvider};

mod commands;
use commands::{
    current_ledger, handle_config_command, send_request, utils::print_error, ConfigCommands,
    RequestOptions,
};

#[derive(Parser)]
#[command(name = "ledgermeta-cli")]
#[command(about = "Ledgermeta CLI - configure and query the ledger node pool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Send one request through the pool and print the node's result
    Request {
        /// Ledger command, e.g. account_info
        command: String,

        /// Request fields as key=value (can be specified multiple times)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Pin the request to a historical ledger
        #[arg(short, long)]
        ledger_index: Option<u32>,

        /// Higher priorities are dispatched first
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        priority: i32,

        /// Path to config file
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Seconds to wait for the first session
        #[arg(long, default_value = "10")]
        connect_timeout: u64,
    },

    /// Print the latest closed ledger header
    CurrentLedger {
        /// Path to config file
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Seconds to wait for the first session
        #[arg(long, default_value = "10")]
        connect_timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if CryptoProvider::install_default(default_provider()).is_err() {
        print_error("Failed to install crypto provider");
    }

    match cli.command {
        Commands::Config(config_command) => {
            handle_config_command(config_command).await?;
        }

        Commands::Request { command, params, ledger_index, priority, file, connect_timeout } => {
            let options = RequestOptions {
                config_file: file,
                command,
                params,
                ledger_index,
                priority,
                connect_timeout,
            };
            send_request(options).await?;
        }

        Commands::CurrentLedger { file, connect_timeout } => {
            current_ledger(&file, connect_timeout).await?;
        }
    }

    Ok(())
}
