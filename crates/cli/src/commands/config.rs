use clap::Subcommand;
use ledgermeta_core::{config::AppConfig, pool::LedgerPoolBuilder};
use std::{path::Path, sync::Arc, time::Duration};

use super::utils::{print_error, print_info, print_success, CliError, CliResult};

/// Starter configuration written by `config generate`.
pub const SAMPLE_CONFIG: &str = r#"# Ledger pool configuration
# Every value below is the compiled-in default unless noted.

environment = "development"

[server]
bind_address = "127.0.0.1"
bind_port = 4080

[ledger]
# How long a request may wait for a free session before failing
request_timeout_seconds = 30
# How often the dispatcher re-examines the queue
dispatch_interval_ms = 100
# Constant wait between connection attempts
reconnect_delay_seconds = 3
# Per-call guard on a single request/response exchange
transport_timeout_seconds = 60
# Recent transaction hashes and ledger indices remembered for deduplication
dedup_capacity = 1000
event_buffer = 1024

# Nodes are tried in the order listed; earlier nodes win ties.
[[ledger.nodes]]
url = "wss://xrplcluster.com"
connections = 2

[[ledger.nodes]]
url = "wss://s2.ripple.com"
connections = 1
# Restrict a node to a subset of commands (omit to allow everything)
# allowed_commands = ["ledger", "ledger_data", "subscribe"]

[[ledger.nodes]]
url = "wss://s1.ripple.com"
disabled = true

[metrics]
enabled = true
prometheus_port = 9090

[logging]
level = "info"
format = "pretty"
"#;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the current configuration
    Validate {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Show current configuration
    Show {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output path for the config file
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Connect to every configured node and report what each session sees
    TestNodes {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Seconds to wait for sessions to come online
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
}

pub async fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file } => show_config(&file),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
        ConfigCommands::TestNodes { file, timeout } => test_nodes(&file, timeout).await,
    }
}

/// Loads and validates a config file.
pub fn load_config(file: &str) -> CliResult<AppConfig> {
    let config = AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))?;
    config.validate().map_err(CliError::Config)?;
    Ok(config)
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn validate_config(file: &str) -> CliResult<()> {
    if !Path::new(file).exists() {
        print_error(&format!("Configuration file not found: {file}"));
        return Err(CliError::Config(format!("File not found: {file}")));
    }

    print_info(&format!("Loading and validating configuration from {file}..."));
    let config = load_config(file)?;

    print_success("Configuration is valid!");

    let active = config.ledger.nodes.iter().filter(|node| !node.disabled).count();
    println!("Configuration Summary:");
    println!("  Server: {}:{}", config.server.bind_address, config.server.bind_port);
    println!(
        "  Nodes: {} configured, {} enabled, {} sessions",
        config.ledger.nodes.len(),
        active,
        config.ledger.session_count()
    );
    println!("  Request Timeout: {}s", config.ledger.request_timeout_seconds);
    println!("  Metrics: {}", enabled(config.metrics.enabled));

    Ok(())
}

fn show_config(file: &str) -> CliResult<()> {
    let config = AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))?;

    println!("Configuration from {file}:");

    println!("\n[Server]");
    println!("  Bind Address: {}", config.server.bind_address);
    println!("  Bind Port: {}", config.server.bind_port);

    println!("\n[Ledger]");
    println!("  Request Timeout: {}s", config.ledger.request_timeout_seconds);
    println!("  Dispatch Interval: {}ms", config.ledger.dispatch_interval_ms);
    println!("  Reconnect Delay: {}s", config.ledger.reconnect_delay_seconds);
    println!("  Transport Timeout: {}s", config.ledger.transport_timeout_seconds);
    println!("  Dedup Capacity: {}", config.ledger.dedup_capacity);

    println!("\n[Nodes] ({} configured)", config.ledger.nodes.len());
    for node in &config.ledger.nodes {
        let state = if node.disabled { " [disabled]" } else { "" };
        println!("  {} x{}{state}", node.url, node.connections);
        if let Some(commands) = &node.allowed_commands {
            println!("    Allowed: {}", commands.join(", "));
        }
    }

    println!("\n[Metrics]");
    println!("  Enabled: {}", config.metrics.enabled);
    if let Some(port) = config.metrics.prometheus_port {
        println!("  Prometheus Port: {port}");
    }

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    Ok(())
}

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output, SAMPLE_CONFIG)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Remember to:");
    print_info("  1. List the ledger nodes you want to use, in order of preference");
    print_info("  2. Restrict history-less or rate-limited nodes with allowed_commands");

    Ok(())
}

async fn test_nodes(file: &str, timeout: u64) -> CliResult<()> {
    let config = load_config(file)?;

    print_info(&format!(
        "Connecting {} sessions across {} nodes...",
        config.ledger.session_count(),
        config.ledger.nodes.len()
    ));

    let pool = Arc::new(LedgerPoolBuilder::from_config(&config.ledger).build()?);
    pool.start();

    let online = pool.wait_for_connection(Duration::from_secs(timeout)).await;
    // Give the remaining sessions the same window to report coverage.
    if online {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    let status = pool.status();
    for session in &status.sessions {
        let coverage = session.coverage.as_deref().unwrap_or("unknown");
        println!("  #{} {}: {} (coverage {coverage})", session.ordinal, session.url, session.state);
    }

    let ledger = if online { pool.current_ledger_index().await.ok() } else { None };
    pool.shutdown().await;

    println!("\nTest Results:");
    println!("  [SUCCESS] Online: {}", status.online);
    println!("  [ERROR] Offline: {}", status.total - status.online);
    if let Some(index) = ledger {
        println!("  Current ledger: {index}");
    }

    if status.online == status.total {
        print_success("All sessions are online!");
        Ok(())
    } else if status.online > 0 {
        print_error("Some sessions did not connect");
        Ok(())
    } else {
        Err(CliError::Pool("no session could connect".to_string()))
    }
}
