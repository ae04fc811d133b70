use ledgermeta_core::{
    config::AppConfig,
    pool::{LedgerPool, LedgerPoolBuilder},
    types::LedgerRequest,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};

use super::{
    config::load_config,
    utils::{print_info, CliError, CliResult},
};

/// Options of a one-shot `request` invocation.
pub struct RequestOptions {
    pub config_file: String,
    pub command: String,
    pub params: Vec<String>,
    pub ledger_index: Option<u32>,
    pub priority: i32,
    pub connect_timeout: u64,
}

/// Parses `key=value` into a request field. Values that parse as JSON keep their type,
/// anything else is sent as a string.
pub fn parse_param(raw: &str) -> CliResult<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::General(format!("Expected key=value, got '{raw}'")))?;

    if key.is_empty() {
        return Err(CliError::General(format!("Empty parameter name in '{raw}'")));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Assembles the ledger request described by the options.
pub fn build_request(options: &RequestOptions) -> CliResult<LedgerRequest> {
    let mut request = LedgerRequest::new(options.command.as_str());
    for raw in &options.params {
        let (key, value) = parse_param(raw)?;
        request = request.with_param(key, value);
    }
    if let Some(index) = options.ledger_index {
        request = request.at_ledger(index);
    }
    Ok(request)
}

async fn start_pool(config: &AppConfig, connect_timeout: u64) -> CliResult<Arc<LedgerPool>> {
    let pool = Arc::new(LedgerPoolBuilder::from_config(&config.ledger).build()?);
    pool.start();

    if !pool.wait_for_connection(Duration::from_secs(connect_timeout)).await {
        pool.shutdown().await;
        return Err(CliError::Pool(format!("no node connected within {connect_timeout}s")));
    }
    Ok(pool)
}

/// Sends one request through a freshly started pool and prints the result.
pub async fn send_request(options: RequestOptions) -> CliResult<()> {
    let config = load_config(&options.config_file)?;
    let request = build_request(&options)?;

    let pool = start_pool(&config, options.connect_timeout).await?;
    print_info(&format!("{} of {} sessions online", pool.online_sessions(), pool.sessions().len()));

    if let Some(index) = options.ledger_index {
        let timeout = Duration::from_secs(options.connect_timeout);
        if !pool.wait_for_coverage(index, timeout).await {
            print_info(&format!("No session reported ledger {index} within {timeout:?}"));
        }
    }

    let result = pool.request(request, options.priority).await;
    pool.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

/// Prints the latest ledger header known to the pool.
pub async fn current_ledger(config_file: &str, connect_timeout: u64) -> CliResult<()> {
    let config = load_config(config_file)?;
    let pool = start_pool(&config, connect_timeout).await?;

    let header = pool.current_ledger().await;
    pool.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&header?)?);
    Ok(())
}
