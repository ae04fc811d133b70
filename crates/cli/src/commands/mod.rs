pub mod config;
pub mod request;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use request::{current_ledger, send_request, RequestOptions};
