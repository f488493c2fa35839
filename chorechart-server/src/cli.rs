use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: config.listen_port, then 3001)
  JWT_SECRET  (overrides jwt_secret from the config file)
  RUST_LOG    (default: info)

The `init-config` command writes a starter config with a fresh signing secret.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "chorechart-server",
    version,
    about = "ChoreChart household chore and reward server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a default config file with a generated jwt_secret
    InitConfig {
        /// Destination path for the config file
        #[arg(long, default_value = "config.yaml")]
        path: PathBuf,
        /// Port written as listen_port
        #[arg(long, default_value_t = chorechart_server::server::DEFAULT_PORT)]
        port: u16,
        /// Overwrite the file if it already exists
        #[arg(long)]
        force: bool,
    },
}
