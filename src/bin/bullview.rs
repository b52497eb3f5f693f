//! bullview binary entry point
//!
//! Resolves configuration and the Redis connection, then dispatches to the
//! dashboard or a one-shot command.

use bullview::{
    Config, ConnectionConfig, RedisHandle, cli::Args, cli::Command, commands, gateway::Gateways,
    logging,
};
use clap::Parser;
use color_eyre::eyre::Result;

/// Resolve connection parameters from flags, `REDIS_URL` and the config file
fn resolve_connection(args: &Args, config: &Config) -> Result<ConnectionConfig> {
    let redis_url = std::env::var("REDIS_URL").ok();
    ConnectionConfig::resolve(&args.overrides(), redis_url.as_deref(), &config.connection)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let config = Config::load()?;
    let connection = resolve_connection(&args, &config)?;

    match args.command.clone().unwrap_or(Command::Tui) {
        Command::Config => {
            logging::init_cli_logging();
            config.print_summary(&connection);
            Ok(())
        }

        Command::Queues { json } => {
            logging::init_cli_logging();
            let handle = RedisHandle::connect(connection).await?;
            let result = commands::queues(&Gateways::redis(&handle), json).await;
            handle.close();
            result
        }

        Command::Jobs { queue, state, json } => {
            logging::init_cli_logging();
            let handle = RedisHandle::connect(connection).await?;
            let page_size = config.polling.job_page_size;
            let result =
                commands::jobs(&Gateways::redis(&handle), &queue, &state, page_size, json).await;
            handle.close();
            result
        }

        Command::Tui => {
            #[cfg(feature = "tui")]
            {
                // Held until exit so buffered log lines are flushed
                let _log_guard =
                    logging::init_file_logging(args.log_file.clone(), &config.settings.log_level)?;

                // Fails before the terminal is touched
                let handle = RedisHandle::connect(connection).await?;
                let result = bullview::tui::run(&config, &handle).await;
                handle.close();
                result
            }
            #[cfg(not(feature = "tui"))]
            {
                eprintln!("TUI feature not enabled");
                eprintln!("Rebuild with: cargo build --features tui");
                std::process::exit(1);
            }
        }
    }
}
