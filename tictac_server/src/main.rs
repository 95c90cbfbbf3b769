// CLI entry point for the tic-tac-toe session server.
//
// Loads an optional JSON config, applies command-line overrides, installs the
// `tracing` subscriber and runs the server until the process is terminated.
// See `server.rs` for the networking architecture and `session.rs` for the
// game state.
//
// Usage:
//   tictac-server [OPTIONS]
//     --config <FILE>               JSON config file
//     --bind <ADDR>                 Listen address (default: 127.0.0.1)
//     --port <PORT>                 Listen port (default: 7878)
//     --explicit-rejections         Tell clients why a move was ignored
//     --handshake-timeout-ms <MS>   Time allowed for `hello` (default: 5000)
//
// Logging: `RUST_LOG` wins; otherwise the config's `log_filter`, otherwise
// `tictac_server=info`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tictac_server::config::ServerConfig;
use tictac_server::server::start_server;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "tictac-server", version, about = "Realtime tic-tac-toe session server")]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address
    #[arg(long)]
    bind: Option<String>,
    /// Listen port (0 picks a free port)
    #[arg(long)]
    port: Option<u16>,
    /// Send a `rejected` message to clients whose moves are ignored
    #[arg(long)]
    explicit_rejections: bool,
    /// Milliseconds a new connection has to send its hello
    #[arg(long)]
    handshake_timeout_ms: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<ServerConfig, tictac_server::error::ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.explicit_rejections {
            config.explicit_rejections = true;
        }
        if let Some(ms) = self.handshake_timeout_ms {
            config.handshake_timeout_ms = ms;
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let default_filter = config
        .log_filter
        .clone()
        .unwrap_or_else(|| "tictac_server=info".into());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let (_handle, addr) = match start_server(config) {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };
    info!(%addr, "ready, press Ctrl+C to stop");

    // The process exits on SIGINT/SIGTERM; connection threads are torn down
    // with it. Nothing here needs a graceful drain.
    loop {
        std::thread::park();
    }
}
