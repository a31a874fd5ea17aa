mod bridge;
mod commands;
mod error;
mod launch;
mod settings;
mod setup;
mod store;

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{filter::Directive, EnvFilter};

use crate::{bridge::DEFAULT_PORT, settings::Settings};

#[derive(Parser)]
#[command(name = "molbridge", version)]
#[command(about = "Drive PyMOL over its local socket, launching it when needed")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct GlobalArgs {
    /// Host the PyMOL socket plugin listens on
    #[arg(long, global = true, env = "MOLBRIDGE_HOST", default_value = "localhost")]
    host: String,

    /// Port the PyMOL socket plugin listens on
    #[arg(long, global = true, env = "MOLBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for a single exec to finish
    #[arg(long, global = true, env = "MOLBRIDGE_TIMEOUT", value_name = "SECS")]
    timeout: Option<f64>,

    /// Seconds to wait for a launched PyMOL to open its socket
    #[arg(long, global = true, env = "MOLBRIDGE_LAUNCH_TIMEOUT", value_name = "SECS")]
    launch_timeout: Option<f64>,

    /// Home directory for .pymolrc and ~/.molbridge
    #[arg(long, global = true, env = "MOLBRIDGE_HOME", value_name = "DIR")]
    home: Option<PathBuf>,

    /// Log connection and launch details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure PyMOL to auto-load the socket plugin
    Setup {
        /// Plugin file to load (defaults to ~/.molbridge/plugin/claude_socket_plugin.py)
        #[arg(long)]
        plugin: Option<PathBuf>,
        /// Python interpreter to record (defaults to python3 on PATH)
        #[arg(long)]
        python: Option<String>,
    },
    /// Check if PyMOL is running and connected
    Status,
    /// Test the connection with a simple command
    Test,
    /// Show installation info
    Info,
    /// Launch PyMOL or connect to an existing instance
    Launch {
        /// File to open (e.g. .pdb, .cif)
        file: Option<PathBuf>,
    },
    /// Execute Python code in PyMOL
    Exec {
        /// Code to execute (or pipe via stdin)
        code: Option<String>,
    },
}

impl GlobalArgs {
    fn settings(&self) -> Settings {
        let mut settings = Settings {
            host: self.host.clone(),
            port: self.port,
            ..Settings::default()
        };
        if let Some(secs) = self.timeout.and_then(seconds) {
            settings.exec_timeout = secs;
        }
        if let Some(secs) = self.launch_timeout.and_then(seconds) {
            settings.launch_deadline = secs;
        }
        if let Some(home) = &self.home {
            settings.home.clone_from(home);
        }
        settings
    }
}

fn seconds(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

/// `RUST_LOG` when set, `molbridge=warn` otherwise. `-v` raises this crate to debug.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let filter = rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("molbridge=warn"));
    if !verbose {
        return filter;
    }
    match "molbridge=debug".parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

fn init_tracing(verbose: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    let settings = cli.global.settings();

    let result = match cli.command {
        None | Some(Commands::Info) => {
            commands::info(&settings).await;
            Ok(true)
        }
        Some(Commands::Setup { plugin, python }) => commands::setup(&settings, plugin, python).await,
        Some(Commands::Status) => commands::status(&settings).await,
        Some(Commands::Test) => commands::test(&settings).await,
        Some(Commands::Launch { file }) => commands::launch(&settings, file.as_deref()).await,
        Some(Commands::Exec { code }) => commands::exec(&settings, code).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
