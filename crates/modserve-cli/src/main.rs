#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use commands::serve::ServeAction;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "modserve")]
#[command(author, version, about = "Serve ES modules with bare imports rewritten for the browser", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Serve a directory, rewriting module imports on the fly
    Serve {
        /// Directory to serve (defaults to the current directory)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Port to listen on [default: 8000]
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Host to bind to [default: localhost]
        #[arg(long)]
        host: Option<String>,

        /// Path to config file (default: <root>/modserve.json if present)
        #[arg(long, short = 'c', value_name = "FILE", env = "MODSERVE_CONFIG")]
        config: Option<PathBuf>,

        /// Answer 404 instead of index.html for unknown extension-less paths
        #[arg(long)]
        no_spa: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Serve {
            root,
            port,
            host,
            config,
            no_spa,
        }) => {
            logging::init(cli.verbose, cli.json);

            let span = tracing::info_span!("serve", cmd = "serve", cwd = %cwd.display());
            let _guard = span.enter();

            let action = ServeAction {
                root,
                host,
                port,
                config,
                no_spa,
            };
            commands::serve::run(action, &cwd)
        }
    }
}
